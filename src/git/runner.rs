// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! External command execution.
//!
//! All git work happens through the host `git` binary. Commands are described
//! by an [`Invocation`], executed by a [`CommandRunner`], and always bounded by
//! a [`Deadline`]. A command that outlives its deadline is killed and reported
//! as [`RunError::TimedOut`].
//!
//! The working directory of a command is part of its invocation. The process
//! working directory is never changed.

use crate::git::url::redact;

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    future::Future,
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};
use tokio::{process::Command, time::Instant};
use tracing::{debug, instrument};

/// Default bound on any single remote operation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Bound on listing remote branches for error reports.
pub const BRANCH_PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Point in time after which external commands are aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Deadline(Instant);

impl Deadline {
    /// Construct deadline that expires after target duration from now.
    pub fn after(timeout: Duration) -> Self {
        Self(Instant::now() + timeout)
    }

    /// Tighten deadline so it expires no later than `timeout` from now.
    pub fn narrowed(self, timeout: Duration) -> Self {
        self.min(Self::after(timeout))
    }

    pub fn instant(&self) -> Instant {
        self.0
    }

    /// Time left before deadline expires.
    pub fn remaining(&self) -> Duration {
        self.0.saturating_duration_since(Instant::now())
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::after(DEFAULT_TIMEOUT)
    }
}

/// Description of external command to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
}

impl Invocation {
    /// Construct new invocation of arbitrary program.
    pub fn new(
        program: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            cwd: None,
        }
    }

    /// Construct new invocation of git.
    pub fn git(args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::new("git", args)
    }

    /// Run invocation inside target directory.
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    /// Git subcommand, i.e., first argument.
    pub fn subcommand(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }
}

impl Display for Invocation {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let line = std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");
        fmt.write_str(redact(&line).as_ref())
    }
}

/// Captured result of finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` if terminated by signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Construct successful output with target stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Construct failed output with target exit code and stderr.
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Standard output with trailing newlines chomped.
    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim_end_matches(['\r', '\n'])
    }
}

/// Layer of indirection for external command execution.
///
/// A non-zero exit code is not an error at this layer. Callers decide what a
/// failed command means.
pub trait CommandRunner: Send + Sync {
    /// Execute invocation to completion or until deadline expires.
    fn run(
        &self,
        invocation: &Invocation,
        deadline: Deadline,
    ) -> impl Future<Output = Result<CommandOutput>> + Send;
}

impl<R> CommandRunner for &R
where
    R: CommandRunner + ?Sized,
{
    fn run(
        &self,
        invocation: &Invocation,
        deadline: Deadline,
    ) -> impl Future<Output = Result<CommandOutput>> + Send {
        (**self).run(invocation, deadline)
    }
}

/// Command runner backed by tokio child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    #[instrument(skip(self, invocation, deadline), level = "debug")]
    async fn run(&self, invocation: &Invocation, deadline: Deadline) -> Result<CommandOutput> {
        debug!("run {invocation}");
        let mut command = Command::new(invocation.program());
        command
            .args(invocation.args())
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = invocation.cwd() {
            command.current_dir(dir);
        }

        let child = command.spawn().map_err(|source| RunError::Spawn {
            program: invocation.program().to_string(),
            source,
        })?;

        // INVARIANT: Dropping the pending future kills the child on timeout.
        let output = tokio::time::timeout_at(deadline.instant(), child.wait_with_output())
            .await
            .map_err(|_| RunError::TimedOut {
                command: invocation.to_string(),
            })?
            .map_err(|source| RunError::Spawn {
                program: invocation.program().to_string(),
                source,
            })?;

        let output = CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!("exit code {:?}", output.code);

        Ok(output)
    }
}

/// Command execution errors.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// Program could not be started or waited on.
    #[error("failed to run {program:?}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Deadline expired before command finished.
    #[error("command `{command}` did not finish before its deadline")]
    TimedOut { command: String },
}

/// Friendly result alias :3
pub type Result<T, E = RunError> = std::result::Result<T, E>;
