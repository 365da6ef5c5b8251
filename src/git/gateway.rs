// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Working clone lifecycle.
//!
//! The [`RemoteGateway`] owns everything that touches the remote repository or
//! the working clone at `github.local_path`: validation of the configured
//! branch, cloning, fetching, branching, committing, pushing, and cleanup.
//! Nothing outside the working clone is ever written from here.
//!
//! # Error Surfacing
//!
//! Git failures that mean "the configured branch does not exist" become
//! [`ErrorKind::Configuration`](crate::error::ErrorKind::Configuration) errors
//! carrying a [`BranchNotFound`] cause that lists the branches the remote
//! actually has. Every other git failure becomes an installation error
//! carrying a [`CommandFailed`] cause with the command line and its stderr.

use crate::{
    config::Settings,
    error::{AnvilError, Operation, Result},
    git::{
        runner::{CommandOutput, CommandRunner, Deadline, Invocation, RunError, BRANCH_PROBE_TIMEOUT},
        url::{clone_url, redact, web_url},
    },
    privacy::PrivacyClearance,
};

use std::path::{Path, PathBuf};
use tracing::{debug, instrument, warn};

const BRANCH_MISSING_MARKERS: [&str; 3] = ["Remote branch", "couldn't find remote ref", "not found"];

/// Everything the gateway needs to know about the remote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteSettings {
    /// Repository as written in settings, never carrying credentials.
    pub repo: String,
    pub branch: String,
    pub local_path: PathBuf,
    pub token: Option<String>,
    pub ssh_key_path: Option<PathBuf>,
    pub username: String,
    pub email: String,
}

impl RemoteSettings {
    /// Extract remote settings from settings document.
    pub fn from_settings(settings: &Settings, token: Option<String>) -> Self {
        let ssh_key_path = Some(settings.git.ssh_key_path.clone())
            .filter(|path| !path.as_os_str().is_empty());

        Self {
            repo: settings.github.config_repo.clone(),
            branch: settings.github.branch.clone(),
            local_path: settings.github.local_path.clone(),
            token: token.filter(|token| !token.is_empty()),
            ssh_key_path,
            username: settings.git.username.clone(),
            email: settings.git.email.clone(),
        }
    }
}

/// Result of commit attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    NothingToCommit,
}

/// Gateway to remote repository and its working clone.
#[derive(Debug)]
pub struct RemoteGateway<R>
where
    R: CommandRunner,
{
    remote: RemoteSettings,
    runner: R,
    op: Operation,
}

impl<R> RemoteGateway<R>
where
    R: CommandRunner,
{
    /// Construct new gateway reporting errors under target operation.
    pub fn new(remote: RemoteSettings, runner: R, op: Operation) -> Self {
        Self { remote, runner, op }
    }

    pub fn remote(&self) -> &RemoteSettings {
        &self.remote
    }

    pub fn op(&self) -> Operation {
        self.op
    }

    /// Root of working clone.
    pub fn local_path(&self) -> &Path {
        &self.remote.local_path
    }

    /// URL used for clone and list-remote probes, possibly with credentials.
    pub fn clone_url(&self) -> String {
        clone_url(
            &self.remote.repo,
            self.remote.token.as_deref(),
            self.remote.ssh_key_path.as_deref(),
        )
    }

    /// Browsable address of repository, if it has one.
    pub fn web_url(&self) -> Option<String> {
        web_url(&self.remote.repo)
    }

    /// Verify remote is reachable and configured branch exists.
    ///
    /// # Errors
    ///
    /// - Return network error if remote cannot be listed.
    /// - Return configuration error with [`BranchNotFound`] cause if the
    ///   branch does not exist.
    #[instrument(skip(self, deadline), level = "debug")]
    pub async fn validate_repository(&self, deadline: Deadline) -> Result<()> {
        let url = self.clone_url();
        let call = Invocation::git(["ls-remote", url.as_str(), "HEAD"]);
        let output = self.exec("validate-repository", &call, deadline).await?;
        if !output.success() {
            return Err(AnvilError::network(
                self.op,
                "validate-repository",
                self.command_failed(&call, &output),
            )
            .with_context(self.remote.repo.clone())
            .with_hint("check network access and credentials for github.config_repo"));
        }

        let call = Invocation::git(["ls-remote", "--heads", url.as_str(), self.remote.branch.as_str()]);
        let output = self.exec("validate-branch", &call, deadline).await?;
        if !output.success() {
            return Err(AnvilError::network(
                self.op,
                "validate-branch",
                self.command_failed(&call, &output),
            )
            .with_context(self.remote.repo.clone()));
        }

        if output.stdout.trim().is_empty() {
            return Err(self.branch_not_found("validate-branch", deadline).await);
        }

        debug!("branch {:?} exists on remote", self.remote.branch);
        Ok(())
    }

    /// Probe remote `HEAD` with configured credentials.
    ///
    /// Returns false if git could reach the remote but was refused.
    ///
    /// # Errors
    ///
    /// - Return error if git cannot be run or the deadline expires.
    pub async fn authenticated_probe(&self, deadline: Deadline) -> Result<bool> {
        let url = self.clone_url();
        let call = Invocation::git(["ls-remote", url.as_str(), "HEAD"]);
        let output = self.exec("privacy-auth", &call, deadline).await?;
        if !output.success() {
            debug!("authenticated probe failed: {}", redact(output.stderr.trim()));
        }

        Ok(output.success())
    }

    /// List branch heads available on remote.
    ///
    /// Bounded by [`BRANCH_PROBE_TIMEOUT`] regardless of target deadline.
    #[instrument(skip(self, deadline), level = "debug")]
    pub async fn available_branches(&self, deadline: Deadline) -> Result<Vec<String>> {
        let url = self.clone_url();
        let call = Invocation::git(["ls-remote", "--heads", url.as_str()]);
        let output = self
            .exec("list-branches", &call, deadline.narrowed(BRANCH_PROBE_TIMEOUT))
            .await?;
        if !output.success() {
            return Err(AnvilError::network(
                self.op,
                "list-branches",
                self.command_failed(&call, &output),
            ));
        }

        Ok(parse_heads(&output.stdout))
    }

    /// Check that working clone exists and git recognizes it.
    pub async fn is_valid_clone(&self, deadline: Deadline) -> bool {
        if !self.remote.local_path.join(".git").is_dir() {
            return false;
        }

        let call = self.in_clone(["status", "--porcelain"]);
        matches!(self.runner.run(&call, deadline).await, Ok(output) if output.success())
    }

    /// Clone remote into working clone unless a valid one already exists.
    ///
    /// Any stray file or directory at the clone path is removed first.
    #[instrument(skip(self, deadline), level = "debug")]
    pub async fn clone_repository(&self, deadline: Deadline) -> Result<()> {
        if self.is_valid_clone(deadline).await {
            debug!("reuse working clone at {}", self.remote.local_path.display());
            return Ok(());
        }

        let path = &self.remote.local_path;
        if path.is_dir() {
            warn!("remove invalid working clone at {}", path.display());
            std::fs::remove_dir_all(path).map_err(|err| self.io_error("clone-repository", path, err))?;
        } else if path.exists() {
            std::fs::remove_file(path).map_err(|err| self.io_error("clone-repository", path, err))?;
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| self.io_error("clone-repository", parent, err))?;
        }

        let url = self.clone_url();
        let target = path.to_string_lossy().into_owned();
        let call = Invocation::git([
            "clone",
            "--branch",
            self.remote.branch.as_str(),
            url.as_str(),
            target.as_str(),
        ]);
        let output = self.exec("clone-repository", &call, deadline).await?;
        if !output.success() {
            if is_branch_missing(&output.stderr) {
                return Err(self.branch_not_found("clone-repository", deadline).await);
            }

            return Err(self.installation("clone-repository", &call, &output));
        }

        if !self.is_valid_clone(deadline).await {
            return Err(AnvilError::installation(
                self.op,
                "clone-repository",
                "clone finished but the working clone is not a valid git repository",
            )
            .with_context(path.display().to_string()));
        }

        Ok(())
    }

    /// Fetch and pull primary branch into working clone.
    ///
    /// Applies configured git identity to working clone before anything is
    /// written.
    #[instrument(skip(self, deadline), level = "debug")]
    pub async fn pull_changes(&self, deadline: Deadline) -> Result<()> {
        self.require_clone("pull-changes", deadline).await?;
        self.configure_identity(deadline).await?;

        let branch = self.remote.branch.as_str();
        for (sub_op, args) in [
            ("git-fetch", ["fetch", "origin", branch].as_slice()),
            ("git-pull", ["pull", "--ff-only", "origin", branch].as_slice()),
        ] {
            let call = self.in_clone(args.iter().copied());
            let output = self.exec(sub_op, &call, deadline).await?;
            if !output.success() {
                if is_branch_missing(&output.stderr) {
                    return Err(self.branch_not_found(sub_op, deadline).await);
                }

                return Err(self.installation(sub_op, &call, &output));
            }
        }

        Ok(())
    }

    /// Checkout primary branch.
    #[instrument(skip(self, deadline), level = "debug")]
    pub async fn switch_to_primary_branch(&self, deadline: Deadline) -> Result<()> {
        let branch = self.remote.branch.clone();
        self.git_ok("checkout-branch", ["checkout", branch.as_str()], deadline)
            .await
            .map(drop)
    }

    /// Create new branch and check it out.
    #[instrument(skip(self, deadline), level = "debug")]
    pub async fn create_and_checkout_branch(&self, name: &str, deadline: Deadline) -> Result<()> {
        self.git_ok("create-branch", ["checkout", "-b", name], deadline)
            .await
            .map(drop)
    }

    /// Stage everything in working clone and commit it.
    ///
    /// Returns [`CommitOutcome::NothingToCommit`] if staging produced no
    /// difference against HEAD.
    #[instrument(skip(self, deadline), level = "debug")]
    pub async fn commit(&self, message: &str, deadline: Deadline) -> Result<CommitOutcome> {
        self.git_ok("git-add", ["add", "."], deadline).await?;

        let call = self.in_clone(["diff", "--cached", "--quiet", "--exit-code"]);
        let output = self.exec("git-diff", &call, deadline).await?;
        match output.code {
            Some(0) => return Ok(CommitOutcome::NothingToCommit),
            Some(1) => {}
            _ => return Err(self.installation("git-diff", &call, &output)),
        }

        self.git_ok("git-commit", ["commit", "-m", message], deadline)
            .await?;
        Ok(CommitOutcome::Committed)
    }

    /// Push branch to origin and set it as upstream.
    ///
    /// Requires a [`PrivacyClearance`] issued for this repository.
    #[instrument(skip(self, clearance, deadline), level = "debug")]
    pub async fn push(
        &self,
        clearance: &PrivacyClearance,
        branch: &str,
        deadline: Deadline,
    ) -> Result<()> {
        if !clearance.covers(&self.remote.repo) {
            return Err(AnvilError::validation(
                self.op,
                "git-push",
                "privacy clearance was issued for a different repository",
            )
            .with_context(self.remote.repo.clone()));
        }

        self.git_ok("git-push", ["push", "--set-upstream", "origin", branch], deadline)
            .await
            .map(drop)
    }

    /// Reset staged changes, and remove untracked files and directories.
    #[instrument(skip(self, deadline), level = "debug")]
    pub async fn ensure_clean_state(&self, deadline: Deadline) -> Result<()> {
        self.git_ok("git-reset", ["reset", "--hard", "--quiet", "HEAD"], deadline)
            .await?;
        self.git_ok("git-clean", ["clean", "-fd", "--quiet"], deadline)
            .await?;
        Ok(())
    }

    /// Discard everything a declined push left behind and return to primary
    /// branch.
    #[instrument(skip(self, deadline), level = "debug")]
    pub async fn cleanup_staged_changes(&self, deadline: Deadline) -> Result<()> {
        self.ensure_clean_state(deadline).await?;
        self.switch_to_primary_branch(deadline).await
    }

    /// Porcelain status of working clone.
    pub async fn status(&self, deadline: Deadline) -> Result<String> {
        self.git_ok("git-status", ["status", "--porcelain"], deadline)
            .await
            .map(|output| output.stdout)
    }

    /// Stage every change below target path of working clone.
    pub async fn stage_path(&self, relative: &Path, deadline: Deadline) -> Result<()> {
        let relative = relative.to_string_lossy();
        self.git_ok("git-add", ["add", "-A", "--", relative.as_ref()], deadline)
            .await
            .map(drop)
    }

    /// One-line summary of staged changes below target path, as `git diff --shortstat`.
    pub async fn staged_stat(&self, relative: &Path, deadline: Deadline) -> Result<String> {
        let relative = relative.to_string_lossy();
        self.git_ok(
            "diff-stat",
            ["diff", "--cached", "--shortstat", "--no-color", "--", relative.as_ref()],
            deadline,
        )
        .await
        .map(|output| output.stdout)
    }

    /// Unified diff of staged changes below target path.
    pub async fn staged_patch(&self, relative: &Path, deadline: Deadline) -> Result<String> {
        let relative = relative.to_string_lossy();
        self.git_ok(
            "diff-patch",
            ["diff", "--cached", "--no-color", "--", relative.as_ref()],
            deadline,
        )
        .await
        .map(|output| output.stdout)
    }

    /// Paths touched by HEAD commit, relative to clone root.
    pub async fn committed_files(&self, deadline: Deadline) -> Result<Vec<PathBuf>> {
        let output = self
            .git_ok(
                "list-committed",
                ["diff-tree", "--no-commit-id", "--name-only", "-r", "HEAD"],
                deadline,
            )
            .await?;

        Ok(output
            .stdout
            .lines()
            .filter(|line| !line.is_empty())
            .map(PathBuf::from)
            .collect())
    }

    async fn configure_identity(&self, deadline: Deadline) -> Result<()> {
        for (key, value) in [
            ("user.name", self.remote.username.as_str()),
            ("user.email", self.remote.email.as_str()),
        ] {
            if value.is_empty() {
                continue;
            }

            let call = self.in_clone(["config", key, value]);
            let output = self.exec("configure-identity", &call, deadline).await?;
            if !output.success() {
                return Err(AnvilError::configuration(
                    self.op,
                    "configure-identity",
                    self.command_failed(&call, &output),
                ));
            }
        }

        Ok(())
    }

    async fn require_clone(&self, sub_op: &'static str, deadline: Deadline) -> Result<()> {
        if self.is_valid_clone(deadline).await {
            return Ok(());
        }

        Err(AnvilError::validation(self.op, sub_op, "working clone is missing or invalid")
            .with_context(self.remote.local_path.display().to_string())
            .with_hint("clone the repository first"))
    }

    async fn branch_not_found(&self, sub_op: &'static str, deadline: Deadline) -> AnvilError {
        let available = match self.available_branches(deadline).await {
            Ok(branches) => branches,
            Err(error) => {
                warn!("cannot list remote branches: {error}");
                Vec::new()
            }
        };

        let hint = if available.is_empty() {
            "verify github.config_repo and github.branch in your settings".to_string()
        } else {
            format!(
                "set github.branch to one of the available branches: {}",
                available.join(", ")
            )
        };

        AnvilError::configuration(
            self.op,
            sub_op,
            BranchNotFound {
                branch: self.remote.branch.clone(),
                repo: self.remote.repo.clone(),
                available,
            },
        )
        .with_context(self.remote.repo.clone())
        .with_hint(hint)
    }

    async fn git_ok(
        &self,
        sub_op: &'static str,
        args: impl IntoIterator<Item = impl Into<String>>,
        deadline: Deadline,
    ) -> Result<CommandOutput> {
        let call = self.in_clone(args);
        let output = self.exec(sub_op, &call, deadline).await?;
        if !output.success() {
            return Err(self.installation(sub_op, &call, &output));
        }

        Ok(output)
    }

    async fn exec(
        &self,
        sub_op: &'static str,
        call: &Invocation,
        deadline: Deadline,
    ) -> Result<CommandOutput> {
        self.runner.run(call, deadline).await.map_err(|error| match error {
            RunError::TimedOut { .. } => AnvilError::network(self.op, sub_op, error),
            RunError::Spawn { .. } => AnvilError::installation(self.op, sub_op, error)
                .with_hint("make sure git is installed and on PATH"),
        })
    }

    fn in_clone(&self, args: impl IntoIterator<Item = impl Into<String>>) -> Invocation {
        Invocation::git(args).in_dir(&self.remote.local_path)
    }

    fn command_failed(&self, call: &Invocation, output: &CommandOutput) -> CommandFailed {
        CommandFailed {
            command: call.to_string(),
            code: output.code,
            stderr: redact(output.stderr.trim()).into_owned(),
        }
    }

    fn installation(&self, sub_op: &'static str, call: &Invocation, output: &CommandOutput) -> AnvilError {
        AnvilError::installation(self.op, sub_op, self.command_failed(call, output))
    }

    fn io_error(&self, sub_op: &'static str, path: &Path, error: std::io::Error) -> AnvilError {
        AnvilError::filesystem(self.op, sub_op, error).with_context(path.display().to_string())
    }
}

fn is_branch_missing(stderr: &str) -> bool {
    BRANCH_MISSING_MARKERS
        .iter()
        .any(|marker| stderr.contains(marker))
}

fn parse_heads(listing: &str) -> Vec<String> {
    listing
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .filter_map(|reference| reference.strip_prefix("refs/heads/"))
        .map(ToString::to_string)
        .collect()
}

/// Configured branch does not exist on remote.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "branch {branch:?} not found in repository {repo:?} (available: {})",
    list_or_none(.available)
)]
pub struct BranchNotFound {
    pub branch: String,
    pub repo: String,
    pub available: Vec<String>,
}

/// External git command exited unsuccessfully.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("`{command}` failed with exit code {}: {stderr}", code_or_signal(.code))]
pub struct CommandFailed {
    pub command: String,
    pub code: Option<i32>,
    pub stderr: String,
}

fn list_or_none(items: &[String]) -> String {
    if items.is_empty() {
        return "none".into();
    }

    items.join(", ")
}

fn code_or_signal(code: &Option<i32>) -> String {
    code.map_or_else(|| "signal".into(), |code| code.to_string())
}
