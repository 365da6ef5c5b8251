// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Pull, push, and sync orchestration.
//!
//! A [`Session`] bundles every collaborator the three commands need: the
//! settings store, a command runner for git, a visibility probe for the
//! privacy gate, the process environment, an output sink, and a prompter.
//! Each command lives in its own submodule as an inherent method on
//! [`Session`].
//!
//! # Preamble
//!
//! Pull and push begin the same way: load settings, validate the remote
//! section, resolve the access token, and build a [`RemoteGateway`]. That
//! work lives in one preamble dispatched on [`Operation`], so per-command
//! differences such as the push credential preflight stay in one place.
//!
//! # Deadlines
//!
//! Every git step receives a fresh [`Deadline`] derived from the session
//! timeout. Waiting on the user at a confirmation prompt never counts against
//! it.

pub mod pull;
pub mod push;
pub mod sync;

pub use pull::PullReport;
pub use push::{PushOutcome, PushResult};
pub use sync::{SyncOutcome, SyncReport};

use crate::{
    archive::timestamp,
    config::Settings,
    env::Environment,
    error::{AnvilError, Operation, Result},
    git::{runner::DEFAULT_TIMEOUT, url::is_github, CommandRunner, Deadline, RemoteGateway, RemoteSettings},
    privacy::VisibilityProbe,
    store::SettingsStore,
    ui::{OutputSink, Prompter},
};

use chrono::{DateTime, TimeZone};
use std::{fmt::Display, path::PathBuf, sync::Arc, time::Duration};
use tracing::{debug, instrument};

/// Prefix of branches created by push.
pub const PUSH_BRANCH_PREFIX: &str = "config-push";

/// Name of push branch minted at target time.
pub fn push_branch_name<Tz>(now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    format!("{PUSH_BRANCH_PREFIX}-{}", timestamp(now))
}

/// Collaborators for one command invocation.
pub struct Session<'a, R, V>
where
    R: CommandRunner,
    V: VisibilityProbe,
{
    store: &'a SettingsStore,
    runner: R,
    probe: V,
    env: &'a dyn Environment,
    sink: &'a dyn OutputSink,
    prompter: &'a dyn Prompter,
    dry_run: bool,
    timeout: Duration,
}

impl<'a, R, V> Session<'a, R, V>
where
    R: CommandRunner,
    V: VisibilityProbe,
{
    /// Construct new session.
    pub fn new(
        store: &'a SettingsStore,
        runner: R,
        probe: V,
        env: &'a dyn Environment,
        sink: &'a dyn OutputSink,
        prompter: &'a dyn Prompter,
    ) -> Self {
        Self {
            store,
            runner,
            probe,
            env,
            sink,
            prompter,
            dry_run: false,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Skip every mutating step, but still report what would happen.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Bound each external command by target timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn store(&self) -> &SettingsStore {
        self.store
    }

    fn deadline(&self) -> Deadline {
        Deadline::after(self.timeout)
    }

    fn confirm(&self, op: Operation, question: &str) -> Result<bool> {
        self.prompter
            .confirm(question)
            .map_err(|error| AnvilError::general(op, "confirm", error))
    }

    /// Load settings and validate the sections target operation relies on.
    fn validated_settings(&self, op: Operation) -> Result<Arc<Settings>> {
        let settings = self.store.load()?;

        if matches!(op, Operation::Pull | Operation::Push) {
            let github = &settings.github;
            for (field, blank) in [
                ("github.config_repo", github.config_repo.trim().is_empty()),
                ("github.branch", github.branch.trim().is_empty()),
                ("github.local_path", github.local_path.as_os_str().is_empty()),
            ] {
                if blank {
                    return Err(AnvilError::configuration(
                        op,
                        "validate-settings",
                        MissingSetting { field },
                    )
                    .with_context(self.store.path().display().to_string())
                    .with_hint(format!("set {field} in your settings file")));
                }
            }
        }

        Ok(settings)
    }

    /// Shared start of pull and push.
    #[instrument(skip(self), level = "debug")]
    async fn preamble(&self, op: Operation) -> Result<Preamble<'_, R>> {
        let settings = self.validated_settings(op)?;
        let token = self.resolve_token(&settings);

        if op == Operation::Push && token.is_none() && is_github(&settings.github.config_repo) {
            let key = &settings.git.ssh_key_path;
            if key.as_os_str().is_empty() || !key.is_file() {
                return Err(AnvilError::configuration(
                    op,
                    "credentials",
                    MissingCredentials {
                        env_var: settings.github.token_env_var().to_string(),
                        ssh_key_path: key.clone(),
                    },
                )
                .with_hint(format!(
                    "export {} with a personal access token, or set git.ssh_key_path",
                    settings.github.token_env_var()
                )));
            }
        }

        let remote = RemoteSettings::from_settings(&settings, token);
        let gateway = RemoteGateway::new(remote, &self.runner, op);
        Ok(Preamble { settings, gateway })
    }

    fn resolve_token(&self, settings: &Settings) -> Option<String> {
        let env_var = settings.github.token_env_var();
        if let Some(token) = self.env.var(env_var).filter(|token| !token.trim().is_empty()) {
            debug!("using access token from ${env_var}");
            return Some(token.trim().to_string());
        }

        if let Some(token) = settings.github.token.as_ref().filter(|token| !token.is_empty()) {
            self.sink.warning(&format!(
                "Using github.token from the settings file, prefer exporting {env_var} instead"
            ));
            return Some(token.clone());
        }

        self.sink.warning(&format!(
            "GitHub token not found in environment variable {env_var}"
        ));
        self.sink.info("Proceeding with SSH authentication if available");
        None
    }
}

/// Validated settings and gateway shared by pull and push.
struct Preamble<'r, R>
where
    R: CommandRunner,
{
    settings: Arc<Settings>,
    gateway: RemoteGateway<&'r R>,
}

/// Required settings field is blank.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field} is not configured")]
pub struct MissingSetting {
    pub field: &'static str,
}

/// Neither token nor SSH key is available for a GitHub remote.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no access token in ${env_var} and no SSH key at {ssh_key_path:?}")]
pub struct MissingCredentials {
    pub env_var: String,
    pub ssh_key_path: PathBuf,
}
