// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Push local configuration to the remote repository.
//!
//! # Push Flow
//!
//! 1. Resolve the target. Only apps declared in `configs` whose path exists
//!    may be pushed; staged copies never are.
//! 2. Pass the privacy gate.
//! 3. Refresh the working clone on the primary branch.
//! 4. Compare the local artifact with the clone. Identical artifacts end the
//!    flow as [`PushOutcome::UpToDate`] before any branch exists.
//! 5. Show the preview and ask for confirmation.
//! 6. Create a `config-push-<DDMMYYYY-HHMM>` branch, copy, commit, and push.
//!
//! The primary branch is never committed to. Every push lands on its own
//! branch so the user can review it as a pull request.

use crate::{
    copy::copy_path,
    diff::{has_changes, preview, push_target, DiffSummary},
    error::{AnvilError, Operation, Result},
    flow::{push_branch_name, Preamble, Session},
    git::{CommandRunner, CommitOutcome},
    path::SETTINGS_FILE,
    privacy::{verify_private, VisibilityProbe},
    resolve::{PathResolver, Target},
    store::AppLocation,
};

use chrono::Local;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

/// Completed push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushResult {
    pub branch_name: String,
    pub commit_message: String,

    /// Browsable address of repository, or the repository as configured.
    pub repository_url: String,

    /// Branch the push branch was cut from.
    pub base_branch: String,

    /// Paths changed by the commit, relative to clone root.
    pub files_committed: Vec<PathBuf>,
}

impl PushResult {
    /// Address for opening a pull request from the push branch.
    pub fn compare_url(&self) -> String {
        format!(
            "{}/compare/{}...{}",
            self.repository_url, self.base_branch, self.branch_name
        )
    }
}

/// How a push ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// Local artifact matches the repository.
    UpToDate,

    /// User declined at the confirmation prompt.
    Declined,

    /// Dry run stopped after the preview.
    DryRun(DiffSummary),

    Pushed(PushResult),
}

/// Commit message used for pushes of target.
pub fn commit_message(target: &Target) -> String {
    format!("anvil[push]: {}", target.name())
}

impl<R, V> Session<'_, R, V>
where
    R: CommandRunner,
    V: VisibilityProbe,
{
    /// Push target to a fresh branch of remote repository.
    ///
    /// # Errors
    ///
    /// - Return validation error if target is not declared in `configs`, or
    ///   the privacy gate refuses.
    /// - Return network error if the repository cannot be accessed.
    /// - Return error if any git step or copy fails.
    #[instrument(skip(self), level = "debug")]
    pub async fn push(&self, target: &Target) -> Result<PushOutcome> {
        let op = Operation::Push;
        self.sink.header(&format!("Pushing {target} configuration"));

        let Preamble { settings, gateway } = self.preamble(op).await?;
        let local = self.pushable_path(target)?;
        self.sink.info(&format!("Repository: {}", settings.github.config_repo));
        self.sink.info(&format!("Branch: {}", settings.github.branch));
        self.sink.info(&format!("Source: {}", local.display()));
        self.sink.warning(
            "Configuration files may contain secrets. Review the changes before confirming.",
        );

        // INVARIANT: Nothing below may run without a clearance for this repository.
        let clearance = verify_private(&gateway, &self.probe, self.sink, self.deadline()).await?;

        let spinner = self.sink.progress("Preparing working clone");
        let prepared = async {
            gateway.clone_repository(self.deadline()).await?;
            gateway.switch_to_primary_branch(self.deadline()).await?;
            gateway.pull_changes(self.deadline()).await?;
            gateway.ensure_clean_state(self.deadline()).await?;
            Ok::<(), AnvilError>(())
        }
        .await;
        spinner.finish_and_clear();
        prepared?;

        let relative = clone_target(target, &local);
        let absolute = gateway.local_path().join(&relative);
        let changed = has_changes(&local, &absolute).map_err(|error| {
            AnvilError::filesystem(op, "detect-changes", error)
                .with_context(local.display().to_string())
        })?;
        if !changed {
            self.sink.success(&format!("{target} is up to date, nothing to push"));
            return Ok(PushOutcome::UpToDate);
        }

        self.sink.stage("Previewing changes");
        let summary = preview(&gateway, &local, &relative, self.deadline()).await?;
        if summary.total_files == 0 {
            self.sink.success(&format!("{target} is up to date, nothing to push"));
            return Ok(PushOutcome::UpToDate);
        }
        self.show_preview(&summary);

        if self.dry_run {
            self.sink.info("Dry run: no branch created, nothing committed or pushed");
            return Ok(PushOutcome::DryRun(summary));
        }

        let question = format!("Push these changes to {}?", settings.github.config_repo);
        if !self.confirm(op, &question)? {
            gateway.cleanup_staged_changes(self.deadline()).await?;
            self.sink.info("Push cancelled");
            return Ok(PushOutcome::Declined);
        }

        let branch_name = push_branch_name(&Local::now());
        let message = commit_message(target);
        gateway
            .create_and_checkout_branch(&branch_name, self.deadline())
            .await?;
        copy_path(&local, &absolute).map_err(|error| {
            AnvilError::filesystem(op, "copy-to-clone", error)
                .with_context(absolute.display().to_string())
        })?;

        match gateway.commit(&message, self.deadline()).await? {
            CommitOutcome::Committed => {}
            CommitOutcome::NothingToCommit => {
                gateway.cleanup_staged_changes(self.deadline()).await?;
                self.sink.success(&format!("{target} is up to date, nothing to push"));
                return Ok(PushOutcome::UpToDate);
            }
        }

        let spinner = self.sink.progress(&format!("Pushing {branch_name}"));
        let pushed = gateway.push(&clearance, &branch_name, self.deadline()).await;
        spinner.finish_and_clear();
        pushed?;

        let files_committed = gateway.committed_files(self.deadline()).await?;
        if let Err(error) = gateway.switch_to_primary_branch(self.deadline()).await {
            warn!("cannot return working clone to primary branch: {error}");
        }

        let result = PushResult {
            branch_name,
            commit_message: message,
            repository_url: gateway
                .web_url()
                .unwrap_or_else(|| settings.github.config_repo.clone()),
            base_branch: settings.github.branch.clone(),
            files_committed,
        };
        info!("pushed {target} to {}", result.branch_name);
        self.report_push(&result);

        Ok(PushOutcome::Pushed(result))
    }

    /// Render filtered settings document that sync filtering would share.
    ///
    /// # Errors
    ///
    /// - Return error if settings cannot be loaded or filtered.
    pub fn show_filtered(&self) -> Result<String> {
        let op = Operation::Push;
        let settings = self.validated_settings(Operation::Settings)?;
        let filtered = settings
            .filter_for_sync()
            .map_err(|error| AnvilError::configuration(op, "filter-settings", error))?;

        let rules = &settings.sync_config;
        self.sink.header("Filtered configuration");
        for (label, sections) in [
            ("Excluded sections", &rules.exclude_sections),
            ("Templated sections", &rules.template_sections),
            ("Force included", &rules.include_override),
        ] {
            if !sections.is_empty() {
                self.sink.info(&format!("{label}: {}", sections.join(", ")));
            }
        }

        let rendered = filtered.to_string();
        self.sink.info(&rendered);
        self.sink
            .success("Preview complete, run without --show-filtered to push");
        Ok(rendered)
    }

    fn pushable_path(&self, target: &Target) -> Result<PathBuf> {
        let op = Operation::Push;
        match PathResolver::new(self.store).resolve(target)? {
            AppLocation::FromConfigs(path) => Ok(path),
            AppLocation::FromTemp(path) => Err(AnvilError::validation(
                op,
                "resolve-app",
                NotPushable::StagedOnly {
                    app: target.name().to_string(),
                    staging: path,
                },
            )
            .with_hint(format!(
                "add `{} = \"/path/to/config\"` under [configs] in your settings file",
                target.name()
            ))),
            AppLocation::NotFound => Err(AnvilError::validation(
                op,
                "resolve-app",
                NotPushable::Unknown {
                    app: target.name().to_string(),
                },
            )
            .with_hint(format!(
                "add `{} = \"/path/to/config\"` under [configs] in your settings file",
                target.name()
            ))),
        }
    }

    fn show_preview(&self, summary: &DiffSummary) {
        self.sink.info(&format!("{} file(s) changed", summary.total_files));
        for line in summary.stat.lines() {
            self.sink.info(line);
        }

        if let Some(diff) = &summary.full_diff {
            for line in diff.lines() {
                self.sink.info(line);
            }
        }
    }

    fn report_push(&self, result: &PushResult) {
        self.sink.success("Configuration push completed");
        self.sink.info(&format!("Branch created: {}", result.branch_name));
        self.sink.info(&format!("Commit message: {}", result.commit_message));
        for file in &result.files_committed {
            self.sink.info(&format!("  {}", file.display()));
        }
        self.sink.info(&format!("Open a pull request: {}", result.compare_url()));
    }
}

/// Path of target inside working clone, relative to clone root.
fn clone_target(target: &Target, local: &Path) -> PathBuf {
    match target {
        Target::Settings => target.repo_dir().join(SETTINGS_FILE),
        Target::App(_) => push_target(local, &target.repo_dir()),
    }
}

/// Target cannot be pushed from where it resolved.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotPushable {
    /// Only a staged copy exists.
    #[error("{app:?} only exists in staging at {staging:?}, declare it in configs to push")]
    StagedOnly { app: String, staging: PathBuf },

    #[error("{app:?} is not declared in configs")]
    Unknown { app: String },
}
