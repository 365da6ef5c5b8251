// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Pull remote configuration into staging.
//!
//! A pull never writes to a user destination. It refreshes the working clone
//! and copies `<clone>/<app>` to `<config-root>/temp/<app>`, replacing any
//! earlier staging of the same app. Applying staged files is the job of sync.

use crate::{
    copy::{copy_path, list_files},
    error::{AnvilError, Operation, Result},
    flow::{Preamble, Session},
    git::CommandRunner,
    privacy::VisibilityProbe,
    resolve::Target,
};

use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{info, instrument};

/// What a pull staged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullReport {
    pub target: Target,

    /// Staging directory of target.
    pub staging_path: PathBuf,

    /// Files staged, relative to staging directory.
    pub files: Vec<PathBuf>,

    /// Nothing was cloned or staged.
    pub dry_run: bool,
}

impl<R, V> Session<'_, R, V>
where
    R: CommandRunner,
    V: VisibilityProbe,
{
    /// Pull target from remote repository into staging.
    ///
    /// # Errors
    ///
    /// - Return configuration error if remote settings are incomplete or the
    ///   configured branch does not exist.
    /// - Return validation error if the repository has no directory for the
    ///   target.
    /// - Return error if git or the staging copy fails.
    #[instrument(skip(self), level = "debug")]
    pub async fn pull(&self, target: &Target) -> Result<PullReport> {
        let op = Operation::Pull;
        self.sink.header(&format!("Pulling {target} configuration"));

        let Preamble { settings, gateway } = self.preamble(op).await?;
        let staging_path = self.store.staging_dir(&settings, target.name());
        self.sink.info(&format!("Repository: {}", settings.github.config_repo));
        self.sink.info(&format!("Branch: {}", settings.github.branch));

        self.sink.stage("Validating repository");
        gateway.validate_repository(self.deadline()).await?;

        if self.dry_run {
            self.sink.info(&format!(
                "Dry run: would refresh {} and stage {}/ into {}",
                gateway.local_path().display(),
                target.repo_dir().display(),
                staging_path.display()
            ));
            return Ok(PullReport {
                target: target.clone(),
                staging_path,
                files: Vec::new(),
                dry_run: true,
            });
        }

        let spinner = self.sink.progress("Synchronizing working clone");
        let refreshed = async {
            gateway.clone_repository(self.deadline()).await?;
            gateway.pull_changes(self.deadline()).await?;
            Ok::<(), AnvilError>(())
        }
        .await;
        spinner.finish_and_clear();
        refreshed?;

        let source = gateway.local_path().join(target.repo_dir());
        if !source.exists() {
            let available = app_dirs(gateway.local_path());
            let hint = match available.is_empty() {
                true => "the repository holds no app directories yet".to_string(),
                false => format!("available apps: {}", available.join(", ")),
            };
            return Err(AnvilError::validation(op, "locate-app", MissingAppDir {
                app: target.name().to_string(),
            })
            .with_context(source.display().to_string())
            .with_hint(hint));
        }

        self.sink.stage("Copying to staging area");
        replace_staging(&source, &staging_path).map_err(|error| {
            AnvilError::filesystem(op, "stage-copy", error)
                .with_context(staging_path.display().to_string())
        })?;
        let files = list_files(&staging_path).map_err(|error| {
            AnvilError::filesystem(op, "stage-list", error)
                .with_context(staging_path.display().to_string())
        })?;

        info!("staged {} file(s) for {target}", files.len());
        self.sink.success(&format!(
            "Pulled {target} into {}",
            staging_path.display()
        ));
        for file in &files {
            self.sink.info(&format!("  {}", file.display()));
        }
        self.sink.info(&format!(
            "Run `anvil config sync {target}` to apply these files"
        ));

        Ok(PullReport {
            target: target.clone(),
            staging_path,
            files,
            dry_run: false,
        })
    }
}

fn replace_staging(source: &Path, staging: &Path) -> crate::copy::Result<Vec<PathBuf>> {
    let clear = if staging.is_dir() && !staging.is_symlink() {
        fs::remove_dir_all(staging)
    } else if staging.exists() || staging.is_symlink() {
        fs::remove_file(staging)
    } else {
        Ok(())
    };
    clear.map_err(|error| crate::copy::CopyError::io(staging, error))?;

    copy_path(source, staging)
}

fn app_dirs(clone: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(clone) else {
        return Vec::new();
    };

    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name != ".git")
        .collect();
    names.sort();
    names
}

/// Repository has no directory for target app.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no configuration for {app:?} in repository")]
pub struct MissingAppDir {
    pub app: String,
}
