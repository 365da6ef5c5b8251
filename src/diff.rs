// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Change detection between local artifacts and the working clone.
//!
//! [`has_changes`] answers whether pushing a local artifact would change the
//! working clone. It compares raw bytes only. Line endings, trailing
//! whitespace, and encodings are never normalized, so what counts as a change
//! here is exactly what git would record.
//!
//! [`preview`] produces the human readable summary shown before a push. It
//! stages the local artifact inside the working clone, asks git for the
//! summary, and restores the clone before returning.

use crate::{
    copy::{copy_path, is_empty_artifact, list_dirs, list_files, CopyError},
    error::{AnvilError, Result},
    git::{CommandRunner, Deadline, RemoteGateway},
};

use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, instrument, warn};

/// Full diff is shown only for single file changes at most this long.
pub const FULL_DIFF_MAX_LINES: usize = 50;

/// Summary of pending changes for one artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffSummary {
    /// Output of `git diff --shortstat` for the artifact.
    pub stat: String,

    /// Unified diff, only present for small single file changes.
    pub full_diff: Option<String>,

    pub total_files: usize,
}

/// Check whether local artifact differs from target in working clone.
///
/// # Errors
///
/// - Return [`CopyError`] if either side cannot be read.
pub fn has_changes(local: &Path, target: &Path) -> std::result::Result<bool, CopyError> {
    if !exists(target) {
        return Ok(!is_empty_artifact(local)?);
    }

    // Overlay copies never delete, so a missing local artifact pushes nothing.
    if !exists(local) {
        return Ok(false);
    }

    match (local.is_dir(), target.is_dir()) {
        (true, true) => trees_differ(local, target),
        (false, false) => files_differ(local, target),
        _ => Ok(true),
    }
}

/// Path in working clone that local artifact is compared with and copied to.
///
/// Directories map onto the app directory itself. Files land inside it under
/// their own file name.
pub fn push_target(local: &Path, app_dir: &Path) -> PathBuf {
    match (local.is_dir(), local.file_name()) {
        (false, Some(name)) => app_dir.join(name),
        _ => app_dir.to_path_buf(),
    }
}

/// Stage local artifact in working clone and summarize the changes.
///
/// `target` is relative to the clone root. The clone is restored to a clean
/// state before returning, whether or not the preview succeeded.
///
/// # Errors
///
/// - Return filesystem error if the artifact cannot be copied into the clone.
/// - Return error if git cannot stage or diff the artifact.
#[instrument(skip(gateway, deadline), level = "debug")]
pub async fn preview<R>(
    gateway: &RemoteGateway<R>,
    local: &Path,
    target: &Path,
    deadline: Deadline,
) -> Result<DiffSummary>
where
    R: CommandRunner,
{
    let summary = staged_summary(gateway, local, target, deadline).await;
    let restored = gateway.ensure_clean_state(deadline).await;

    match (summary, restored) {
        (Ok(summary), Ok(())) => Ok(summary),
        (Ok(_), Err(error)) => Err(error),
        (Err(error), Err(restore)) => {
            warn!("cannot restore working clone after failed preview: {restore}");
            Err(error)
        }
        (Err(error), Ok(())) => Err(error),
    }
}

async fn staged_summary<R>(
    gateway: &RemoteGateway<R>,
    local: &Path,
    target: &Path,
    deadline: Deadline,
) -> Result<DiffSummary>
where
    R: CommandRunner,
{
    let absolute = gateway.local_path().join(target);
    copy_path(local, &absolute).map_err(|error| {
        AnvilError::filesystem(gateway.op(), "diff-preview", error)
            .with_context(absolute.display().to_string())
    })?;

    gateway.stage_path(target, deadline).await?;
    let stat = gateway.staged_stat(target, deadline).await?;
    let total_files = parse_file_count(&stat);
    let full_diff = match total_files {
        1 => {
            let patch = gateway.staged_patch(target, deadline).await?;
            Some(patch).filter(|patch| patch.lines().count() <= FULL_DIFF_MAX_LINES)
        }
        _ => None,
    };

    debug!("preview of {} touches {total_files} file(s)", target.display());
    Ok(DiffSummary {
        stat,
        full_diff,
        total_files,
    })
}

/// Extract file count from the summary line of `git diff --shortstat`.
fn parse_file_count(stat: &str) -> usize {
    stat.lines()
        .rev()
        .find(|line| line.contains("changed"))
        .and_then(|line| line.split_whitespace().next())
        .and_then(|count| count.parse().ok())
        .unwrap_or(0)
}

fn exists(path: &Path) -> bool {
    path.exists() || path.is_symlink()
}

fn trees_differ(local: &Path, target: &Path) -> std::result::Result<bool, CopyError> {
    let local_dirs: BTreeSet<_> = list_dirs(local)?.into_iter().collect();
    let target_dirs: BTreeSet<_> = list_dirs(target)?.into_iter().collect();
    if local_dirs != target_dirs {
        return Ok(true);
    }

    let local_files: BTreeSet<_> = list_files(local)?.into_iter().collect();
    let target_files: BTreeSet<_> = list_files(target)?.into_iter().collect();
    if local_files != target_files {
        return Ok(true);
    }

    for relative in &local_files {
        if files_differ(&local.join(relative), &target.join(relative))? {
            debug!("{} differs", relative.display());
            return Ok(true);
        }
    }

    Ok(false)
}

fn files_differ(a: &Path, b: &Path) -> std::result::Result<bool, CopyError> {
    match (a.is_symlink(), b.is_symlink()) {
        (true, true) => {
            let a_link = fs::read_link(a).map_err(|error| CopyError::io(a, error))?;
            let b_link = fs::read_link(b).map_err(|error| CopyError::io(b, error))?;
            return Ok(a_link != b_link);
        }
        (false, false) => {}
        _ => return Ok(true),
    }

    let a_meta = fs::metadata(a).map_err(|error| CopyError::io(a, error))?;
    let b_meta = fs::metadata(b).map_err(|error| CopyError::io(b, error))?;
    if a_meta.len() != b_meta.len() {
        return Ok(true);
    }

    let a_bytes = fs::read(a).map_err(|error| CopyError::io(a, error))?;
    let b_bytes = fs::read(b).map_err(|error| CopyError::io(b, error))?;
    Ok(a_bytes != b_bytes)
}
