// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Filesystem copy primitives.
//!
//! Configuration artifacts move between the user's paths, the working clone,
//! the staging area, and the archive area. All of those moves go through the
//! functions here, which share a few rules:
//!
//! - Hidden files and ignore files are never skipped. A `.gitignore` inside a
//!   configuration directory is configuration too.
//! - File permission bits travel with file contents.
//! - Directory copies overlay. Paths only present at the destination are left
//!   alone.

use ignore::{DirEntry, WalkBuilder};
use std::{
    fs, io,
    path::{Path, PathBuf},
};

/// Copy file to target path, creating parent directories as needed.
///
/// An existing directory at the target is replaced.
///
/// # Errors
///
/// - Return [`CopyError::Io`] if any filesystem operation fails.
pub fn copy_file(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).map_err(|error| CopyError::io(parent, error))?;
    }

    if dst.is_dir() && !dst.is_symlink() {
        fs::remove_dir_all(dst).map_err(|error| CopyError::io(dst, error))?;
    }

    // INVARIANT: fs::copy carries permission bits over to the destination.
    fs::copy(src, dst).map_err(|error| CopyError::io(src, error))?;
    Ok(())
}

/// Overlay directory tree onto target directory.
///
/// Every path under `src` is written to the same relative path under `dst`,
/// replacing what was there. Paths only present under `dst` survive. Returns
/// relative paths of files written.
///
/// # Errors
///
/// - Return [`CopyError::Io`] if any filesystem operation fails.
/// - Return [`CopyError::Walk`] if `src` cannot be traversed.
pub fn overlay_dir(src: &Path, dst: &Path) -> Result<Vec<PathBuf>> {
    if dst.exists() && !dst.is_dir() {
        fs::remove_file(dst).map_err(|error| CopyError::io(dst, error))?;
    }
    fs::create_dir_all(dst).map_err(|error| CopyError::io(dst, error))?;

    let mut written = Vec::new();
    for entry in walk(src) {
        let entry = entry?;
        if entry.depth() == 0 {
            continue;
        }

        let relative = relative_to(src, entry.path());
        let target = dst.join(&relative);
        match entry.file_type() {
            Some(kind) if kind.is_dir() => {
                if target.exists() && !target.is_dir() {
                    fs::remove_file(&target).map_err(|error| CopyError::io(&target, error))?;
                }
                fs::create_dir_all(&target).map_err(|error| CopyError::io(&target, error))?;
            }
            Some(kind) if kind.is_symlink() => {
                copy_symlink(entry.path(), &target)?;
                written.push(relative);
            }
            _ => {
                copy_file(entry.path(), &target)?;
                written.push(relative);
            }
        }
    }

    Ok(written)
}

/// Copy file or directory into target path.
///
/// Directories overlay onto `dst`, files replace `dst`. Returns relative
/// paths of files written; a single file is reported by its file name.
///
/// # Errors
///
/// - Return [`CopyError`] if the copy fails.
pub fn copy_path(src: &Path, dst: &Path) -> Result<Vec<PathBuf>> {
    if src.is_dir() {
        return overlay_dir(src, dst);
    }

    copy_file(src, dst)?;
    Ok(src.file_name().map(PathBuf::from).into_iter().collect())
}

/// Enumerate files below target root as sorted relative paths.
///
/// A root that is itself a file yields its own file name. A missing root
/// yields nothing.
///
/// # Errors
///
/// - Return [`CopyError::Walk`] if `root` cannot be traversed.
pub fn list_files(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.exists() && !root.is_symlink() {
        return Ok(Vec::new());
    }

    if !root.is_dir() {
        return Ok(root.file_name().map(PathBuf::from).into_iter().collect());
    }

    let mut files = Vec::new();
    for entry in walk(root) {
        let entry = entry?;
        if entry.depth() == 0 || entry.file_type().is_some_and(|kind| kind.is_dir()) {
            continue;
        }
        files.push(relative_to(root, entry.path()));
    }

    Ok(files)
}

/// Enumerate directories below target root as sorted relative paths.
///
/// # Errors
///
/// - Return [`CopyError::Walk`] if `root` cannot be traversed.
pub fn list_dirs(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Ok(Vec::new());
    }

    let mut dirs = Vec::new();
    for entry in walk(root) {
        let entry = entry?;
        if entry.depth() > 0 && entry.file_type().is_some_and(|kind| kind.is_dir()) {
            dirs.push(relative_to(root, entry.path()));
        }
    }

    Ok(dirs)
}

/// Path is missing, an empty file, or an empty directory.
///
/// # Errors
///
/// - Return [`CopyError::Io`] if `path` cannot be inspected.
pub fn is_empty_artifact(path: &Path) -> Result<bool> {
    if !path.exists() {
        return Ok(true);
    }

    if path.is_dir() {
        let mut entries = fs::read_dir(path).map_err(|error| CopyError::io(path, error))?;
        return Ok(entries.next().is_none());
    }

    let metadata = fs::metadata(path).map_err(|error| CopyError::io(path, error))?;
    Ok(metadata.len() == 0)
}

fn walk(root: &Path) -> impl Iterator<Item = Result<DirEntry>> {
    WalkBuilder::new(root)
        .standard_filters(false)
        .follow_links(false)
        .sort_by_file_path(|a, b| a.cmp(b))
        .build()
        .map(|entry| entry.map_err(CopyError::Walk))
}

fn relative_to(root: &Path, path: &Path) -> PathBuf {
    path.strip_prefix(root)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    let link = fs::read_link(src).map_err(|error| CopyError::io(src, error))?;
    if dst.is_symlink() || dst.is_file() {
        fs::remove_file(dst).map_err(|error| CopyError::io(dst, error))?;
    } else if dst.is_dir() {
        fs::remove_dir_all(dst).map_err(|error| CopyError::io(dst, error))?;
    }

    std::os::unix::fs::symlink(&link, dst).map_err(|error| CopyError::io(dst, error))
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    copy_file(src, dst)
}

/// Filesystem copy errors.
#[derive(Debug, thiserror::Error)]
pub enum CopyError {
    /// Filesystem operation failed at path.
    #[error("filesystem operation failed at {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Directory traversal failed.
    #[error(transparent)]
    Walk(#[from] ignore::Error),
}

impl CopyError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Friendly result alias :3
pub type Result<T, E = CopyError> = std::result::Result<T, E>;
