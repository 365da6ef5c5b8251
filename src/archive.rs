// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Pre-overwrite snapshots.
//!
//! Before sync replaces anything at a user destination, the current state of
//! that destination is copied into a fresh directory under
//! `<config-root>/archive`. Archive directories are named
//! `<prefix>-<DDMMYYYY-HHMM>`, with `-1`, `-2`, and so on appended when the
//! same prefix is archived twice within one minute. Anvil never deletes
//! archives.

use crate::copy::{copy_path, CopyError};

use chrono::{DateTime, Local, TimeZone};
use std::{
    fmt::Display,
    fs, io,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};

/// Timestamp layout used for archive directories and push branches.
pub const TIMESTAMP_FORMAT: &str = "%d%m%Y-%H%M";

/// Format timestamp as `DDMMYYYY-HHMM`.
pub fn timestamp<Tz>(now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    now.format(TIMESTAMP_FORMAT).to_string()
}

/// Manager of archive area.
#[derive(Debug, Clone)]
pub struct ArchiveManager {
    root: PathBuf,
}

impl ArchiveManager {
    /// Construct new archive manager for target configuration root.
    pub fn new(config_root: impl AsRef<Path>) -> Self {
        Self {
            root: config_root.as_ref().join("archive"),
        }
    }

    /// Directory that holds all archives.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create fresh archive directory named after prefix and current time.
    ///
    /// # Errors
    ///
    /// - Return [`CopyError::Io`] if the directory cannot be created.
    pub fn create_archive_dir(&self, prefix: &str) -> Result<PathBuf> {
        self.create_archive_dir_at(prefix, &Local::now())
    }

    /// Create fresh archive directory named after prefix and target time.
    ///
    /// # Errors
    ///
    /// - Return [`CopyError::Io`] if the directory cannot be created.
    #[instrument(skip(self, now), level = "debug")]
    pub fn create_archive_dir_at<Tz>(&self, prefix: &str, now: &DateTime<Tz>) -> Result<PathBuf>
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        fs::create_dir_all(&self.root).map_err(|error| CopyError::io(&self.root, error))?;

        let base = format!("{prefix}-{}", timestamp(now));
        let mut attempt = 0_u32;
        loop {
            let name = match attempt {
                0 => base.clone(),
                n => format!("{base}-{n}"),
            };
            let candidate = self.root.join(name);

            // INVARIANT: create_dir fails on collision, so no two invocations
            // ever share an archive directory.
            match fs::create_dir(&candidate) {
                Ok(()) => {
                    debug!("created archive directory {}", candidate.display());
                    return Ok(candidate);
                }
                Err(error) if error.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
                Err(error) => return Err(CopyError::io(&candidate, error)),
            }
        }
    }

    /// Copy existing configuration into archive directory.
    ///
    /// The source lands at `<archive_dir>/<file name of source>`, recursively
    /// for directories. A missing source is not an error and yields `None`.
    ///
    /// # Errors
    ///
    /// - Return [`CopyError`] if the copy fails.
    #[instrument(skip(self, source, archive_dir), level = "debug")]
    pub fn archive_existing(
        &self,
        name: &str,
        source: &Path,
        archive_dir: &Path,
    ) -> Result<Option<PathBuf>> {
        if !source.exists() {
            debug!("nothing to archive for {name} at {}", source.display());
            return Ok(None);
        }

        let base = source
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(name));
        let target = archive_dir.join(base);
        copy_path(source, &target)?;
        info!("archived {name} to {}", target.display());

        Ok(Some(target))
    }
}

/// Friendly result alias :3
type Result<T, E = CopyError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use std::ffi::OsStr;

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 7, 12, 5, 0)
            .single()
            .expect("valid time")
    }

    #[test]
    fn archive_dir_name_uses_day_month_year() -> anyhow::Result<()> {
        let config_root = tempfile::tempdir()?;
        let manager = ArchiveManager::new(config_root.path());

        let dir = manager.create_archive_dir_at("foo-configs", &noon())?;

        assert_eq!(dir, config_root.path().join("archive/foo-configs-07032025-1205"));
        assert!(dir.is_dir());
        Ok(())
    }

    #[test]
    fn archive_dir_collisions_get_monotonic_suffix() -> anyhow::Result<()> {
        let config_root = tempfile::tempdir()?;
        let manager = ArchiveManager::new(config_root.path());

        let first = manager.create_archive_dir_at("foo", &noon())?;
        let second = manager.create_archive_dir_at("foo", &noon())?;
        let third = manager.create_archive_dir_at("foo", &noon())?;

        assert_eq!(first.file_name(), Some(OsStr::new("foo-07032025-1205")));
        assert_eq!(second.file_name(), Some(OsStr::new("foo-07032025-1205-1")));
        assert_eq!(third.file_name(), Some(OsStr::new("foo-07032025-1205-2")));
        Ok(())
    }

    #[test]
    fn archiving_missing_source_is_noop() -> anyhow::Result<()> {
        let config_root = tempfile::tempdir()?;
        let manager = ArchiveManager::new(config_root.path());
        let dir = manager.create_archive_dir("foo")?;

        let result = manager.archive_existing("foo", &config_root.path().join("missing"), &dir)?;

        assert_eq!(result, None);
        assert_eq!(fs::read_dir(&dir)?.count(), 0);
        Ok(())
    }

    #[test]
    fn archive_copies_directory_recursively() -> anyhow::Result<()> {
        let config_root = tempfile::tempdir()?;
        let dest = tempfile::tempdir()?;
        fs::write(dest.path().join("local.conf"), "L")?;
        fs::create_dir(dest.path().join("nested"))?;
        fs::write(dest.path().join("nested/shared.conf"), "old")?;
        let manager = ArchiveManager::new(config_root.path());
        let dir = manager.create_archive_dir("foo")?;

        let archived = manager
            .archive_existing("foo", dest.path(), &dir)?
            .expect("destination exists");

        assert_eq!(archived, dir.join(dest.path().file_name().expect("name")));
        assert_eq!(fs::read_to_string(archived.join("local.conf"))?, "L");
        assert_eq!(fs::read_to_string(archived.join("nested/shared.conf"))?, "old");
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn archive_preserves_file_mode() -> anyhow::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let config_root = tempfile::tempdir()?;
        let source = config_root.path().join("hook.sh");
        fs::write(&source, "#!/bin/sh\n")?;
        fs::set_permissions(&source, fs::Permissions::from_mode(0o700))?;
        let manager = ArchiveManager::new(config_root.path());
        let dir = manager.create_archive_dir("hook")?;

        let archived = manager
            .archive_existing("hook", &source, &dir)?
            .expect("source exists");

        assert_eq!(archived, dir.join("hook.sh"));
        assert_eq!(fs::metadata(archived)?.permissions().mode() & 0o777, 0o700);
        Ok(())
    }
}
