// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Apply staged configuration to its local destination.
//!
//! Sync is the only operation that writes to user destinations. Before it
//! writes anything it snapshots the destination into a fresh archive
//! directory, so every overwrite can be rolled back by hand.
//!
//! # Overlay Semantics
//!
//! Directories are overlaid, never mirrored. Files present in staging replace
//! their counterparts at the destination, while files and directories that
//! only exist at the destination are left untouched. A file destination is
//! byte-replaced.
//!
//! The settings document is special. A staged copy must parse before
//! anything is archived, and it replaces the live document through the
//! store's temp-file-and-rename path, never by rewriting in place.

use crate::{
    archive::ArchiveManager,
    copy::{copy_path, list_files},
    error::{AnvilError, Operation, Result},
    flow::Session,
    git::CommandRunner,
    privacy::VisibilityProbe,
    resolve::Target,
};

use std::path::{Path, PathBuf};
use tracing::{info, instrument};

/// Completed sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Archive directory created for this sync.
    pub archive_dir: PathBuf,

    /// Snapshot of prior destination, if the destination existed.
    pub archived: Option<PathBuf>,

    pub destination: PathBuf,

    /// Files written, relative to destination.
    pub files: Vec<PathBuf>,
}

/// How a sync ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// User declined at the confirmation prompt.
    Declined { archive_dir: PathBuf },

    /// Dry run listed what would be written.
    DryRun {
        source: PathBuf,
        destination: PathBuf,
        files: Vec<PathBuf>,
    },

    Synced(SyncReport),
}

impl<R, V> Session<'_, R, V>
where
    R: CommandRunner,
    V: VisibilityProbe,
{
    /// Apply staged target onto its local destination.
    ///
    /// # Errors
    ///
    /// - Return validation error if nothing is staged for target.
    /// - Return configuration error if target has no destination.
    /// - Return filesystem error if archiving or copying fails.
    #[instrument(skip(self), level = "debug")]
    pub async fn sync(&self, target: &Target) -> Result<SyncOutcome> {
        let op = Operation::Sync;
        self.sink.header(&format!("Syncing {target} configuration"));

        let settings = self.validated_settings(op)?;
        let staging = self.store.staging_dir(&settings, target.name());
        let mut source = target.staged_artifact(&staging);
        if !source.exists() {
            return Err(AnvilError::validation(op, "locate-staged", NothingStaged {
                app: target.name().to_string(),
            })
            .with_context(source.display().to_string())
            .with_hint(format!("run `anvil config pull {target}` first")));
        }

        let destination = match target {
            Target::Settings => self.store.path().to_path_buf(),
            Target::App(name) => settings.configs.get(name).cloned().ok_or_else(|| {
                AnvilError::configuration(op, "locate-destination", NoDestination {
                    app: name.clone(),
                })
                .with_hint(format!(
                    "add `{name} = \"/path/to/config\"` under [configs] in your settings file"
                ))
            })?,
        };

        // A file destination takes the matching file out of a staged directory.
        if source.is_dir() && destination.is_file() {
            source = match destination.file_name() {
                Some(name) => source.join(name),
                None => source,
            };
            if !source.is_file() {
                return Err(AnvilError::validation(op, "locate-staged", NothingStaged {
                    app: target.name().to_string(),
                })
                .with_context(source.display().to_string())
                .with_hint(format!(
                    "staged {target} is a directory but {} is a file",
                    destination.display()
                )));
            }
        }

        let staged_document = match target {
            Target::Settings => Some(self.store.read_document(&source)?),
            Target::App(_) => None,
        };

        let writes_into = write_target(&source, &destination);
        let files = list_files(&source).map_err(|error| {
            AnvilError::filesystem(op, "list-staged", error).with_context(source.display().to_string())
        })?;
        self.sink.info(&format!("Source: {}", source.display()));
        self.sink.info(&format!("Destination: {}", writes_into.display()));

        if self.dry_run {
            self.sink.info(&format!("Dry run: would write {} file(s)", files.len()));
            for file in &files {
                self.sink.info(&format!("  {}", file.display()));
            }
            return Ok(SyncOutcome::DryRun {
                source,
                destination: writes_into,
                files,
            });
        }

        let archive = ArchiveManager::new(self.store.config_root(&settings));
        let archive_dir = archive
            .create_archive_dir(&target.archive_prefix())
            .map_err(|error| AnvilError::filesystem(op, "archive", error))?;

        let question = format!(
            "Overwrite {} with staged {target} configuration?",
            writes_into.display()
        );
        if !self.confirm(op, &question)? {
            self.sink.info("Sync cancelled");
            return Ok(SyncOutcome::Declined { archive_dir });
        }

        // INVARIANT: Snapshot is complete before the first destination write.
        self.sink.stage("Archiving current configuration");
        let archived = archive
            .archive_existing(target.name(), &writes_into, &archive_dir)
            .map_err(|error| {
                AnvilError::filesystem(op, "archive", error)
                    .with_context(writes_into.display().to_string())
            })?;

        self.sink.stage("Applying staged configuration");
        let files = match staged_document {
            Some(document) => {
                self.store.replace_document(&document)?;
                files
            }
            None => copy_path(&source, &writes_into).map_err(|error| {
                AnvilError::filesystem(op, "apply-staged", error)
                    .with_context(writes_into.display().to_string())
            })?,
        };

        info!("synced {} file(s) into {}", files.len(), writes_into.display());
        self.sink.success(&format!("Synced {target} into {}", writes_into.display()));
        self.sink.info(&format!(
            "Previous state archived at {}",
            archive_dir.display()
        ));

        Ok(SyncOutcome::Synced(SyncReport {
            archive_dir,
            archived,
            destination: writes_into,
            files,
        }))
    }
}

/// Path actually written for source.
///
/// A staged file never replaces a destination directory wholesale. It lands
/// inside the directory instead.
fn write_target(source: &Path, destination: &Path) -> PathBuf {
    match (source.is_file(), destination.is_dir(), source.file_name()) {
        (true, true, Some(name)) => destination.join(name),
        _ => destination.to_path_buf(),
    }
}

/// Nothing staged for target app.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no staged configuration for {app:?}")]
pub struct NothingStaged {
    pub app: String,
}

/// Target app has no destination in settings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{app:?} has no destination in configs")]
pub struct NoDestination {
    pub app: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        env::FixedEnv,
        error::ErrorKind,
        flow::tests::{store_with, PrivateProbe},
        git::runner::fake::ScriptedRunner,
        ui::{FixedAnswer, MemorySink},
    };
    use indoc::formatdoc;
    use pretty_assertions::assert_eq;
    use std::fs;

    struct Fixture {
        home: tempfile::TempDir,
        dest: PathBuf,
        staged: PathBuf,
    }

    impl Fixture {
        fn new() -> anyhow::Result<Self> {
            let home = tempfile::tempdir()?;
            let dest = home.path().join("dest");
            let staged = home.path().join(".anvil/temp/foo");
            fs::create_dir_all(&dest)?;
            fs::create_dir_all(&staged)?;
            fs::write(dest.join("local.conf"), "L")?;
            fs::write(dest.join("shared.conf"), "old")?;
            fs::write(staged.join("remote.conf"), "R")?;
            fs::write(staged.join("shared.conf"), "new")?;
            Ok(Self { home, dest, staged })
        }

        fn store(&self) -> anyhow::Result<crate::store::SettingsStore> {
            store_with(
                self.home.path(),
                &formatdoc! {r#"
                    [directories]
                    config = "{root}"

                    [configs]
                    foo = "{dest}"
                "#,
                    root = self.home.path().join(".anvil").display(),
                    dest = self.dest.display(),
                },
            )
        }
    }

    #[tokio::test]
    async fn sync_overlays_and_archives() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        let store = fixture.store()?;
        let env = FixedEnv::new(fixture.home.path());
        let sink = MemorySink::new();
        let prompter = FixedAnswer::yes();
        let session = Session::new(&store, ScriptedRunner::new(), PrivateProbe, &env, &sink, &prompter);

        let SyncOutcome::Synced(report) = session.sync(&Target::App("foo".into())).await? else {
            panic!("sync must complete");
        };

        assert_eq!(fs::read_to_string(fixture.dest.join("local.conf"))?, "L");
        assert_eq!(fs::read_to_string(fixture.dest.join("shared.conf"))?, "new");
        assert_eq!(fs::read_to_string(fixture.dest.join("remote.conf"))?, "R");

        let archived = report.archived.expect("destination existed");
        assert!(archived.starts_with(fixture.home.path().join(".anvil/archive")));
        assert_eq!(fs::read_to_string(archived.join("local.conf"))?, "L");
        assert_eq!(fs::read_to_string(archived.join("shared.conf"))?, "old");
        assert!(report
            .archive_dir
            .file_name()
            .is_some_and(|name| name.to_string_lossy().starts_with("foo-configs-")));
        assert_eq!(prompter.asked().len(), 1);

        Ok(())
    }

    #[tokio::test]
    async fn declined_sync_leaves_destination_alone() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        let store = fixture.store()?;
        let env = FixedEnv::new(fixture.home.path());
        let sink = MemorySink::new();
        let prompter = FixedAnswer::no();
        let session = Session::new(&store, ScriptedRunner::new(), PrivateProbe, &env, &sink, &prompter);

        let outcome = session.sync(&Target::App("foo".into())).await?;

        let SyncOutcome::Declined { archive_dir } = outcome else {
            panic!("sync must be declined");
        };
        assert!(archive_dir.is_dir());
        assert_eq!(fs::read_to_string(fixture.dest.join("shared.conf"))?, "old");
        assert!(!fixture.dest.join("remote.conf").exists());

        Ok(())
    }

    #[tokio::test]
    async fn dry_run_creates_no_archive() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        let store = fixture.store()?;
        let env = FixedEnv::new(fixture.home.path());
        let sink = MemorySink::new();
        let prompter = FixedAnswer::yes();
        let session = Session::new(&store, ScriptedRunner::new(), PrivateProbe, &env, &sink, &prompter)
            .dry_run(true);

        let outcome = session.sync(&Target::App("foo".into())).await?;

        assert_eq!(
            outcome,
            SyncOutcome::DryRun {
                source: fixture.staged.clone(),
                destination: fixture.dest.clone(),
                files: vec![PathBuf::from("remote.conf"), PathBuf::from("shared.conf")],
            }
        );
        assert!(!fixture.home.path().join(".anvil/archive").exists());
        assert!(prompter.asked().is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn sync_requires_staged_copy_and_destination() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        let store = fixture.store()?;
        fs::create_dir_all(fixture.home.path().join(".anvil/temp/bar"))?;
        let env = FixedEnv::new(fixture.home.path());
        let sink = MemorySink::new();
        let prompter = FixedAnswer::yes();
        let session = Session::new(&store, ScriptedRunner::new(), PrivateProbe, &env, &sink, &prompter);

        let error = session
            .sync(&Target::App("zsh".into()))
            .await
            .expect_err("nothing staged");
        assert_eq!(error.kind(), ErrorKind::Validation);
        assert!(error.hint().unwrap_or_default().contains("anvil config pull zsh"));

        let error = session
            .sync(&Target::App("bar".into()))
            .await
            .expect_err("no destination");
        assert_eq!(error.kind(), ErrorKind::Configuration);

        Ok(())
    }

    #[tokio::test]
    async fn sync_settings_invalidates_cache() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        let store = fixture.store()?;
        let before = store.load()?;
        let staged = fixture.home.path().join(".anvil/temp/anvil");
        fs::create_dir_all(&staged)?;
        let mut updated = crate::config::Settings::clone(&before);
        updated.version = "9.9.9".into();
        fs::write(staged.join("settings.toml"), updated.to_string())?;
        let env = FixedEnv::new(fixture.home.path());
        let sink = MemorySink::new();
        let prompter = FixedAnswer::yes();
        let session = Session::new(&store, ScriptedRunner::new(), PrivateProbe, &env, &sink, &prompter);

        let SyncOutcome::Synced(report) = session.sync(&Target::Settings).await? else {
            panic!("sync must complete");
        };

        assert_eq!(report.destination, store.path());
        assert_eq!(store.load()?.version, "9.9.9");
        let archived = report.archived.expect("settings existed");
        assert_eq!(archived.file_name(), Some(std::ffi::OsStr::new("settings.toml")));

        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn sync_settings_replaces_document_instead_of_rewriting() -> anyhow::Result<()> {
        use std::os::unix::fs::MetadataExt;

        let fixture = Fixture::new()?;
        let store = fixture.store()?;
        store.load()?;
        let inode_before = fs::metadata(store.path())?.ino();
        let staged = fixture.home.path().join(".anvil/temp/anvil");
        fs::create_dir_all(&staged)?;
        let document = formatdoc! {r#"
            # pulled from remote
            [directories]
            config = "{root}"
        "#,
            root = fixture.home.path().join(".anvil").display(),
        };
        fs::write(staged.join("settings.toml"), &document)?;
        let env = FixedEnv::new(fixture.home.path());
        let sink = MemorySink::new();
        let prompter = FixedAnswer::yes();
        let session = Session::new(&store, ScriptedRunner::new(), PrivateProbe, &env, &sink, &prompter);

        let SyncOutcome::Synced(report) = session.sync(&Target::Settings).await? else {
            panic!("sync must complete");
        };

        assert_ne!(fs::metadata(store.path())?.ino(), inode_before);
        assert_eq!(fs::read_to_string(store.path())?, document);
        assert_eq!(report.files, vec![PathBuf::from("settings.toml")]);
        assert!(!store.path().with_file_name(".settings.toml.anvil.tmp").exists());

        Ok(())
    }

    #[tokio::test]
    async fn malformed_staged_settings_are_rejected_before_archiving() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        let store = fixture.store()?;
        let original = fs::read_to_string(store.path())?;
        let staged = fixture.home.path().join(".anvil/temp/anvil");
        fs::create_dir_all(&staged)?;
        fs::write(staged.join("settings.toml"), "[directories\nconfig = ")?;
        let env = FixedEnv::new(fixture.home.path());
        let sink = MemorySink::new();
        let prompter = FixedAnswer::yes();
        let session = Session::new(&store, ScriptedRunner::new(), PrivateProbe, &env, &sink, &prompter);

        let error = session
            .sync(&Target::Settings)
            .await
            .expect_err("staged document is malformed");

        assert_eq!(error.kind(), ErrorKind::Configuration);
        assert_eq!(fs::read_to_string(store.path())?, original);
        assert!(!fixture.home.path().join(".anvil/archive").exists());
        assert!(prompter.asked().is_empty());

        Ok(())
    }
}
