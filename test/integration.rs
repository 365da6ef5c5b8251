// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::RepoFixture;

use anvil::{
    env::FixedEnv,
    flow::{PushOutcome, SyncOutcome},
    git::{BranchNotFound, Deadline, SystemRunner},
    privacy::VisibilityProbe,
    ui::{FixedAnswer, MemorySink, MessageKind},
    ErrorKind, Session, SettingsStore, Target,
};

use anyhow::Result;
use pretty_assertions::assert_eq;
use std::{
    fmt::Write as _,
    fs,
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
};
use tempfile::TempDir;

/// Probe that reports every repository as private and counts its calls.
#[derive(Debug, Default)]
struct PrivateProbe {
    calls: AtomicUsize,
}

impl VisibilityProbe for PrivateProbe {
    async fn is_publicly_readable(&self, _: &str, _: Deadline) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        false
    }
}

/// Home directory plus bare remote for one scenario.
struct Workspace {
    home: TempDir,
    _remote_dir: TempDir,
    remote: RepoFixture,
}

impl Workspace {
    fn new() -> Result<Self> {
        let home = tempfile::tempdir()?;
        let remote_dir = tempfile::tempdir()?;
        let remote = RepoFixture::new(remote_dir.path())?;
        Ok(Self {
            home,
            _remote_dir: remote_dir,
            remote,
        })
    }

    fn home(&self) -> &Path {
        self.home.path()
    }

    fn anvil_root(&self) -> PathBuf {
        self.home().join(".anvil")
    }

    fn clone_path(&self) -> PathBuf {
        self.anvil_root().join("dotfiles")
    }

    fn write(&self, relative: &str, contents: &str) -> Result<PathBuf> {
        let path = self.home().join(relative);
        fs::create_dir_all(path.parent().expect("parent"))?;
        fs::write(&path, contents)?;
        Ok(path)
    }

    fn store(&self, branch: &str, configs: &[(&str, &Path)]) -> Result<SettingsStore> {
        let mut document = format!(
            r#"version = "1.0.0"

[directories]
config = "{root}"

[git]
username = "John Doe"
email = "john@doe.com"

[github]
config_repo = "{repo}"
branch = "{branch}"
local_path = "{clone}"

[configs]
"#,
            root = self.anvil_root().display(),
            repo = self.remote.url(),
            clone = self.clone_path().display(),
        );
        for (name, path) in configs {
            writeln!(document, "{name} = \"{}\"", path.display())?;
        }

        let path = self.anvil_root().join("settings.toml");
        fs::create_dir_all(self.anvil_root())?;
        fs::write(&path, document)?;
        Ok(SettingsStore::new(path, self.home()))
    }
}

#[tokio::test]
async fn fresh_pull_stages_remote_files() -> Result<()> {
    let workspace = Workspace::new()?;
    workspace.remote.stage_and_commit("cursor/settings.json", "{a:1}")?;
    let store = workspace.store("main", &[])?;
    let env = FixedEnv::new(workspace.home());
    let sink = MemorySink::new();
    let prompter = FixedAnswer::no();
    let session = Session::new(&store, SystemRunner, PrivateProbe::default(), &env, &sink, &prompter);

    let report = session.pull(&Target::App("cursor".into())).await?;

    let staged = workspace.anvil_root().join("temp/cursor");
    assert_eq!(report.staging_path, staged);
    assert_eq!(report.files, vec![PathBuf::from("settings.json")]);
    assert_eq!(fs::read_to_string(staged.join("settings.json"))?, "{a:1}");
    assert!(workspace.clone_path().join(".git").is_dir());

    Ok(())
}

#[tokio::test]
async fn pull_replaces_stray_clone_then_reuses_it() -> Result<()> {
    let workspace = Workspace::new()?;
    workspace.remote.stage_and_commit("cursor/settings.json", "{a:1}")?;
    fs::create_dir_all(workspace.clone_path().join("junk"))?;
    fs::write(workspace.clone_path().join("junk/leftover.txt"), "junk")?;
    let store = workspace.store("main", &[])?;
    let env = FixedEnv::new(workspace.home());
    let sink = MemorySink::new();
    let prompter = FixedAnswer::no();
    let session = Session::new(&store, SystemRunner, PrivateProbe::default(), &env, &sink, &prompter);
    let target = Target::App("cursor".into());

    session.pull(&target).await?;
    assert!(workspace.clone_path().join(".git").is_dir());
    assert!(!workspace.clone_path().join("junk").exists());

    // Survives only if the second pull reuses the clone.
    let marker = workspace.clone_path().join(".git/anvil-reuse-marker");
    fs::write(&marker, "")?;
    workspace.remote.stage_and_commit("cursor/settings.json", "{a:2}")?;

    let report = session.pull(&target).await?;

    assert!(marker.exists());
    assert_eq!(
        fs::read_to_string(report.staging_path.join("settings.json"))?,
        "{a:2}"
    );

    Ok(())
}

#[tokio::test]
async fn pull_then_sync_preserves_local_only_files() -> Result<()> {
    let workspace = Workspace::new()?;
    workspace.remote.stage_and_commit("foo/remote.conf", "R")?;
    workspace.remote.stage_and_commit("foo/shared.conf", "new")?;
    workspace.write("dest/local.conf", "L")?;
    workspace.write("dest/shared.conf", "old")?;
    let dest = workspace.home().join("dest");
    let store = workspace.store("main", &[("foo", &dest)])?;
    let env = FixedEnv::new(workspace.home());
    let sink = MemorySink::new();
    let prompter = FixedAnswer::yes();
    let session = Session::new(&store, SystemRunner, PrivateProbe::default(), &env, &sink, &prompter);

    let target = Target::App("foo".into());
    session.pull(&target).await?;
    assert_eq!(fs::read_to_string(dest.join("shared.conf"))?, "old");

    let SyncOutcome::Synced(report) = session.sync(&target).await? else {
        panic!("sync must complete");
    };

    assert_eq!(fs::read_to_string(dest.join("local.conf"))?, "L");
    assert_eq!(fs::read_to_string(dest.join("shared.conf"))?, "new");
    assert_eq!(fs::read_to_string(dest.join("remote.conf"))?, "R");
    let archived = report.archived.expect("destination existed");
    assert_eq!(fs::read_to_string(archived.join("local.conf"))?, "L");
    assert_eq!(fs::read_to_string(archived.join("shared.conf"))?, "old");
    assert!(!archived.join("remote.conf").exists());

    Ok(())
}

#[tokio::test]
async fn identical_file_is_up_to_date() -> Result<()> {
    let workspace = Workspace::new()?;
    workspace.remote.stage_and_commit("app/app.yaml", "key: value\n")?;
    let local = workspace.write("cfg/app.yaml", "key: value\n")?;
    let store = workspace.store("main", &[("app", &local)])?;
    let env = FixedEnv::new(workspace.home());
    let sink = MemorySink::new();
    let prompter = FixedAnswer::yes();
    let session = Session::new(&store, SystemRunner, PrivateProbe::default(), &env, &sink, &prompter);

    let outcome = session.push(&Target::App("app".into())).await?;

    assert_eq!(outcome, PushOutcome::UpToDate);
    assert!(sink.contains(MessageKind::Success, "up to date"));
    assert!(prompter.asked().is_empty());
    assert_eq!(workspace.remote.branches()?, vec!["main".to_string()]);
    assert_eq!(workspace.remote.head_message("main")?, "chore: add \"app/app.yaml\"");

    Ok(())
}

#[tokio::test]
async fn push_commits_changes_on_new_branch() -> Result<()> {
    let workspace = Workspace::new()?;
    workspace.remote.stage_and_commit("app/keep.conf", "K")?;
    workspace.remote.stage_and_commit("app/modified.conf", "old")?;
    workspace.write("cfg/keep.conf", "K")?;
    workspace.write("cfg/modified.conf", "new")?;
    workspace.write("cfg/added.conf", "A")?;
    let local = workspace.home().join("cfg");
    let store = workspace.store("main", &[("app", &local)])?;
    let env = FixedEnv::new(workspace.home());
    let sink = MemorySink::new();
    let prompter = FixedAnswer::yes();
    let probe = PrivateProbe::default();
    let session = Session::new(&store, SystemRunner, &probe, &env, &sink, &prompter);

    let PushOutcome::Pushed(result) = session.push(&Target::App("app".into())).await? else {
        panic!("push must complete");
    };

    assert!(result.branch_name.starts_with("config-push-"));
    assert_eq!(result.commit_message, "anvil[push]: app");
    assert_eq!(result.base_branch, "main");
    assert_eq!(
        result.files_committed,
        vec![PathBuf::from("app/added.conf"), PathBuf::from("app/modified.conf")]
    );
    assert_eq!(prompter.asked().len(), 1);
    assert_eq!(probe.calls.load(Ordering::SeqCst), 0);

    let remote = &workspace.remote;
    assert_eq!(
        remote.branches()?,
        vec![result.branch_name.clone(), "main".to_string()]
    );
    assert_eq!(remote.head_message(&result.branch_name)?, "anvil[push]: app");
    assert_eq!(remote.read(&result.branch_name, "app/added.conf")?.as_deref(), Some("A"));
    assert_eq!(remote.read(&result.branch_name, "app/modified.conf")?.as_deref(), Some("new"));
    assert_eq!(remote.read("main", "app/modified.conf")?.as_deref(), Some("old"));
    assert_eq!(remote.read("main", "app/added.conf")?, None);

    Ok(())
}

#[tokio::test]
async fn declined_push_leaves_remote_and_clone_clean() -> Result<()> {
    let workspace = Workspace::new()?;
    workspace.remote.stage_and_commit("app/app.conf", "old")?;
    let local = workspace.write("cfg/app.conf", "new")?;
    let store = workspace.store("main", &[("app", &local)])?;
    let env = FixedEnv::new(workspace.home());
    let sink = MemorySink::new();
    let prompter = FixedAnswer::no();
    let session = Session::new(&store, SystemRunner, PrivateProbe::default(), &env, &sink, &prompter);

    let outcome = session.push(&Target::App("app".into())).await?;

    assert_eq!(outcome, PushOutcome::Declined);
    assert_eq!(workspace.remote.branches()?, vec!["main".to_string()]);
    assert_eq!(
        fs::read_to_string(workspace.clone_path().join("app/app.conf"))?,
        "old"
    );

    Ok(())
}

#[tokio::test]
async fn dry_run_push_previews_without_branching() -> Result<()> {
    let workspace = Workspace::new()?;
    workspace.remote.stage_and_commit("app/app.conf", "old\n")?;
    let local = workspace.write("cfg/app.conf", "new\n")?;
    let store = workspace.store("main", &[("app", &local)])?;
    let env = FixedEnv::new(workspace.home());
    let sink = MemorySink::new();
    let prompter = FixedAnswer::yes();
    let session = Session::new(&store, SystemRunner, PrivateProbe::default(), &env, &sink, &prompter)
        .dry_run(true);

    let PushOutcome::DryRun(summary) = session.push(&Target::App("app".into())).await? else {
        panic!("push must stop after preview");
    };

    assert_eq!(summary.total_files, 1);
    let diff = summary.full_diff.expect("single small file shows full diff");
    assert!(diff.contains("-old"));
    assert!(diff.contains("+new"));
    assert!(prompter.asked().is_empty());
    assert_eq!(workspace.remote.branches()?, vec!["main".to_string()]);
    assert_eq!(
        fs::read_to_string(workspace.clone_path().join("app/app.conf"))?,
        "old\n"
    );

    Ok(())
}

#[tokio::test]
async fn settings_push_lands_under_reserved_directory() -> Result<()> {
    let workspace = Workspace::new()?;
    workspace.remote.stage_and_commit("README.md", "dotfiles")?;
    let store = workspace.store("main", &[])?;
    let env = FixedEnv::new(workspace.home());
    let sink = MemorySink::new();
    let prompter = FixedAnswer::yes();
    let session = Session::new(&store, SystemRunner, PrivateProbe::default(), &env, &sink, &prompter);

    let PushOutcome::Pushed(result) = session.push(&Target::Settings).await? else {
        panic!("push must complete");
    };

    assert_eq!(result.commit_message, "anvil[push]: anvil");
    assert_eq!(result.files_committed, vec![PathBuf::from("anvil/settings.toml")]);
    let pushed = workspace
        .remote
        .read(&result.branch_name, "anvil/settings.toml")?
        .expect("settings pushed");
    assert_eq!(pushed, fs::read_to_string(store.path())?);

    Ok(())
}

#[tokio::test]
async fn missing_branch_lists_available_branches() -> Result<()> {
    let workspace = Workspace::new()?;
    workspace.remote.stage_and_commit("x/x.conf", "x")?;
    workspace.remote.branch("develop")?;
    let store = workspace.store("nonexistent", &[])?;
    let env = FixedEnv::new(workspace.home());
    let sink = MemorySink::new();
    let prompter = FixedAnswer::no();
    let session = Session::new(&store, SystemRunner, PrivateProbe::default(), &env, &sink, &prompter);

    let error = session
        .pull(&Target::App("x".into()))
        .await
        .expect_err("branch does not exist");

    assert_eq!(error.kind(), ErrorKind::Configuration);
    let cause = error.find_cause::<BranchNotFound>().expect("branch cause");
    assert_eq!(cause.available, vec!["develop".to_string(), "main".to_string()]);
    let hint = error.hint().unwrap_or_default();
    assert!(hint.contains("main"));
    assert!(hint.contains("develop"));
    assert!(!workspace.clone_path().exists());

    Ok(())
}
