// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Settings document management.
//!
//! The [`SettingsStore`] owns the settings document on disk. It loads and
//! caches the decoded document, applies auto-corrections, writes the document
//! back atomically, fills in defaults for fresh installs, and answers where a
//! named app lives on the local filesystem.
//!
//! # Caching
//!
//! The decoded document is cached behind a read/write lock. Loads share the
//! cached copy; saves replace the file on disk and invalidate the cache, so the
//! next load decodes the new contents.

use crate::{
    config::{Settings, DEFAULT_BRANCH, DEFAULT_TOKEN_ENV_VAR, DEFAULT_VERSION},
    env::Environment,
    error::{AnvilError, Operation, Result},
    git::{CommandRunner, Deadline, Invocation},
    path::{default_settings_path, home_dir, ANVIL_DIR},
};

use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Arc, PoisonError, RwLock},
};
use tracing::{debug, info, instrument};

/// Private keys probed, in order, when no key is configured.
const SSH_KEY_CANDIDATES: [&str; 5] = [
    "id_ed25519",
    "id_ed25519_personal",
    "id_rsa",
    "id_rsa_personal",
    "id_ecdsa",
];

/// Where an app name resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppLocation {
    /// Declared in `configs` and present on disk.
    FromConfigs(PathBuf),

    /// Only present in the staging area.
    FromTemp(PathBuf),

    NotFound,
}

impl AppLocation {
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::FromConfigs(path) | Self::FromTemp(path) => Some(path),
            Self::NotFound => None,
        }
    }
}

/// Owner of settings document.
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    home: PathBuf,
    cache: RwLock<Option<Arc<Settings>>>,
}

impl SettingsStore {
    /// Construct new store for document at target path.
    ///
    /// `home` is used to expand leading tildes and to derive defaults.
    pub fn new(path: impl Into<PathBuf>, home: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            home: home.into(),
            cache: RwLock::new(None),
        }
    }

    /// Construct new store for default document location of environment.
    ///
    /// # Errors
    ///
    /// - Return platform error if home directory cannot be determined.
    pub fn from_env(env: &dyn Environment) -> Result<Self> {
        let home = home_dir(env)
            .map_err(|error| AnvilError::platform(Operation::Settings, "home-dir", error))?;
        let path = default_settings_path(env)
            .map_err(|error| AnvilError::platform(Operation::Settings, "settings-path", error))?;
        Ok(Self::new(path, home))
    }

    /// Path of settings document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Settings document exists on disk.
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Working root for staging and archive areas.
    ///
    /// Falls back to `$HOME/.anvil` if `directories.config` is blank.
    pub fn config_root(&self, settings: &Settings) -> PathBuf {
        if settings.directories.config.as_os_str().is_empty() {
            return self.home.join(ANVIL_DIR);
        }

        settings.directories.config.clone()
    }

    /// Staging directory of target app.
    pub fn staging_dir(&self, settings: &Settings, app: &str) -> PathBuf {
        self.config_root(settings).join("temp").join(app)
    }

    /// Load settings document.
    ///
    /// Returns the cached document if present. Otherwise the document is read,
    /// decoded, and auto-corrected. If corrections changed anything, the
    /// corrected document is written back before it is cached.
    ///
    /// # Errors
    ///
    /// - Return configuration error if the document is missing or malformed.
    /// - Return filesystem error if the document cannot be read or rewritten.
    #[instrument(skip(self), level = "debug")]
    pub fn load(&self) -> Result<Arc<Settings>> {
        if let Some(cached) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            return Ok(Arc::clone(cached));
        }

        let text = fs::read_to_string(&self.path).map_err(|error| {
            if error.kind() == std::io::ErrorKind::NotFound {
                AnvilError::configuration(Operation::Settings, "load", error)
                    .with_context(self.path.display().to_string())
                    .with_hint("run anvil once to create default settings")
            } else {
                AnvilError::filesystem(Operation::Settings, "load", error)
                    .with_context(self.path.display().to_string())
            }
        })?;

        let mut settings: Settings = text.parse().map_err(|error| {
            AnvilError::configuration(Operation::Settings, "parse", error)
                .with_context(self.path.display().to_string())
                .with_hint("fix the syntax error in your settings file")
        })?;

        if settings.apply_corrections(&self.home) {
            info!("applied auto-corrections to {}", self.path.display());
            self.write_atomic(&settings.to_string())?;
        }

        let settings = Arc::new(settings);
        *self.cache.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&settings));
        Ok(settings)
    }

    /// Save settings document, replacing the file atomically.
    ///
    /// # Errors
    ///
    /// - Return filesystem error if the document cannot be written.
    #[instrument(skip(self, settings), level = "debug")]
    pub fn save(&self, settings: &Settings) -> Result<()> {
        self.write_atomic(&settings.to_string())?;
        self.invalidate();
        Ok(())
    }

    /// Read settings document at target path, rejecting malformed text.
    ///
    /// The text is returned untouched so it can later be applied byte for
    /// byte with [`replace_document`](Self::replace_document).
    ///
    /// # Errors
    ///
    /// - Return filesystem error if the file cannot be read.
    /// - Return configuration error if the text is not a valid document.
    pub fn read_document(&self, path: &Path) -> Result<String> {
        let text = fs::read_to_string(path).map_err(|error| {
            AnvilError::filesystem(Operation::Settings, "read-document", error)
                .with_context(path.display().to_string())
        })?;

        text.parse::<Settings>().map_err(|error| {
            AnvilError::configuration(Operation::Settings, "parse", error)
                .with_context(path.display().to_string())
                .with_hint("the document was not applied, fix it or pull again")
        })?;

        Ok(text)
    }

    /// Atomically replace settings document with target text.
    ///
    /// # Errors
    ///
    /// - Return configuration error if the text is not a valid document.
    /// - Return filesystem error if the document cannot be written.
    pub fn replace_document(&self, document: &str) -> Result<()> {
        document.parse::<Settings>().map_err(|error| {
            AnvilError::configuration(Operation::Settings, "parse", error)
                .with_context(self.path.display().to_string())
        })?;

        self.write_atomic(document)?;
        self.invalidate();
        Ok(())
    }

    /// Drop cached document so the next load reads from disk.
    pub fn invalidate(&self) {
        *self.cache.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Fill missing sections with defaults, creating the document if needed.
    ///
    /// Blank git identity fields are seeded from the host's global git
    /// configuration. Failing to read the global identity is not an error.
    ///
    /// # Errors
    ///
    /// - Return error if the existing document cannot be loaded or the
    ///   result cannot be saved.
    #[instrument(skip(self, runner, deadline), level = "debug")]
    pub async fn ensure_defaults<R>(&self, runner: &R, deadline: Deadline) -> Result<Settings>
    where
        R: CommandRunner,
    {
        let existed = self.exists();
        let mut settings = match existed {
            true => Settings::clone(&*self.load()?),
            false => Settings::default(),
        };
        let before = settings.clone();

        let anvil_dir = self.home.join(ANVIL_DIR);
        let ssh_dir = self.home.join(".ssh");
        fill(&mut settings.version, DEFAULT_VERSION);
        fill(&mut settings.github.branch, DEFAULT_BRANCH);
        fill(&mut settings.github.token_env_var, DEFAULT_TOKEN_ENV_VAR);
        fill_path(&mut settings.directories.config, &anvil_dir);
        fill_path(&mut settings.github.local_path, &anvil_dir.join("dotfiles"));
        fill_path(&mut settings.git.ssh_dir, &ssh_dir);
        if settings.git.ssh_key_path.as_os_str().is_empty() {
            if let Some(key) = detect_ssh_key(&ssh_dir) {
                settings.git.ssh_key_path = key;
            }
        }

        if settings.git.username.is_empty() {
            settings.git.username = global_git_config(runner, "user.name", deadline).await;
        }
        if settings.git.email.is_empty() {
            settings.git.email = global_git_config(runner, "user.email", deadline).await;
        }

        settings.apply_corrections(&self.home);
        if !existed || settings != before {
            info!("write default settings to {}", self.path.display());
            self.save(&settings)?;
        }

        Ok(settings)
    }

    /// Resolve where target app lives locally.
    ///
    /// A `configs` entry wins if its path exists. Otherwise the staging
    /// directory is used if it exists.
    ///
    /// # Errors
    ///
    /// - Return error if settings cannot be loaded.
    pub fn resolve_app_location(&self, name: &str) -> Result<AppLocation> {
        let settings = self.load()?;
        if let Some(path) = settings.configs.get(name) {
            if path.exists() {
                return Ok(AppLocation::FromConfigs(path.clone()));
            }
            debug!("configs.{name} points at missing path {}", path.display());
        }

        let staging = self.staging_dir(&settings, name);
        if staging.exists() {
            return Ok(AppLocation::FromTemp(staging));
        }

        Ok(AppLocation::NotFound)
    }

    // INVARIANT: Readers only ever see the old or the new document in full.
    fn write_atomic(&self, contents: &str) -> Result<()> {
        let to_error = |error: std::io::Error, path: &Path| {
            AnvilError::filesystem(Operation::Settings, "save", error)
                .with_context(path.display().to_string())
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|error| to_error(error, parent))?;
        }

        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "settings".into());
        let tmp = self.path.with_file_name(format!(".{file_name}.anvil.tmp"));

        fs::write(&tmp, contents).map_err(|error| to_error(error, &tmp))?;
        if let Err(error) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(to_error(error, &self.path));
        }

        Ok(())
    }
}

fn fill(field: &mut String, default: &str) {
    if field.trim().is_empty() {
        *field = default.into();
    }
}

fn fill_path(field: &mut PathBuf, default: &Path) {
    if field.as_os_str().is_empty() {
        *field = default.to_path_buf();
    }
}

fn detect_ssh_key(ssh_dir: &Path) -> Option<PathBuf> {
    SSH_KEY_CANDIDATES
        .iter()
        .map(|name| ssh_dir.join(name))
        .find(|path| path.is_file())
}

async fn global_git_config<R>(runner: &R, key: &str, deadline: Deadline) -> String
where
    R: CommandRunner,
{
    let call = Invocation::git(["config", "--global", key]);
    match runner.run(&call, deadline).await {
        Ok(output) if output.success() => output.stdout_trimmed().to_string(),
        Ok(_) => String::new(),
        Err(error) => {
            debug!("cannot read global {key}: {error}");
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::{runner::fake::ScriptedRunner, CommandOutput};
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    struct Fixture {
        home: tempfile::TempDir,
        store: SettingsStore,
    }

    impl Fixture {
        fn new() -> anyhow::Result<Self> {
            let home = tempfile::tempdir()?;
            let store = SettingsStore::new(home.path().join(".anvil/settings.toml"), home.path());
            Ok(Self { home, store })
        }

        fn write_settings(&self, contents: &str) -> anyhow::Result<()> {
            fs::create_dir_all(self.home.path().join(".anvil"))?;
            fs::write(self.store.path(), contents)?;
            Ok(())
        }
    }

    #[test]
    fn load_writes_back_corrections() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        fixture.write_settings(indoc! {r#"
            version = "1.0.0"

            [github]
            config_repo = "git@github.com:smith/dotfiles.git"
            branch = ""
            local_path = "~/.anvil/dotfiles"
        "#})?;

        let settings = fixture.store.load()?;

        assert_eq!(settings.github.branch, "main");
        assert_eq!(settings.github.config_repo, "smith/dotfiles");
        assert_eq!(
            settings.github.local_path,
            fixture.home.path().join(".anvil/dotfiles")
        );
        let on_disk: Settings = fs::read_to_string(fixture.store.path())?.parse()?;
        assert_eq!(on_disk, *settings);

        Ok(())
    }

    #[test]
    fn canonical_document_round_trips_byte_for_byte() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        let mut settings = Settings::default();
        settings.version = "1.0.0".into();
        settings.github.config_repo = "smith/dotfiles".into();
        settings.github.branch = "main".into();
        settings.github.local_path = fixture.home.path().join(".anvil/dotfiles");
        settings.configs.insert("nvim".into(), fixture.home.path().join(".config/nvim"));
        let canonical = settings.to_string();
        fixture.write_settings(&canonical)?;

        let loaded = fixture.store.load()?;
        fixture.store.save(&loaded)?;

        assert_eq!(fs::read_to_string(fixture.store.path())?, canonical);
        Ok(())
    }

    #[test]
    fn save_invalidates_cache() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        fixture.write_settings("version = \"1.0.0\"\n[github]\nbranch = \"main\"\n")?;
        let first = fixture.store.load()?;

        // Cached copy survives edits made behind the store's back.
        fixture.write_settings("version = \"2.0.0\"\n[github]\nbranch = \"main\"\n")?;
        assert_eq!(fixture.store.load()?.version, "1.0.0");

        let mut updated = Settings::clone(&first);
        updated.version = "3.0.0".into();
        fixture.store.save(&updated)?;

        assert_eq!(fixture.store.load()?.version, "3.0.0");
        let leftovers = fs::read_dir(fixture.home.path().join(".anvil"))?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);

        Ok(())
    }

    #[test]
    fn load_reports_missing_and_malformed_documents() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        let error = fixture.store.load().expect_err("document missing");
        assert_eq!(error.kind(), crate::error::ErrorKind::Configuration);

        fixture.write_settings("version = [unterminated")?;
        let error = fixture.store.load().expect_err("document malformed");
        assert_eq!(error.sub_op(), "parse");

        Ok(())
    }

    #[test]
    fn resolve_prefers_configs_then_staging() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        let home = fixture.home.path();
        let declared = home.join("nvim");
        fs::create_dir_all(&declared)?;
        fs::create_dir_all(home.join(".anvil/temp/nvim"))?;
        fs::create_dir_all(home.join(".anvil/temp/zsh"))?;
        fixture.write_settings(&format!(
            indoc! {r#"
                [directories]
                config = "{root}"

                [configs]
                nvim = "{nvim}"
                zsh = "{zsh}"
            "#},
            root = home.join(".anvil").display(),
            nvim = declared.display(),
            zsh = home.join("missing-zshrc").display(),
        ))?;

        let store = &fixture.store;
        assert_eq!(store.resolve_app_location("nvim")?, AppLocation::FromConfigs(declared));
        assert_eq!(
            store.resolve_app_location("zsh")?,
            AppLocation::FromTemp(home.join(".anvil/temp/zsh"))
        );
        assert_eq!(store.resolve_app_location("tmux")?, AppLocation::NotFound);

        Ok(())
    }

    #[tokio::test]
    async fn ensure_defaults_creates_document() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        let home = fixture.home.path();
        fs::create_dir_all(home.join(".ssh"))?;
        fs::write(home.join(".ssh/id_rsa"), "key")?;
        let runner = ScriptedRunner::new()
            .on(&["config", "--global", "user.name"], CommandOutput::ok("Smith\n"))
            .on(&["config", "--global", "user.email"], CommandOutput::failed(1, ""));

        let settings = fixture
            .store
            .ensure_defaults(&runner, Deadline::default())
            .await?;

        assert_eq!(settings.version, "1.0.0");
        assert_eq!(settings.github.branch, "main");
        assert_eq!(settings.github.token_env_var, "GITHUB_TOKEN");
        assert_eq!(settings.github.local_path, home.join(".anvil/dotfiles"));
        assert_eq!(settings.directories.config, home.join(".anvil"));
        assert_eq!(settings.git.ssh_key_path, home.join(".ssh/id_rsa"));
        assert_eq!(settings.git.username, "Smith");
        assert_eq!(settings.git.email, "");
        assert!(fixture.store.exists());
        assert_eq!(*fixture.store.load()?, settings);

        Ok(())
    }

    #[tokio::test]
    async fn ensure_defaults_keeps_user_values() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        fixture.write_settings(indoc! {r#"
            [git]
            username = "jones"

            [github]
            config_repo = "jones/dots"
            branch = "trunk"
        "#})?;
        let runner = ScriptedRunner::new();

        let settings = fixture
            .store
            .ensure_defaults(&runner, Deadline::default())
            .await?;

        assert_eq!(settings.git.username, "jones");
        assert_eq!(settings.github.config_repo, "jones/dots");
        assert_eq!(settings.github.branch, "trunk");
        Ok(())
    }
}
