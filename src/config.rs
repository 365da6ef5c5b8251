// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the settings document that Anvil uses to simplify
//! the process of serialization and deserialization. File I/O is left to the
//! [`SettingsStore`](crate::store::SettingsStore) to figure out.
//!
//! # General Layout
//!
//! The settings document is a TOML file with a handful of sections that Anvil
//! understands: `directories`, `git`, `github`, `environment`, `configs`, and
//! `sync_config`. Any other top-level section (tool listings, groups, and so
//! on) is opaque to configuration synchronization, but is kept intact across
//! load and save.
//!
//! ```toml
//! version = "1.0.0"
//!
//! [directories]
//! config = "/home/smith/.anvil"
//!
//! [git]
//! username = "smith"
//! email = "smith@example.com"
//! ssh_key_path = "/home/smith/.ssh/id_ed25519"
//! ssh_dir = "/home/smith/.ssh"
//!
//! [github]
//! config_repo = "smith/dotfiles"
//! branch = "main"
//! local_path = "/home/smith/.anvil/dotfiles"
//! token_env_var = "GITHUB_TOKEN"
//!
//! [configs]
//! nvim = "/home/smith/.config/nvim"
//! ```

use crate::git::url::normalize_repo;
use crate::path::expand_tilde;

use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    str::FromStr,
};

/// Schema version written into fresh settings documents.
pub const DEFAULT_VERSION: &str = "1.0.0";

/// Primary branch used when none is configured.
pub const DEFAULT_BRANCH: &str = "main";

/// Environment variable consulted for an access token by default.
pub const DEFAULT_TOKEN_ENV_VAR: &str = "GITHUB_TOKEN";

/// Settings document layout.
#[derive(Default, Debug, PartialEq, Clone, Deserialize, Serialize)]
pub struct Settings {
    /// Schema version of document.
    #[serde(default)]
    pub version: String,

    /// Working directories.
    #[serde(default)]
    pub directories: Directories,

    /// Git identity and SSH material.
    #[serde(default)]
    pub git: GitSettings,

    /// Remote configuration repository.
    #[serde(default)]
    pub github: GitHubSettings,

    /// Environment values that may be templated for sync.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,

    /// Mapping of app name to local file or directory.
    #[serde(default)]
    pub configs: BTreeMap<String, PathBuf>,

    /// Filtering and templating rules for sharing the settings document.
    #[serde(default, skip_serializing_if = "SyncConfig::is_empty")]
    pub sync_config: SyncConfig,

    /// Sections anvil does not interpret.
    #[serde(flatten)]
    pub extra: toml::Table,
}

impl Settings {
    /// Apply documented auto-corrections.
    ///
    /// Defaults a blank branch to [`DEFAULT_BRANCH`], expands leading tildes
    /// of every path field against `home`, and normalizes the configuration
    /// repository string. Returns true if anything changed.
    pub fn apply_corrections(&mut self, home: &Path) -> bool {
        let before = self.clone();

        if self.github.branch.trim().is_empty() {
            self.github.branch = DEFAULT_BRANCH.into();
        }

        self.github.config_repo = normalize_repo(&self.github.config_repo);

        for path in [
            &mut self.directories.config,
            &mut self.git.ssh_key_path,
            &mut self.git.ssh_dir,
            &mut self.github.local_path,
        ] {
            *path = expand_tilde(path, home);
        }

        for path in self.configs.values_mut() {
            *path = expand_tilde(path, home);
        }

        *self != before
    }

    /// Produce copy of settings that is safe to share through the remote.
    ///
    /// Sections listed in `sync_config.exclude_sections` are dropped unless
    /// they also appear in `sync_config.include_override`. Sections listed in
    /// `sync_config.template_sections` have machine-specific values replaced
    /// with `{{ REPLACE_<NAME> }}` placeholders. The filtered copy never
    /// carries `sync_config` itself.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::UnsupportedTemplate`] if a template section
    ///   cannot be templated.
    pub fn filter_for_sync(&self) -> Result<Settings> {
        let mut filtered = self.clone();
        let rules = &self.sync_config;

        for section in &rules.exclude_sections {
            if !rules.include_override.contains(section) {
                filtered.exclude_section(section);
            }
        }

        for section in &rules.template_sections {
            filtered.template_section(section)?;
        }

        filtered.sync_config = SyncConfig::default();
        Ok(filtered)
    }

    /// Replace template placeholders with concrete values.
    ///
    /// Each `key = value` pair replaces `{{ REPLACE_<KEY> }}` in git identity
    /// fields and environment values. Empty values are skipped.
    pub fn apply_templates(&mut self, values: &BTreeMap<String, String>) {
        let fill = |target: &str| -> String {
            values
                .iter()
                .filter(|(_, value)| !value.is_empty())
                .fold(target.to_string(), |acc, (key, value)| {
                    acc.replace(&placeholder(key), value)
                })
        };

        self.git.username = fill(&self.git.username);
        self.git.email = fill(&self.git.email);
        self.git.ssh_key_path = PathBuf::from(fill(&self.git.ssh_key_path.to_string_lossy()));
        for value in self.environment.values_mut() {
            *value = fill(value);
        }
    }

    fn exclude_section(&mut self, section: &str) {
        match section {
            "git" => self.git = GitSettings::default(),
            "github" => self.github = GitHubSettings::default(),
            "directories" => self.directories = Directories::default(),
            "configs" => self.configs.clear(),
            "environment" => self.environment.clear(),
            _ => {
                if let Some(key) = section.strip_prefix("environment.") {
                    self.environment.remove(key);
                } else {
                    self.extra.remove(section);
                }
            }
        }
    }

    fn template_section(&mut self, section: &str) -> Result<()> {
        match section {
            "git" => {
                self.git.username = placeholder("username");
                self.git.email = placeholder("email");
                if !self.git.ssh_key_path.as_os_str().is_empty() {
                    self.git.ssh_key_path = PathBuf::from(placeholder("ssh_key_path"));
                }
            }
            "environment" => {
                for (key, value) in self.environment.iter_mut() {
                    // INVARIANT: Only template values that look like paths.
                    if value.contains('/') {
                        *value = placeholder(key);
                    }
                }
            }
            _ => return Err(ConfigError::UnsupportedTemplate(section.into())),
        }

        Ok(())
    }
}

impl FromStr for Settings {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        toml::de::from_str(data).map_err(ConfigError::Deserialize)
    }
}

impl Display for Settings {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Working directories.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Directories {
    /// Root for staging and archive areas.
    #[serde(default)]
    pub config: PathBuf,
}

/// Git identity applied to the working clone.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct GitSettings {
    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub email: String,

    /// Private key used when no token is available.
    #[serde(default)]
    pub ssh_key_path: PathBuf,

    #[serde(default)]
    pub ssh_dir: PathBuf,
}

/// Remote configuration repository.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct GitHubSettings {
    /// Either `owner/name` or a full URL.
    #[serde(default)]
    pub config_repo: String,

    /// Primary branch.
    #[serde(default)]
    pub branch: String,

    /// Working clone directory.
    #[serde(default)]
    pub local_path: PathBuf,

    /// Inline token. Prefer `token_env_var`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Environment variable holding the token.
    #[serde(default)]
    pub token_env_var: String,
}

impl GitHubSettings {
    /// Name of environment variable to read token from.
    pub fn token_env_var(&self) -> &str {
        match self.token_env_var.trim() {
            "" => DEFAULT_TOKEN_ENV_VAR,
            name => name,
        }
    }
}

/// Filtering and templating rules for sharing the settings document.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct SyncConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_sections: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub template_sections: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include_override: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub template_values: BTreeMap<String, String>,
}

impl SyncConfig {
    pub fn is_empty(&self) -> bool {
        self.exclude_sections.is_empty()
            && self.template_sections.is_empty()
            && self.include_override.is_empty()
            && self.template_values.is_empty()
    }
}

fn placeholder(name: &str) -> String {
    format!("{{{{ REPLACE_{} }}}}", name.to_uppercase())
}

/// Configuration error types.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Section cannot be turned into template placeholders.
    #[error("template not supported for section {0:?}")]
    UnsupportedTemplate(String),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
