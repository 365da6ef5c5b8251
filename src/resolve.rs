// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Map app names to local paths.
//!
//! Every command accepts an app name. The reserved name `anvil` refers to the
//! settings document itself, which lives at a fixed path and is stored under
//! `anvil/` in the working clone. All other names go through the settings
//! store's resolution rules.

use crate::{
    error::Result,
    path::SETTINGS_FILE,
    store::{AppLocation, SettingsStore},
};

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Component, Path, PathBuf},
};

/// Reserved app name for the settings document.
pub const SETTINGS_APP: &str = "anvil";

/// What a command operates on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// The settings document.
    Settings,

    /// A user declared app.
    App(String),
}

impl Target {
    /// Parse app name given on command line.
    ///
    /// No name, or the reserved name, targets the settings document.
    ///
    /// # Errors
    ///
    /// - Return [`InvalidAppName`] if the name is blank or would escape its
    ///   directory in the working clone.
    pub fn parse(name: Option<&str>) -> std::result::Result<Self, InvalidAppName> {
        let Some(name) = name.map(str::trim) else {
            return Ok(Self::Settings);
        };

        if name == SETTINGS_APP {
            return Ok(Self::Settings);
        }

        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(Self::App(name.to_string())),
            _ => Err(InvalidAppName(name.to_string())),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Settings => SETTINGS_APP,
            Self::App(name) => name,
        }
    }

    pub fn is_settings(&self) -> bool {
        matches!(self, Self::Settings)
    }

    /// Directory of target relative to working clone root.
    pub fn repo_dir(&self) -> PathBuf {
        PathBuf::from(self.name())
    }

    /// Prefix used for archive directories.
    pub fn archive_prefix(&self) -> String {
        match self {
            Self::Settings => "anvil-settings".into(),
            Self::App(name) => format!("{name}-configs"),
        }
    }

    /// Path of artifact inside staging directory of target.
    ///
    /// The settings document is staged as a directory holding the file, so
    /// sync reads the file itself rather than the directory.
    pub fn staged_artifact(&self, staging: &Path) -> PathBuf {
        match self {
            Self::Settings => staging.join(SETTINGS_FILE),
            Self::App(_) => staging.to_path_buf(),
        }
    }
}

impl Display for Target {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.name())
    }
}

/// App name cannot be used as a directory name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid app name {0:?}: expected a single directory name")]
pub struct InvalidAppName(pub String);

/// Resolver of targets into local paths.
#[derive(Debug, Clone, Copy)]
pub struct PathResolver<'store> {
    store: &'store SettingsStore,
}

impl<'store> PathResolver<'store> {
    pub fn new(store: &'store SettingsStore) -> Self {
        Self { store }
    }

    /// Resolve target into its local path.
    ///
    /// The settings document always resolves to the settings file path.
    ///
    /// # Errors
    ///
    /// - Return error if settings cannot be loaded.
    pub fn resolve(&self, target: &Target) -> Result<AppLocation> {
        match target {
            Target::Settings => Ok(AppLocation::FromConfigs(self.store.path().to_path_buf())),
            Target::App(name) => self.store.resolve_app_location(name),
        }
    }
}
