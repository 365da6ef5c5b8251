// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine relevent path information for external files that need to be
//! interacted with, or managed in some way. Anvil keeps its own state under
//! `$HOME/.anvil`, with the settings document at `$HOME/.anvil/settings.toml`.

use crate::env::Environment;

use std::path::{Path, PathBuf};

/// Name of directory under home that houses anvil state.
pub const ANVIL_DIR: &str = ".anvil";

/// File name of settings document.
pub const SETTINGS_FILE: &str = "settings.toml";

/// Determine absolute path to user's home directory.
///
/// Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn home_dir(env: &dyn Environment) -> Result<PathBuf> {
    env.home_dir().ok_or(NoWayHome)
}

/// Determine default absolute path to anvil's state directory.
///
/// Uses `$HOME/.anvil`. Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn anvil_dir(env: &dyn Environment) -> Result<PathBuf> {
    home_dir(env).map(|home| home.join(ANVIL_DIR))
}

/// Determine default absolute path to settings document.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn default_settings_path(env: &dyn Environment) -> Result<PathBuf> {
    anvil_dir(env).map(|dir| dir.join(SETTINGS_FILE))
}

/// Expand leading tilde of path against target home directory.
///
/// Paths without a leading `~` are returned unchanged.
pub fn expand_tilde(path: &Path, home: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    match shellexpand::tilde_with_context(raw.as_ref(), || home.to_str()) {
        std::borrow::Cow::Borrowed(_) => path.to_path_buf(),
        std::borrow::Cow::Owned(expanded) => PathBuf::from(expanded),
    }
}

/// No way to determine user's home directory.
///
/// # See Also
///
/// - [`dirs::home_dir`](https://docs.rs/dirs/latest/dirs/fn.home_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's home directory")]
pub struct NoWayHome;

/// Friendly result alias :3
pub type Result<T, E = NoWayHome> = std::result::Result<T, E>;
