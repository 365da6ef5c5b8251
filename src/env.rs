// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Process environment access.
//!
//! Anvil reads exactly two things from its environment: the user's home
//! directory, and whichever variable holds the access token. Both go through
//! the [`Environment`] trait so that orchestrators can run against a fixed
//! environment when embedded or tested.

use std::{collections::HashMap, path::PathBuf};

/// Layer of indirection for environment lookups.
pub trait Environment: Send + Sync {
    /// Value of environment variable, if set and valid unicode.
    fn var(&self, key: &str) -> Option<String>;

    /// Absolute path to user's home directory.
    fn home_dir(&self) -> Option<PathBuf>;
}

/// Environment of the running process.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemEnv;

impl Environment for SystemEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }

    fn home_dir(&self) -> Option<PathBuf> {
        dirs::home_dir()
    }
}

/// Fixed environment that never consults the running process.
#[derive(Debug, Default, Clone)]
pub struct FixedEnv {
    home: Option<PathBuf>,
    vars: HashMap<String, String>,
}

impl FixedEnv {
    /// Construct new fixed environment rooted at target home directory.
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self {
            home: Some(home.into()),
            vars: HashMap::new(),
        }
    }

    /// Set variable in fixed environment.
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }
}

impl Environment for FixedEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }

    fn home_dir(&self) -> Option<PathBuf> {
        self.home.clone()
    }
}
