// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration synchronization through a private git repository.
//!
//! Anvil moves configuration artifacts between three places: the user's own
//! paths declared in the settings document, a staging area under the anvil
//! working root, and a remote git repository mirrored by a local working
//! clone.
//!
//! - __Pull__ copies `<repo>/<app>` into staging. It never writes to user
//!   paths.
//! - __Push__ copies a declared local path into the working clone, commits it
//!   on a fresh `config-push-<DDMMYYYY-HHMM>` branch, and pushes that branch.
//!   Pushing is refused unless the repository is private.
//! - __Sync__ overlays the staged copy onto the declared local path after
//!   archiving what was there. Local-only files survive.
//!
//! The reserved app name `anvil` refers to the settings document itself.

pub mod archive;
pub mod config;
pub mod copy;
pub mod diff;
pub mod env;
pub mod error;
pub mod flow;
pub mod git;
pub mod path;
pub mod privacy;
pub mod resolve;
pub mod store;
pub mod ui;

pub use error::{AnvilError, ErrorKind, Operation};
pub use flow::Session;
pub use resolve::Target;
pub use store::SettingsStore;
