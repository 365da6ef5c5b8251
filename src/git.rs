// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Git plumbing.
//!
//! Anvil drives the host `git` binary rather than linking a git library, so
//! that authentication, SSH configuration, and credential helpers behave
//! exactly as they do for the user on the command line. This module splits
//! that work into three layers:
//!
//! - [`runner`]: execute external commands under a deadline.
//! - [`url`]: turn the configured repository into concrete URLs.
//! - [`gateway`]: manage the working clone and talk to the remote.

pub mod gateway;
pub mod runner;
pub mod url;

pub use gateway::{BranchNotFound, CommandFailed, CommitOutcome, RemoteGateway, RemoteSettings};
pub use runner::{CommandOutput, CommandRunner, Deadline, Invocation, SystemRunner};
