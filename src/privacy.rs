// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Repository privacy gate.
//!
//! Configuration repositories routinely hold tokens, host names, and other
//! machine details. Anvil refuses to push into a repository that anyone on
//! the internet can read.
//!
//! # Gate Logic
//!
//! [`verify_private`] runs two probes in order:
//!
//! 1. An authenticated `git ls-remote <url> HEAD`. If this fails the gate
//!    aborts, because nothing can be concluded about visibility.
//! 2. An unauthenticated HTTP `HEAD` request against the repository's web
//!    address. If this succeeds the repository is publicly readable and the
//!    gate refuses.
//!
//! Only a successful first probe paired with a failed second probe yields a
//! [`PrivacyClearance`], and [`RemoteGateway::push`] demands one. Local
//! remotes (`file://` URLs and filesystem paths) are not reachable from the
//! internet and skip the second probe. Any other remote without a derivable
//! web address is refused.

use crate::{
    error::{AnvilError, Result},
    git::{runner::CommandRunner, url::is_local, Deadline, RemoteGateway},
    ui::OutputSink,
};

use std::{future::Future, time::Duration};
use tracing::{debug, instrument, warn};

/// Proof that the privacy gate passed for one repository.
///
/// Only [`verify_private`] can construct a clearance, and it cannot be
/// cloned, so each operation has to earn its own.
#[derive(Debug)]
pub struct PrivacyClearance {
    repo: String,
}

impl PrivacyClearance {
    /// Clearance applies to target repository.
    pub fn covers(&self, repo: &str) -> bool {
        self.repo == repo
    }
}

/// Layer of indirection for anonymous visibility checks.
pub trait VisibilityProbe: Send + Sync {
    /// Check whether target web address answers an anonymous request.
    fn is_publicly_readable(
        &self,
        web_url: &str,
        deadline: Deadline,
    ) -> impl Future<Output = bool> + Send;
}

impl<P> VisibilityProbe for &P
where
    P: VisibilityProbe + ?Sized,
{
    fn is_publicly_readable(
        &self,
        web_url: &str,
        deadline: Deadline,
    ) -> impl Future<Output = bool> + Send {
        (**self).is_publicly_readable(web_url, deadline)
    }
}

/// Visibility probe that issues an HTTP `HEAD` request without credentials.
///
/// Redirects are not followed, so any non-error status counts as readable.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    agent: ureq::Agent,
}

impl HttpProbe {
    pub fn new() -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(15))
            .redirects(0)
            .build();
        Self { agent }
    }
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl VisibilityProbe for HttpProbe {
    async fn is_publicly_readable(&self, web_url: &str, deadline: Deadline) -> bool {
        let agent = self.agent.clone();
        let url = web_url.to_string();
        let request = tokio::task::spawn_blocking(move || {
            agent
                .head(&url)
                .set("User-Agent", "anvil-privacy-check")
                .call()
                .is_ok()
        });

        match tokio::time::timeout_at(deadline.instant(), request).await {
            Ok(Ok(readable)) => readable,
            Ok(Err(error)) => {
                warn!("visibility probe task failed: {error}");
                false
            }
            Err(_) => {
                warn!("visibility probe of {web_url} timed out");
                false
            }
        }
    }
}

/// Verify repository is not publicly readable.
///
/// # Errors
///
/// - Return network error with [`PrivacyViolation::AuthenticationFailed`] if
///   the authenticated probe fails.
/// - Return validation error with [`PrivacyViolation::PubliclyReadable`] if
///   the repository answers anonymous requests.
/// - Return validation error with [`PrivacyViolation::Unverifiable`] if the
///   remote is not local and has no web address to probe.
#[instrument(skip_all, level = "debug")]
pub async fn verify_private<R, P>(
    gateway: &RemoteGateway<R>,
    probe: &P,
    sink: &dyn OutputSink,
    deadline: Deadline,
) -> Result<PrivacyClearance>
where
    R: CommandRunner,
    P: VisibilityProbe,
{
    let repo = gateway.remote().repo.clone();
    sink.stage("Verifying repository privacy");

    // INVARIANT: Never look at visibility until authenticated access works.
    if !gateway.authenticated_probe(deadline).await? {
        sink.error("Cannot access the configuration repository with the configured credentials");
        return Err(AnvilError::network(
            gateway.op(),
            "privacy-auth",
            PrivacyViolation::AuthenticationFailed { repo: repo.clone() },
        )
        .with_context(repo)
        .with_hint("check the token environment variable or git.ssh_key_path in your settings"));
    }

    match gateway.web_url() {
        Some(url) => {
            if probe.is_publicly_readable(&url, deadline).await {
                sink.error("SECURITY: the configuration repository is PUBLIC");
                sink.error(&format!("Anyone can read {url}"));
                sink.error("Push refused. Configuration files may contain secrets.");
                sink.info(&format!("Make the repository private at {url}/settings"));
                return Err(AnvilError::validation(
                    gateway.op(),
                    "privacy-check",
                    PrivacyViolation::PubliclyReadable {
                        repo: repo.clone(),
                        url: url.clone(),
                    },
                )
                .with_context(repo)
                .with_hint(format!("make the repository private at {url}/settings")));
            }
        }
        None if is_local(&repo) => debug!("remote {repo:?} is local, skip anonymous probe"),
        None => {
            sink.error("Cannot determine whether the configuration repository is public");
            return Err(AnvilError::validation(
                gateway.op(),
                "privacy-check",
                PrivacyViolation::Unverifiable { repo: repo.clone() },
            )
            .with_context(repo)
            .with_hint("write github.config_repo as owner/name or an https, ssh or scp-style URL"));
        }
    }

    sink.success("Repository is private");
    Ok(PrivacyClearance { repo })
}

/// Privacy gate refusals.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PrivacyViolation {
    /// Authenticated probe failed, visibility is unknown.
    #[error("cannot verify privacy of {repo:?}: authenticated access failed")]
    AuthenticationFailed { repo: String },

    /// Repository answers anonymous requests.
    #[error("repository {repo:?} is publicly readable at {url}")]
    PubliclyReadable { repo: String, url: String },

    /// Remote has no web address to check anonymously.
    #[error("cannot verify privacy of {repo:?}: no web address to probe")]
    Unverifiable { repo: String },
}
