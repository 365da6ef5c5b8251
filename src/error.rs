// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Structured error reporting.
//!
//! Every failure that leaves an orchestrator is an [`AnvilError`]. The error
//! names the command verb that failed ([`Operation`]), a short tag for the step
//! inside that verb, a broad [`ErrorKind`] callers can match on, and the
//! original cause. Optional context and a remediation hint are rendered by the
//! binary underneath the cause chain.
//!
//! Structured causes such as [`BranchNotFound`](crate::git::BranchNotFound)
//! stay reachable through [`AnvilError::find_cause`], so callers never need to
//! parse messages.

use std::{
    error::Error as StdError,
    fmt::{Display, Formatter, Result as FmtResult},
};

/// Boxed cause carried by [`AnvilError`].
pub type Cause = Box<dyn StdError + Send + Sync + 'static>;

/// Broad classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Platform,
    Validation,
    Configuration,
    Installation,
    Network,
    Filesystem,
    General,
}

impl Display for ErrorKind {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let label = match self {
            Self::Platform => "platform",
            Self::Validation => "validation",
            Self::Configuration => "configuration",
            Self::Installation => "installation",
            Self::Network => "network",
            Self::Filesystem => "filesystem",
            Self::General => "general",
        };
        fmt.write_str(label)
    }
}

/// Command verb an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Settings,
    Pull,
    Push,
    Sync,
}

impl Display for Operation {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let label = match self {
            Self::Settings => "settings",
            Self::Pull => "pull",
            Self::Push => "push",
            Self::Sync => "sync",
        };
        fmt.write_str(label)
    }
}

/// Structured error with kind, operation tags, and wrapped cause.
#[derive(Debug, thiserror::Error)]
pub struct AnvilError {
    op: Operation,
    sub_op: &'static str,
    kind: ErrorKind,
    context: Option<String>,
    hint: Option<String>,
    #[source]
    source: Cause,
}

impl AnvilError {
    /// Construct new error of any kind.
    pub fn new(
        op: Operation,
        sub_op: &'static str,
        kind: ErrorKind,
        source: impl Into<Cause>,
    ) -> Self {
        Self {
            op,
            sub_op,
            kind,
            context: None,
            hint: None,
            source: source.into(),
        }
    }

    pub fn platform(op: Operation, sub_op: &'static str, source: impl Into<Cause>) -> Self {
        Self::new(op, sub_op, ErrorKind::Platform, source)
    }

    pub fn validation(op: Operation, sub_op: &'static str, source: impl Into<Cause>) -> Self {
        Self::new(op, sub_op, ErrorKind::Validation, source)
    }

    pub fn configuration(op: Operation, sub_op: &'static str, source: impl Into<Cause>) -> Self {
        Self::new(op, sub_op, ErrorKind::Configuration, source)
    }

    pub fn installation(op: Operation, sub_op: &'static str, source: impl Into<Cause>) -> Self {
        Self::new(op, sub_op, ErrorKind::Installation, source)
    }

    pub fn network(op: Operation, sub_op: &'static str, source: impl Into<Cause>) -> Self {
        Self::new(op, sub_op, ErrorKind::Network, source)
    }

    pub fn filesystem(op: Operation, sub_op: &'static str, source: impl Into<Cause>) -> Self {
        Self::new(op, sub_op, ErrorKind::Filesystem, source)
    }

    pub fn general(op: Operation, sub_op: &'static str, source: impl Into<Cause>) -> Self {
        Self::new(op, sub_op, ErrorKind::General, source)
    }

    /// Attach free-form context, e.g., the path or repository involved.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Attach a remediation hint for the user.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn op(&self) -> Operation {
        self.op
    }

    pub fn sub_op(&self) -> &'static str {
        self.sub_op
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    /// Search the cause chain for a structured cause of type `E`.
    pub fn find_cause<E>(&self) -> Option<&E>
    where
        E: StdError + 'static,
    {
        let root: &(dyn StdError + 'static) = &*self.source;
        let mut current = Some(root);
        while let Some(error) = current {
            if let Some(found) = error.downcast_ref::<E>() {
                return Some(found);
            }
            current = error.source();
        }

        None
    }
}

impl Display for AnvilError {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "anvil {} {} [{}]", self.op, self.sub_op, self.kind)?;
        if let Some(context) = &self.context {
            write!(fmt, " ({context})")?;
        }

        Ok(())
    }
}

/// Friendly result alias :3
pub type Result<T, E = AnvilError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug, thiserror::Error)]
    #[error("inner failure")]
    struct Inner;

    #[derive(Debug, thiserror::Error)]
    #[error("outer failure")]
    struct Outer(#[source] Inner);

    #[test]
    fn display_renders_tags_and_context() {
        let error = AnvilError::configuration(Operation::Pull, "validate-branch", "no branch")
            .with_context("owner/repo");
        assert_eq!(
            error.to_string(),
            "anvil pull validate-branch [configuration] (owner/repo)"
        );
        assert_eq!(error.kind(), ErrorKind::Configuration);
        assert_eq!(error.source().map(ToString::to_string), Some("no branch".into()));
    }

    #[test]
    fn find_cause_walks_nested_sources() {
        let error = AnvilError::general(Operation::Sync, "copy", Outer(Inner));
        assert!(error.find_cause::<Outer>().is_some());
        assert!(error.find_cause::<Inner>().is_some());
        assert!(error.find_cause::<std::io::Error>().is_none());
    }

    #[test]
    fn hint_is_optional() {
        let error = AnvilError::network(Operation::Push, "privacy-auth", "denied");
        assert_eq!(error.hint(), None);
        let error = error.with_hint("check your token");
        assert_eq!(error.hint(), Some("check your token"));
    }
}
