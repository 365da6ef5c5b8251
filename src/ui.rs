// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! User-facing output and confirmation.
//!
//! Orchestrators never print directly. They receive an [`OutputSink`] for
//! messages and a [`Prompter`] for yes/no questions, so the same flows can run
//! behind a terminal, inside another program, or in tests.

use indicatif::{ProgressBar, ProgressStyle};
use inquire::{Confirm, InquireError};
use std::{sync::Mutex, time::Duration};
use tracing::{error, info, warn};

/// Destination for user-facing messages.
pub trait OutputSink: Send + Sync {
    /// Title of the operation about to run.
    fn header(&self, title: &str);

    fn info(&self, message: &str);

    /// Step inside the current operation.
    fn stage(&self, message: &str);

    fn success(&self, message: &str);

    fn warning(&self, message: &str);

    fn error(&self, message: &str);

    /// Start spinner for long running step. Caller finishes it.
    fn progress(&self, message: &str) -> ProgressBar;
}

/// Source of yes/no answers.
pub trait Prompter: Send + Sync {
    /// Ask user to confirm target question.
    ///
    /// # Errors
    ///
    /// - Return [`PromptError`] if no answer can be obtained at all.
    fn confirm(&self, question: &str) -> Result<bool>;
}

/// Output sink that renders through tracing events and indicatif spinners.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalSink;

impl OutputSink for TerminalSink {
    fn header(&self, title: &str) {
        info!("==> {title}");
    }

    fn info(&self, message: &str) {
        info!("{message}");
    }

    fn stage(&self, message: &str) {
        info!("  -> {message}");
    }

    fn success(&self, message: &str) {
        info!("  ok {message}");
    }

    fn warning(&self, message: &str) {
        warn!("{message}");
    }

    fn error(&self, message: &str) {
        error!("{message}");
    }

    fn progress(&self, message: &str) -> ProgressBar {
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.green} {elapsed:.dim} {msg}") {
            bar.set_style(style);
        }
        bar.set_message(message.to_string());
        bar.enable_steady_tick(Duration::from_millis(100));
        bar
    }
}

/// Category of recorded message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Header,
    Info,
    Stage,
    Success,
    Warning,
    Error,
    Progress,
}

/// Output sink that records every message in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    messages: Mutex<Vec<(MessageKind, String)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All messages recorded so far, in order.
    pub fn messages(&self) -> Vec<(MessageKind, String)> {
        self.messages
            .lock()
            .map(|messages| messages.clone())
            .unwrap_or_default()
    }

    /// Messages of target kind, in order.
    pub fn of_kind(&self, kind: MessageKind) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter(|(recorded, _)| *recorded == kind)
            .map(|(_, message)| message)
            .collect()
    }

    /// Any message of target kind contains needle.
    pub fn contains(&self, kind: MessageKind, needle: &str) -> bool {
        self.of_kind(kind)
            .iter()
            .any(|message| message.contains(needle))
    }

    fn record(&self, kind: MessageKind, message: &str) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push((kind, message.to_string()));
        }
    }
}

impl OutputSink for MemorySink {
    fn header(&self, title: &str) {
        self.record(MessageKind::Header, title);
    }

    fn info(&self, message: &str) {
        self.record(MessageKind::Info, message);
    }

    fn stage(&self, message: &str) {
        self.record(MessageKind::Stage, message);
    }

    fn success(&self, message: &str) {
        self.record(MessageKind::Success, message);
    }

    fn warning(&self, message: &str) {
        self.record(MessageKind::Warning, message);
    }

    fn error(&self, message: &str) {
        self.record(MessageKind::Error, message);
    }

    fn progress(&self, message: &str) -> ProgressBar {
        self.record(MessageKind::Progress, message);
        ProgressBar::hidden()
    }
}

/// Prompter backed by an interactive terminal question.
///
/// Defaults to "no". Escape and interrupt count as declining.
#[derive(Debug, Default, Clone, Copy)]
pub struct InquirePrompter;

impl Prompter for InquirePrompter {
    fn confirm(&self, question: &str) -> Result<bool> {
        match Confirm::new(question).with_default(false).prompt() {
            Ok(answer) => Ok(answer),
            Err(InquireError::OperationCanceled | InquireError::OperationInterrupted) => Ok(false),
            Err(error) => Err(PromptError(error)),
        }
    }
}

/// Prompter that always gives the same answer.
#[derive(Debug, Default)]
pub struct FixedAnswer {
    answer: bool,
    asked: Mutex<Vec<String>>,
}

impl FixedAnswer {
    pub fn yes() -> Self {
        Self {
            answer: true,
            asked: Mutex::default(),
        }
    }

    pub fn no() -> Self {
        Self::default()
    }

    /// Questions asked so far.
    pub fn asked(&self) -> Vec<String> {
        self.asked
            .lock()
            .map(|asked| asked.clone())
            .unwrap_or_default()
    }
}

impl Prompter for FixedAnswer {
    fn confirm(&self, question: &str) -> Result<bool> {
        if let Ok(mut asked) = self.asked.lock() {
            asked.push(question.to_string());
        }

        Ok(self.answer)
    }
}

/// Failed to obtain answer from user.
#[derive(Debug, thiserror::Error)]
#[error("cannot prompt for confirmation")]
pub struct PromptError(#[source] InquireError);

/// Friendly result alias :3
type Result<T, E = PromptError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn memory_sink_records_in_order() {
        let sink = MemorySink::new();
        sink.header("Push nvim");
        sink.warning("careful");
        sink.progress("cloning").finish_and_clear();
        sink.success("done");

        assert_eq!(
            sink.messages(),
            vec![
                (MessageKind::Header, "Push nvim".to_string()),
                (MessageKind::Warning, "careful".to_string()),
                (MessageKind::Progress, "cloning".to_string()),
                (MessageKind::Success, "done".to_string()),
            ]
        );
        assert!(sink.contains(MessageKind::Warning, "care"));
        assert!(!sink.contains(MessageKind::Error, "care"));
    }

    #[test]
    fn fixed_answer_remembers_questions() -> anyhow::Result<()> {
        let prompter = FixedAnswer::no();
        assert!(!prompter.confirm("Proceed?")?);
        assert!(FixedAnswer::yes().confirm("Proceed?")?);
        assert_eq!(prompter.asked(), vec!["Proceed?".to_string()]);
        Ok(())
    }
}
