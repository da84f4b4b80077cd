//! Presentation layer
//!
//! The state machine never renders anything itself; it tells a [`Presenter`]
//! what changed. The console binary uses [`ConsolePresenter`], tests use
//! [`RecordingPresenter`].

use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;

use crate::trainer::format_duration;

/// Receiver for everything the user should see
pub trait Presenter: Send {
    /// Display the word being practised
    fn show_word(&mut self, text: &str);

    fn update_status(&mut self, message: &str);

    fn show_listening_indicator(&mut self, listening: bool);

    /// Celebrate an accepted answer
    fn show_match_feedback(&mut self);

    fn show_completion(&mut self, elapsed_seconds: u64, is_new_best: bool, best_seconds: Option<u64>);

    /// Surface a fatal problem to the user
    fn show_error(&mut self, message: &str);

    fn hide_error(&mut self);

    /// Reset the display to its pre-run state
    fn clear(&mut self);
}

/// Plain-text presenter writing one line per update
pub struct ConsolePresenter<W: Write + Send> {
    out: W,
    listening: bool,
}

impl ConsolePresenter<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> ConsolePresenter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            listening: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, text: &str) {
        if let Err(e) = writeln!(self.out, "{}", text).and_then(|_| self.out.flush()) {
            tracing::warn!("Failed to write to console: {}", e);
        }
    }
}

impl<W: Write + Send> Presenter for ConsolePresenter<W> {
    fn show_word(&mut self, text: &str) {
        self.line(&format!("\n    {}\n", text));
    }

    fn update_status(&mut self, message: &str) {
        self.line(&format!("[{}]", message));
    }

    fn show_listening_indicator(&mut self, listening: bool) {
        // Only print edges, the state machine toggles this often
        if listening != self.listening {
            self.listening = listening;
            self.line(if listening { "(mic on)" } else { "(mic off)" });
        }
    }

    fn show_match_feedback(&mut self) {
        self.line("✓ Correct!");
    }

    fn show_completion(&mut self, elapsed_seconds: u64, is_new_best: bool, best_seconds: Option<u64>) {
        self.line(&format!("Your time: {}", format_duration(elapsed_seconds)));
        if is_new_best {
            self.line("New best time!");
        } else if let Some(best) = best_seconds {
            self.line(&format!("Best time: {}", format_duration(best)));
        }
    }

    fn show_error(&mut self, message: &str) {
        self.line(&format!("ERROR: {}", message));
    }

    fn hide_error(&mut self) {}

    fn clear(&mut self) {
        self.listening = false;
    }
}

/// A call made against a [`RecordingPresenter`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenterCall {
    ShowWord(String),
    UpdateStatus(String),
    ListeningIndicator(bool),
    MatchFeedback,
    Completion {
        elapsed_seconds: u64,
        is_new_best: bool,
        best_seconds: Option<u64>,
    },
    ShowError(String),
    HideError,
    Clear,
}

/// Shared view onto a [`RecordingPresenter`]'s calls
#[derive(Debug, Clone, Default)]
pub struct PresenterHandle {
    calls: Arc<Mutex<Vec<PresenterCall>>>,
}

impl PresenterHandle {
    pub fn calls(&self) -> Vec<PresenterCall> {
        self.calls.lock().clone()
    }

    pub fn count(&self, predicate: impl Fn(&PresenterCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| predicate(c)).count()
    }

    /// Every completion summary shown so far
    pub fn completions(&self) -> Vec<PresenterCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, PresenterCall::Completion { .. }))
            .cloned()
            .collect()
    }

    pub fn last_status(&self) -> Option<String> {
        self.calls.lock().iter().rev().find_map(|c| match c {
            PresenterCall::UpdateStatus(message) => Some(message.clone()),
            _ => None,
        })
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

/// Presenter that records every call
#[derive(Debug, Default)]
pub struct RecordingPresenter {
    calls: Arc<Mutex<Vec<PresenterCall>>>,
}

impl RecordingPresenter {
    pub fn new() -> (Self, PresenterHandle) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let handle = PresenterHandle {
            calls: calls.clone(),
        };
        (Self { calls }, handle)
    }

    fn push(&self, call: PresenterCall) {
        self.calls.lock().push(call);
    }
}

impl Presenter for RecordingPresenter {
    fn show_word(&mut self, text: &str) {
        self.push(PresenterCall::ShowWord(text.to_string()));
    }

    fn update_status(&mut self, message: &str) {
        self.push(PresenterCall::UpdateStatus(message.to_string()));
    }

    fn show_listening_indicator(&mut self, listening: bool) {
        self.push(PresenterCall::ListeningIndicator(listening));
    }

    fn show_match_feedback(&mut self) {
        self.push(PresenterCall::MatchFeedback);
    }

    fn show_completion(&mut self, elapsed_seconds: u64, is_new_best: bool, best_seconds: Option<u64>) {
        self.push(PresenterCall::Completion {
            elapsed_seconds,
            is_new_best,
            best_seconds,
        });
    }

    fn show_error(&mut self, message: &str) {
        self.push(PresenterCall::ShowError(message.to_string()));
    }

    fn hide_error(&mut self) {
        self.push(PresenterCall::HideError);
    }

    fn clear(&mut self) {
        self.push(PresenterCall::Clear);
    }
}
