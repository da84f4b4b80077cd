//! Listening session
//!
//! Wraps one continuous recognition stream and reconciles its asynchronous
//! events against the trainer's moving target (stage and word).
//!
//! ## States
//!
//! ```text
//!            start()              Start event
//! ┌──────┐ ──────────► ┌──────────┐ ─────────► ┌────────┐
//! │ IDLE │             │ STARTING │            │ ACTIVE │
//! └──────┘ ◄────────── └──────────┘            └────────┘
//!    ▲       End event       │ stop()              │ stop() / start()
//!    │                       ▼                     ▼
//!    │      End event   ┌──────────┐ ◄─────────────┘
//!    └───────────────── │ STOPPING │
//!                       └──────────┘
//! ```
//!
//! ## Guards
//!
//! - The stage and word the stream belongs to are snapshotted when the stream
//!   reports `Start`. Results whose snapshot differs from the live one are
//!   stale and dropped.
//! - An [`AcceptanceGate`] lets exactly one hypothesis per (stage, word)
//!   through, whether it is an interim fast-pass or a final result.
//! - Deferred starts and restarts are timers re-validated when they fire;
//!   `stop()` cancels both and blocks auto-restart until the next `start()`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::{
    ErrorClass, RecognitionError, RecognitionErrorCode, RecognitionEvent, Recognizer,
    ResultBatch,
};
use crate::config::{RecognitionConfig, TimingConfig};
use crate::diagnostics::{DiagnosticEvent, DiagnosticsSink};
use crate::matching::{contains_foreign_script, expected_alternatives, find_match, MatchDetail};
use crate::scheduler::{Scheduler, TimerId};
use crate::trainer::{Stage, StageSnapshot};
use crate::words::WordEntry;

/// Lifecycle state of the underlying stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No stream running
    #[default]
    Idle,
    /// `start()` issued, waiting for the stream's Start event
    Starting,
    /// Stream is producing results
    Active,
    /// `stop()` issued, waiting for the stream's End event
    Stopping,
}

/// Why a restart was scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartCause {
    /// Stream ended on its own
    StreamEnded,
    /// Stream reported a recoverable error
    StreamError,
    /// The recogniser refused to start
    StartFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionTimer {
    Start(StageSnapshot),
    Restart(RestartCause),
}

/// A hypothesis accepted as the answer for a stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acceptance {
    pub snapshot: StageSnapshot,
    pub transcript: String,
    pub alternative: String,
    /// False when accepted from an interim (fast-pass) result
    pub is_final: bool,
}

/// Something the owner of the session must act on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Stream confirmed it is listening
    ListeningStarted { stage: Stage, language: String },
    /// A hypothesis matched the current word
    Accepted(Acceptance),
    /// Unrecoverable failure; the session has already stopped itself
    Fatal(RecognitionError),
}

/// One-shot acceptance flag
///
/// Set at most once per (stage, word); every state-advancing path goes
/// through [`try_accept`](Self::try_accept).
#[derive(Debug, Default)]
pub struct AcceptanceGate {
    accepted: AtomicBool,
}

impl AcceptanceGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Close the gate; returns false if it was already closed
    pub fn try_accept(&self) -> bool {
        self.accepted
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_accepted(&self) -> bool {
        self.accepted.load(Ordering::Acquire)
    }

    pub fn reset(&self) {
        self.accepted.store(false, Ordering::Release);
    }
}

/// A continuous, auto-restarting recognition session
pub struct ListeningSession {
    recognizer: Box<dyn Recognizer>,
    recognition: RecognitionConfig,
    timing: TimingConfig,
    diagnostics: Arc<dyn DiagnosticsSink>,

    state: SessionState,
    allow_auto_restart: bool,
    /// Language configured by the most recent `start()`
    active_language: Option<String>,
    /// Stage and word live when the stream reported Start
    listening: Option<StageSnapshot>,
    listening_lang: Option<String>,
    gate: AcceptanceGate,
    /// Whether the current stream produced an accepted result
    stream_accepted: bool,

    timers: Scheduler<SessionTimer>,
    pending_start: Option<TimerId>,
    pending_restart: Option<(TimerId, RestartCause)>,

    result_count: u32,
    last_heard_transcript: String,
    last_heard_confidence: Option<f32>,
}

impl ListeningSession {
    pub fn new(
        recognizer: Box<dyn Recognizer>,
        recognition: RecognitionConfig,
        timing: TimingConfig,
        diagnostics: Arc<dyn DiagnosticsSink>,
    ) -> Self {
        Self {
            recognizer,
            recognition,
            timing: timing.with_retry_floor(),
            diagnostics,
            state: SessionState::Idle,
            allow_auto_restart: false,
            active_language: None,
            listening: None,
            listening_lang: None,
            gate: AcceptanceGate::new(),
            stream_accepted: false,
            timers: Scheduler::new(),
            pending_start: None,
            pending_restart: None,
            result_count: 0,
            last_heard_transcript: String::new(),
            last_heard_confidence: None,
        }
    }

    /// Whether the underlying capability exists
    pub fn supported(&self) -> bool {
        self.recognizer.supported()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// True once the stream has confirmed it is producing results
    pub fn is_listening(&self) -> bool {
        self.state == SessionState::Active
    }

    pub fn allow_auto_restart(&self) -> bool {
        self.allow_auto_restart
    }

    pub fn listening_stage(&self) -> Option<Stage> {
        self.listening.map(|s| s.stage)
    }

    pub fn listening_lang(&self) -> Option<&str> {
        self.listening_lang.as_deref()
    }

    pub fn is_result_accepted(&self) -> bool {
        self.gate.is_accepted()
    }

    /// Re-open the acceptance gate for a new (stage, word)
    pub fn reset_gate(&self) {
        self.gate.reset();
    }

    pub fn has_pending_start(&self) -> bool {
        self.pending_start.is_some()
    }

    pub fn pending_restart(&self) -> Option<RestartCause> {
        self.pending_restart.map(|(_, cause)| cause)
    }

    pub fn result_count(&self) -> u32 {
        self.result_count
    }

    /// Most recent non-empty transcript and its confidence
    pub fn last_heard(&self) -> (&str, Option<f32>) {
        (&self.last_heard_transcript, self.last_heard_confidence)
    }

    /// Deadline of the next session timer
    pub fn next_deadline(&self) -> Option<i64> {
        self.timers.next_deadline()
    }

    fn language_for(&self, stage: Stage) -> Option<String> {
        match stage {
            Stage::Hebrew => Some(self.recognition.hebrew_language.clone()),
            Stage::Translation => Some(self.recognition.english_language.clone()),
            Stage::Start | Stage::Complete => None,
        }
    }

    /// Start listening for `target`
    ///
    /// Deferred starts wait `start_delay_ms` so a preceding stop can settle,
    /// and are dropped if `target` is no longer live when the timer fires.
    /// An immediate start while the stream is still winding down is deferred
    /// the same way. Only fatal recogniser errors are returned.
    pub fn start(
        &mut self,
        target: StageSnapshot,
        immediate: bool,
        now_ms: i64,
    ) -> Result<(), RecognitionError> {
        let Some(language) = self.language_for(target.stage) else {
            tracing::warn!("Ignoring start request for non-listening stage {}", target.stage);
            return Ok(());
        };

        if self.state == SessionState::Active {
            tracing::info!("Already listening, stopping first");
            self.stop_underlying();
        }

        let settings = self.recognition.settings_for(&language);
        if let Err(e) = self.recognizer.configure(&settings) {
            if e.is_fatal() {
                self.stop();
                return Err(e);
            }
            tracing::warn!("Failed to configure recogniser (continuing): {}", e);
        }
        tracing::debug!("Recognition language set to {}", language);
        self.active_language = Some(language);

        self.cancel_pending_start();
        self.cancel_pending_restart();
        self.allow_auto_restart = true;
        self.gate.reset();

        if immediate && self.state == SessionState::Idle {
            return self.start_underlying(now_ms);
        }

        if immediate {
            tracing::debug!("Stream still {:?}, deferring start", self.state);
        }
        let id = self
            .timers
            .schedule(now_ms, self.timing.start_delay_ms, SessionTimer::Start(target));
        self.pending_start = Some(id);
        Ok(())
    }

    /// Stop listening and suppress auto-restart
    ///
    /// Safe to call in any state. The stream may still deliver trailing
    /// events after this returns.
    pub fn stop(&mut self) {
        self.allow_auto_restart = false;
        self.cancel_pending_start();
        self.cancel_pending_restart();

        if matches!(self.state, SessionState::Starting | SessionState::Active) {
            tracing::info!("Stopping recognition");
            self.stop_underlying();
        }
    }

    /// Fire session timers due at `now_ms`, validating each against `live`
    ///
    /// Only timers already due when the call begins fire; anything they
    /// schedule waits for the next call.
    pub fn fire_due(&mut self, now_ms: i64, live: StageSnapshot) -> Result<(), RecognitionError> {
        let due: Vec<_> = std::iter::from_fn(|| self.timers.pop_due(now_ms)).collect();
        for (id, timer) in due {
            match timer {
                SessionTimer::Start(target) => {
                    if self.pending_start != Some(id) {
                        continue;
                    }
                    self.pending_start = None;
                    if self.state == SessionState::Idle
                        && target == live
                        && live.stage.is_listening()
                    {
                        self.start_underlying(now_ms)?;
                    } else {
                        tracing::debug!(
                            "Deferred start dropped (state {:?}, scheduled for {:?}, live {:?})",
                            self.state,
                            target,
                            live
                        );
                    }
                }
                SessionTimer::Restart(cause) => {
                    if !matches!(self.pending_restart, Some((pending, _)) if pending == id) {
                        continue;
                    }
                    self.pending_restart = None;
                    if self.allow_auto_restart
                        && live.stage.is_listening()
                        && self.state == SessionState::Idle
                    {
                        tracing::info!("Restarting recognition ({:?})", cause);
                        self.start(live, true, now_ms)?;
                    } else {
                        tracing::debug!(
                            "Not restarting - auto-restart {} / stage {} / state {:?}",
                            self.allow_auto_restart,
                            live.stage,
                            self.state
                        );
                    }
                }
            }
        }
        Ok(())
    }

    /// Apply one event from the recognition stream
    pub fn handle_event(
        &mut self,
        event: RecognitionEvent,
        live: StageSnapshot,
        word: Option<&WordEntry>,
        now_ms: i64,
    ) -> Option<SessionOutcome> {
        match event {
            RecognitionEvent::Start => self.on_stream_start(live),
            RecognitionEvent::End => {
                self.on_stream_end(live, word, now_ms);
                None
            }
            RecognitionEvent::Error(code) => self.on_stream_error(code, live, word, now_ms),
            RecognitionEvent::Result(batch) => self.on_result(&batch, live, word),
        }
    }

    /// Evaluate an answer that did not come from the stream
    ///
    /// Skips the staleness check but still goes through the acceptance gate.
    pub fn submit_answer(
        &mut self,
        live: StageSnapshot,
        transcript: &str,
        word: &WordEntry,
    ) -> Option<SessionOutcome> {
        if self.gate.is_accepted() {
            return None;
        }
        let detail = find_match(live.stage, [transcript], word)?;
        self.accept(live, detail, true)
    }

    fn start_underlying(&mut self, now_ms: i64) -> Result<(), RecognitionError> {
        match self.recognizer.start() {
            Ok(()) => {
                self.state = SessionState::Starting;
                tracing::info!(
                    "Recognition starting ({})",
                    self.active_language.as_deref().unwrap_or("?")
                );
                Ok(())
            }
            Err(e) if e.is_fatal() => {
                tracing::error!("Recognition cannot start: {}", e);
                self.stop();
                Err(e)
            }
            Err(e) => {
                tracing::warn!(
                    "Recognition start error: {} - will retry in {}ms",
                    e,
                    self.timing.error_restart_delay_ms
                );
                self.schedule_restart(RestartCause::StartFailed, now_ms);
                Ok(())
            }
        }
    }

    fn stop_underlying(&mut self) {
        if let Err(e) = self.recognizer.stop() {
            tracing::warn!("Error stopping recognition (ignored): {}", e);
        }
        self.state = SessionState::Stopping;
    }

    fn cancel_pending_start(&mut self) {
        if let Some(id) = self.pending_start.take() {
            self.timers.cancel(id);
            tracing::debug!("Cleared pending start timer");
        }
    }

    fn cancel_pending_restart(&mut self) {
        if let Some((id, _)) = self.pending_restart.take() {
            self.timers.cancel(id);
            tracing::debug!("Cleared pending restart timer");
        }
    }

    fn schedule_restart(&mut self, cause: RestartCause, now_ms: i64) {
        self.cancel_pending_restart();
        let delay = match cause {
            RestartCause::StreamEnded => self.timing.restart_delay_ms,
            RestartCause::StreamError | RestartCause::StartFailed => {
                self.timing.error_restart_delay_ms
            }
        };
        let id = self
            .timers
            .schedule(now_ms, delay, SessionTimer::Restart(cause));
        self.pending_restart = Some((id, cause));
    }

    fn on_stream_start(&mut self, live: StageSnapshot) -> Option<SessionOutcome> {
        self.listening = Some(live);
        self.listening_lang = self.active_language.clone();
        self.stream_accepted = false;
        self.result_count = 0;
        self.last_heard_transcript.clear();
        self.last_heard_confidence = None;

        if self.state == SessionState::Stopping {
            tracing::debug!("Stream started after stop was requested");
            return None;
        }

        self.state = SessionState::Active;
        let language = self.listening_lang.clone().unwrap_or_default();
        tracing::info!("Recognition started (stage {}, language {})", live.stage, language);
        Some(SessionOutcome::ListeningStarted {
            stage: live.stage,
            language,
        })
    }

    fn on_stream_end(&mut self, live: StageSnapshot, word: Option<&WordEntry>, now_ms: i64) {
        let previous = self.state;
        self.state = SessionState::Idle;
        tracing::info!("Recognition ended (was {:?}, stage {})", previous, live.stage);

        if let Some(snapshot) = self.listening {
            if snapshot.stage.is_listening() && !self.stream_accepted {
                self.diagnostics
                    .record(DiagnosticEvent::SessionEndedWithoutMatch {
                        stage: snapshot.stage,
                        result_count: self.result_count,
                        last_heard: self.last_heard_transcript.clone(),
                        confidence: self.last_heard_confidence,
                        expected: expected_for(snapshot.stage, word),
                    });
            }
        }

        if !self.allow_auto_restart || !live.stage.is_listening() {
            tracing::debug!("Not restarting - not in active stage or auto-restart disabled");
            return;
        }

        if self.pending_start.is_some() {
            tracing::debug!("Start already pending, no restart needed");
            return;
        }

        match self.pending_restart {
            Some((_, RestartCause::StreamError | RestartCause::StartFailed)) => {
                tracing::debug!("Error backoff already pending, keeping it");
            }
            _ => {
                tracing::debug!(
                    "Will restart recognition in {}ms",
                    self.timing.restart_delay_ms
                );
                self.schedule_restart(RestartCause::StreamEnded, now_ms);
            }
        }
    }

    fn on_stream_error(
        &mut self,
        code: RecognitionErrorCode,
        live: StageSnapshot,
        word: Option<&WordEntry>,
        now_ms: i64,
    ) -> Option<SessionOutcome> {
        let class = code.classify();
        self.diagnostics.record(DiagnosticEvent::StreamError {
            code: code.as_str().to_string(),
            class,
        });

        match class {
            ErrorClass::Benign => {
                if code == RecognitionErrorCode::NoSpeech {
                    tracing::info!("No speech detected, keeping session alive");
                    self.diagnostics.record(DiagnosticEvent::NoSpeech {
                        stage: live.stage,
                        expected: expected_for(live.stage, word),
                    });
                } else {
                    tracing::debug!("Recognition aborted (normal during stop/start)");
                }
                None
            }
            ErrorClass::Fatal => {
                tracing::error!("Microphone access denied ({})", code.as_str());
                self.stop();
                Some(SessionOutcome::Fatal(RecognitionError::PermissionDenied(
                    code.as_str().to_string(),
                )))
            }
            ErrorClass::Recoverable => {
                tracing::warn!(
                    "Recognition error {} in stage {} - will restart in {}ms",
                    code.as_str(),
                    live.stage,
                    self.timing.error_restart_delay_ms
                );
                self.schedule_restart(RestartCause::StreamError, now_ms);
                None
            }
        }
    }

    fn on_result(
        &mut self,
        batch: &ResultBatch,
        live: StageSnapshot,
        word: Option<&WordEntry>,
    ) -> Option<SessionOutcome> {
        let latest = batch.latest()?;
        let primary = latest.primary();
        let heard = !primary.trim().is_empty();

        self.result_count += 1;
        if heard {
            self.last_heard_transcript = primary.to_string();
            self.last_heard_confidence = latest.primary_confidence();
            self.diagnostics.record(DiagnosticEvent::Heard {
                stage: live.stage,
                transcript: primary.to_string(),
                confidence: latest.primary_confidence(),
                is_final: latest.is_final,
                alternatives: latest
                    .alternatives
                    .iter()
                    .map(|h| h.transcript.clone())
                    .collect(),
            });
        }

        if self.listening != Some(live) {
            self.diagnostics.record(DiagnosticEvent::StaleResult {
                listening_stage: self.listening_stage(),
                current_stage: live.stage,
                transcript: primary.to_string(),
            });
            return None;
        }

        if contains_foreign_script(primary, live.stage) {
            self.diagnostics.record(DiagnosticEvent::ForeignScript {
                transcript: primary.to_string(),
            });
            return None;
        }

        let Some(word) = word else {
            tracing::warn!("Result arrived with no current word, ignoring");
            return None;
        };

        if latest.is_final {
            if self.gate.is_accepted() {
                self.diagnostics.record(DiagnosticEvent::DuplicateIgnored {
                    stage: live.stage,
                    transcript: primary.to_string(),
                });
                return None;
            }
            if !heard {
                tracing::debug!("Empty final transcript - ignoring");
                return None;
            }

            let transcripts = latest.alternatives.iter().map(|h| h.transcript.as_str());
            match find_match(live.stage, transcripts, word) {
                Some(detail) => self.accept(live, detail, true),
                None => {
                    self.diagnostics.record(DiagnosticEvent::NoMatch {
                        stage: live.stage,
                        transcript: primary.to_string(),
                        expected: expected_for(live.stage, Some(word)),
                    });
                    None
                }
            }
        } else {
            if !heard {
                tracing::debug!("Empty interim transcript - ignoring");
                return None;
            }
            if self.gate.is_accepted() {
                return None;
            }
            let detail = find_match(live.stage, [primary], word)?;
            self.accept(live, detail, false)
        }
    }

    fn accept(
        &mut self,
        live: StageSnapshot,
        detail: MatchDetail,
        is_final: bool,
    ) -> Option<SessionOutcome> {
        if !self.gate.try_accept() {
            return None;
        }
        self.stream_accepted = true;

        self.diagnostics.record(DiagnosticEvent::Accepted {
            stage: live.stage,
            transcript: detail.hypothesis.clone(),
            alternative: detail.alternative.clone(),
            is_final,
        });

        Some(SessionOutcome::Accepted(Acceptance {
            snapshot: live,
            transcript: detail.hypothesis,
            alternative: detail.alternative,
            is_final,
        }))
    }
}

fn expected_for(stage: Stage, word: Option<&WordEntry>) -> Vec<String> {
    word.map(|w| expected_alternatives(stage, w).to_vec())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::MemoryDiagnostics;
    use crate::recognition::{HypothesisSet, MockHandle, MockRecognizer, RecognizerCall};
    use crate::words::WordList;

    const HEBREW_0: StageSnapshot = StageSnapshot {
        stage: Stage::Hebrew,
        word_index: 0,
    };
    const TRANSLATION_0: StageSnapshot = StageSnapshot {
        stage: Stage::Translation,
        word_index: 0,
    };
    const COMPLETE: StageSnapshot = StageSnapshot {
        stage: Stage::Complete,
        word_index: 3,
    };

    fn session() -> (ListeningSession, MockHandle, Arc<MemoryDiagnostics>) {
        let (recognizer, handle) = MockRecognizer::new();
        let diagnostics = Arc::new(MemoryDiagnostics::new());
        let session = ListeningSession::new(
            Box::new(recognizer),
            RecognitionConfig::default(),
            TimingConfig::default(),
            diagnostics.clone(),
        );
        (session, handle, diagnostics)
    }

    fn word() -> WordEntry {
        WordList::builtin().get(0).unwrap().clone()
    }

    fn interim(text: &str) -> RecognitionEvent {
        RecognitionEvent::Result(ResultBatch::single(HypothesisSet::interim(text)))
    }

    fn final_result(text: &str) -> RecognitionEvent {
        RecognitionEvent::Result(ResultBatch::single(HypothesisSet::final_result(text, 0.9)))
    }

    /// Bring a session to Active for `live`
    fn active(live: StageSnapshot) -> (ListeningSession, MockHandle, Arc<MemoryDiagnostics>) {
        let (mut s, handle, diagnostics) = session();
        s.start(live, true, 0).unwrap();
        s.handle_event(RecognitionEvent::Start, live, Some(&word()), 0);
        assert_eq!(s.state(), SessionState::Active);
        (s, handle, diagnostics)
    }

    #[test]
    fn test_stop_on_idle_session_is_noop() {
        let (mut s, handle, _) = session();
        s.stop();
        s.stop();
        assert_eq!(s.state(), SessionState::Idle);
        assert!(!s.allow_auto_restart());
        assert!(handle.calls().is_empty());
    }

    #[test]
    fn test_deferred_start_waits_for_delay() {
        let (mut s, handle, _) = session();
        s.start(HEBREW_0, false, 1_000).unwrap();
        assert!(s.has_pending_start());
        assert!(s.allow_auto_restart());

        s.fire_due(1_099, HEBREW_0).unwrap();
        assert_eq!(handle.start_count(), 0);

        s.fire_due(1_100, HEBREW_0).unwrap();
        assert_eq!(handle.start_count(), 1);
        assert_eq!(s.state(), SessionState::Starting);
        assert_eq!(handle.language().as_deref(), Some("he-IL"));
    }

    #[test]
    fn test_immediate_start_is_synchronous() {
        let (mut s, handle, _) = session();
        s.start(TRANSLATION_0, true, 0).unwrap();
        assert_eq!(handle.start_count(), 1);
        assert_eq!(handle.language().as_deref(), Some("en-US"));
        assert!(!s.has_pending_start());
    }

    #[test]
    fn test_start_for_non_listening_stage_is_noop() {
        let (mut s, handle, _) = session();
        s.start(COMPLETE, true, 0).unwrap();
        s.start(
            StageSnapshot {
                stage: Stage::Start,
                word_index: 0,
            },
            false,
            0,
        )
        .unwrap();
        assert!(handle.calls().is_empty());
        assert!(!s.allow_auto_restart());
        assert!(!s.has_pending_start());
    }

    #[test]
    fn test_start_while_active_stops_first() {
        let (mut s, handle, _) = active(HEBREW_0);
        handle.clear_calls();

        s.start(TRANSLATION_0, false, 0).unwrap();
        assert_eq!(
            handle.calls(),
            vec![
                RecognizerCall::Stop,
                RecognizerCall::Configure("en-US".into())
            ]
        );
        assert_eq!(s.state(), SessionState::Stopping);
    }

    #[test]
    fn test_deferred_start_dropped_when_stage_moved_on() {
        let (mut s, handle, _) = session();
        s.start(HEBREW_0, false, 0).unwrap();
        s.fire_due(100, TRANSLATION_0).unwrap();
        assert_eq!(handle.start_count(), 0);
        assert!(!s.has_pending_start());
    }

    #[test]
    fn test_stream_start_snapshots_stage_and_language() {
        let (mut s, _, _) = session();
        s.start(HEBREW_0, true, 0).unwrap();
        let outcome = s.handle_event(RecognitionEvent::Start, HEBREW_0, Some(&word()), 5);

        assert_eq!(
            outcome,
            Some(SessionOutcome::ListeningStarted {
                stage: Stage::Hebrew,
                language: "he-IL".into()
            })
        );
        assert_eq!(s.listening_stage(), Some(Stage::Hebrew));
        assert_eq!(s.listening_lang(), Some("he-IL"));
        assert!(s.is_listening());
    }

    #[test]
    fn test_stream_end_restarts_after_delay() {
        let (mut s, handle, _) = active(HEBREW_0);
        s.handle_event(RecognitionEvent::End, HEBREW_0, Some(&word()), 1_000);
        assert_eq!(s.state(), SessionState::Idle);
        assert_eq!(s.pending_restart(), Some(RestartCause::StreamEnded));

        s.fire_due(1_149, HEBREW_0).unwrap();
        assert_eq!(handle.start_count(), 1);
        s.fire_due(1_150, HEBREW_0).unwrap();
        assert_eq!(handle.start_count(), 2);
        assert_eq!(s.state(), SessionState::Starting);
    }

    #[test]
    fn test_stream_end_after_stop_does_not_restart() {
        let (mut s, handle, _) = active(HEBREW_0);
        s.stop();
        assert_eq!(s.state(), SessionState::Stopping);

        s.handle_event(RecognitionEvent::End, HEBREW_0, Some(&word()), 0);
        assert_eq!(s.pending_restart(), None);
        s.fire_due(10_000, HEBREW_0).unwrap();
        assert_eq!(handle.start_count(), 1);
    }

    #[test]
    fn test_restart_dropped_when_stage_inactive_at_fire_time() {
        let (mut s, handle, _) = active(HEBREW_0);
        s.handle_event(RecognitionEvent::End, HEBREW_0, Some(&word()), 0);
        s.fire_due(150, COMPLETE).unwrap();
        assert_eq!(handle.start_count(), 1);
    }

    #[test]
    fn test_session_end_without_match_is_reported() {
        let (mut s, _, diagnostics) = active(HEBREW_0);
        s.handle_event(final_result("משהו אחר"), HEBREW_0, Some(&word()), 0);
        s.handle_event(RecognitionEvent::End, HEBREW_0, Some(&word()), 0);

        let ended: Vec<_> = diagnostics
            .events()
            .into_iter()
            .filter_map(|e| match e {
                DiagnosticEvent::SessionEndedWithoutMatch {
                    last_heard,
                    result_count,
                    expected,
                    ..
                } => Some((last_heard, result_count, expected)),
                _ => None,
            })
            .collect();
        assert_eq!(ended.len(), 1);
        assert_eq!(ended[0].0, "משהו אחר");
        assert_eq!(ended[0].1, 1);
        assert_eq!(ended[0].2, word().he_alternatives);
    }

    #[test]
    fn test_interim_fast_pass_then_final_is_single_accept() {
        let (mut s, _, diagnostics) = active(HEBREW_0);

        let first = s.handle_event(interim("סבא"), HEBREW_0, Some(&word()), 0);
        assert!(matches!(
            first,
            Some(SessionOutcome::Accepted(Acceptance { is_final: false, .. }))
        ));
        assert!(s.is_result_accepted());

        let again = s.handle_event(interim("סבא שלי"), HEBREW_0, Some(&word()), 0);
        let last = s.handle_event(final_result("סבא שלי"), HEBREW_0, Some(&word()), 0);
        assert_eq!(again, None);
        assert_eq!(last, None);

        assert_eq!(
            diagnostics.count(|e| matches!(e, DiagnosticEvent::Accepted { .. })),
            1
        );
        assert_eq!(
            diagnostics.count(|e| matches!(e, DiagnosticEvent::DuplicateIgnored { .. })),
            1
        );
    }

    #[test]
    fn test_final_match_accepts() {
        let (mut s, _, _) = active(TRANSLATION_0);
        let outcome = s.handle_event(
            final_result("I think it is grandfather"),
            TRANSLATION_0,
            Some(&word()),
            0,
        );
        match outcome {
            Some(SessionOutcome::Accepted(acceptance)) => {
                assert!(acceptance.is_final);
                assert_eq!(acceptance.alternative, "grandfather");
                assert_eq!(acceptance.snapshot, TRANSLATION_0);
            }
            other => panic!("expected acceptance, got {:?}", other),
        }
    }

    #[test]
    fn test_final_checks_every_alternative() {
        let (mut s, _, _) = active(TRANSLATION_0);
        let batch = ResultBatch::single(HypothesisSet {
            is_final: true,
            alternatives: vec![
                crate::recognition::Hypothesis::new("grand fodder", Some(0.6)),
                crate::recognition::Hypothesis::new("grandpa", Some(0.3)),
            ],
        });
        let outcome = s.handle_event(
            RecognitionEvent::Result(batch),
            TRANSLATION_0,
            Some(&word()),
            0,
        );
        assert!(matches!(outcome, Some(SessionOutcome::Accepted(_))));
    }

    #[test]
    fn test_final_no_match_keeps_listening() {
        let (mut s, _, diagnostics) = active(TRANSLATION_0);
        let outcome = s.handle_event(final_result("cat"), TRANSLATION_0, Some(&word()), 0);
        assert_eq!(outcome, None);
        assert!(!s.is_result_accepted());
        assert!(s.is_listening());
        assert_eq!(
            diagnostics.count(|e| matches!(e, DiagnosticEvent::NoMatch { .. })),
            1
        );
    }

    #[test]
    fn test_stale_result_is_never_evaluated() {
        let (mut s, _, diagnostics) = active(HEBREW_0);
        let outcome = s.handle_event(final_result("grandfather"), TRANSLATION_0, Some(&word()), 0);
        assert_eq!(outcome, None);
        assert!(!s.is_result_accepted());
        assert_eq!(
            diagnostics.count(|e| matches!(e, DiagnosticEvent::StaleResult { .. })),
            1
        );
        assert_eq!(
            diagnostics.count(|e| matches!(e, DiagnosticEvent::NoMatch { .. })),
            0
        );
    }

    #[test]
    fn test_result_from_previous_word_is_stale() {
        let (mut s, _, _) = active(HEBREW_0);
        let next_word = StageSnapshot {
            stage: Stage::Hebrew,
            word_index: 1,
        };
        let outcome = s.handle_event(final_result("סבא"), next_word, Some(&word()), 0);
        assert_eq!(outcome, None);
    }

    #[test]
    fn test_hebrew_script_discarded_in_translation() {
        let (mut s, _, diagnostics) = active(TRANSLATION_0);
        let hebrew_answer = WordEntry::new("אבא", &["אבא"], "father", &["אבא"]);
        let outcome = s.handle_event(final_result("אבא"), TRANSLATION_0, Some(&hebrew_answer), 0);
        assert_eq!(outcome, None);
        assert_eq!(
            diagnostics.count(|e| matches!(e, DiagnosticEvent::ForeignScript { .. })),
            1
        );
    }

    #[test]
    fn test_empty_interim_is_not_heard() {
        let (mut s, _, diagnostics) = active(HEBREW_0);
        let outcome = s.handle_event(interim("   "), HEBREW_0, Some(&word()), 0);
        assert_eq!(outcome, None);
        assert_eq!(s.last_heard(), ("", None));
        assert_eq!(
            diagnostics.count(|e| matches!(e, DiagnosticEvent::Heard { .. })),
            0
        );
    }

    #[test]
    fn test_benign_errors_change_nothing() {
        let (mut s, _, diagnostics) = active(HEBREW_0);
        for code in [RecognitionErrorCode::NoSpeech, RecognitionErrorCode::Aborted] {
            let outcome = s.handle_event(RecognitionEvent::Error(code), HEBREW_0, Some(&word()), 0);
            assert_eq!(outcome, None);
        }
        assert_eq!(s.pending_restart(), None);
        assert_eq!(s.state(), SessionState::Active);
        assert_eq!(
            diagnostics.count(|e| matches!(e, DiagnosticEvent::NoSpeech { .. })),
            1
        );
    }

    #[test]
    fn test_recoverable_error_restarts_once_after_backoff() {
        let (mut s, handle, _) = active(HEBREW_0);
        s.handle_event(
            RecognitionEvent::Error(RecognitionErrorCode::Network),
            HEBREW_0,
            Some(&word()),
            0,
        );
        // The stream ends right after the error; the backoff is kept
        s.handle_event(RecognitionEvent::End, HEBREW_0, Some(&word()), 10);
        assert_eq!(s.pending_restart(), Some(RestartCause::StreamError));

        s.fire_due(999, HEBREW_0).unwrap();
        assert_eq!(handle.start_count(), 1);
        s.fire_due(1_000, HEBREW_0).unwrap();
        assert_eq!(handle.start_count(), 2);
        s.fire_due(60_000, HEBREW_0).unwrap();
        assert_eq!(handle.start_count(), 2);
    }

    #[test]
    fn test_error_restart_skipped_if_stage_completed() {
        let (mut s, handle, _) = active(HEBREW_0);
        s.handle_event(
            RecognitionEvent::Error(RecognitionErrorCode::AudioCapture),
            HEBREW_0,
            Some(&word()),
            0,
        );
        s.handle_event(RecognitionEvent::End, HEBREW_0, Some(&word()), 0);
        s.fire_due(1_000, COMPLETE).unwrap();
        assert_eq!(handle.start_count(), 1);
        assert_eq!(s.pending_restart(), None);
    }

    #[test]
    fn test_permission_denied_is_fatal() {
        let (mut s, handle, _) = active(HEBREW_0);
        let outcome = s.handle_event(
            RecognitionEvent::Error(RecognitionErrorCode::NotAllowed),
            HEBREW_0,
            Some(&word()),
            0,
        );
        assert_eq!(
            outcome,
            Some(SessionOutcome::Fatal(RecognitionError::PermissionDenied(
                "not-allowed".into()
            )))
        );
        assert!(!s.allow_auto_restart());

        s.handle_event(RecognitionEvent::End, HEBREW_0, Some(&word()), 0);
        s.fire_due(60_000, HEBREW_0).unwrap();
        assert_eq!(handle.start_count(), 1);
    }

    #[test]
    fn test_failed_start_retries_after_backoff() {
        let (mut s, handle, _) = session();
        handle.fail_next_start(RecognitionError::Start("busy".into()));
        s.start(HEBREW_0, true, 0).unwrap();
        assert_eq!(s.state(), SessionState::Idle);
        assert_eq!(s.pending_restart(), Some(RestartCause::StartFailed));

        s.fire_due(1_000, HEBREW_0).unwrap();
        assert_eq!(handle.start_count(), 1);
        assert_eq!(s.state(), SessionState::Starting);
    }

    #[test]
    fn test_zero_error_delay_does_not_spin() {
        let (recognizer, handle) = MockRecognizer::new();
        let mut s = ListeningSession::new(
            Box::new(recognizer),
            RecognitionConfig::default(),
            TimingConfig {
                error_restart_delay_ms: 0,
                restart_delay_ms: 0,
                ..TimingConfig::default()
            },
            Arc::new(MemoryDiagnostics::new()),
        );
        handle.fail_every_start(Some(RecognitionError::Start("busy".into())));

        s.start(HEBREW_0, true, 0).unwrap();
        assert_eq!(handle.failed_start_count(), 1);
        assert_eq!(s.next_deadline(), Some(TimingConfig::MIN_RETRY_DELAY_MS as i64));

        // Each call fires at most the retry that was already due
        s.fire_due(10, HEBREW_0).unwrap();
        assert_eq!(handle.failed_start_count(), 2);
        s.fire_due(10, HEBREW_0).unwrap();
        assert_eq!(handle.failed_start_count(), 2);
        s.fire_due(20, HEBREW_0).unwrap();
        assert_eq!(handle.failed_start_count(), 3);

        handle.fail_every_start(None);
        s.fire_due(30, HEBREW_0).unwrap();
        assert_eq!(s.state(), SessionState::Starting);
        assert_eq!(s.pending_restart(), None);
    }

    #[test]
    fn test_fatal_start_failure_is_returned() {
        let (mut s, handle, _) = session();
        handle.fail_next_start(RecognitionError::PermissionDenied("not-allowed".into()));
        let err = s.start(HEBREW_0, true, 0).unwrap_err();
        assert!(err.is_fatal());
        assert!(!s.allow_auto_restart());
        assert_eq!(s.pending_restart(), None);
    }

    #[test]
    fn test_acceptance_gate_is_one_shot() {
        let gate = AcceptanceGate::new();
        assert!(gate.try_accept());
        assert!(!gate.try_accept());
        assert!(gate.is_accepted());
        gate.reset();
        assert!(gate.try_accept());
    }
}
