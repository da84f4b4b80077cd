//! Training state machine
//!
//! Owns the run state, the listening session and the collaborators, and is
//! the only caller of the session's `start`/`stop`.

use std::collections::VecDeque;
use std::sync::Arc;

use super::state::{elapsed_seconds, RunState, RunSummary, Stage, TrainerTimer};
use crate::config::{Config, RecognitionConfig, TimingConfig};
use crate::database::ScoreStore;
use crate::diagnostics::DiagnosticsSink;
use crate::error::TrainerError;
use crate::presentation::Presenter;
use crate::recognition::{
    Acceptance, ListeningSession, RecognitionError, RecognitionEvent, Recognizer,
    SessionOutcome, SessionState,
};
use crate::scheduler::{Clock, Scheduler, TimerId};
use crate::words::WordList;

const STATUS_LISTENING: &str = "Listening...";
const STATUS_NOT_LISTENING: &str = "Not listening…";
const STATUS_COMPLETE: &str = "Congratulations! Training Complete!";
const STATUS_NEW_BEST: &str = "NEW BEST TIME! Congratulations! Training Complete!";

const UNSUPPORTED_MESSAGE: &str =
    "Speech recognition is not supported here. Please use a system with a speech recogniser.";
const PERMISSION_MESSAGE: &str =
    "Microphone access denied. Please enable microphone access and try again.";

/// Everything the state machine talks to besides the recogniser
pub struct Collaborators {
    pub presenter: Box<dyn Presenter>,
    pub scores: Box<dyn ScoreStore>,
    pub diagnostics: Arc<dyn DiagnosticsSink>,
    pub clock: Arc<dyn Clock>,
}

/// Tunables for a state machine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrainerOptions {
    pub timing: TimingConfig,
    pub recognition: RecognitionConfig,
    pub hebrew_only_mode: bool,
}

impl TrainerOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            timing: config.timing,
            recognition: config.recognition.clone(),
            hebrew_only_mode: config.training.hebrew_only_mode,
        }
    }
}

/// Drives a training run from the first word to completion
pub struct TrainingStateMachine {
    words: WordList,
    session: ListeningSession,
    presenter: Box<dyn Presenter>,
    scores: Box<dyn ScoreStore>,
    clock: Arc<dyn Clock>,
    timing: TimingConfig,

    run: RunState,
    /// Mode to apply at the next `begin_run`
    hebrew_only_requested: bool,

    timers: Scheduler<TrainerTimer>,
    /// Pending settle or feedback timer for the current stage
    stage_timer: Option<TimerId>,
    events: VecDeque<RecognitionEvent>,

    last_summary: Option<RunSummary>,
}

impl TrainingStateMachine {
    /// Create a state machine, failing if the recogniser is unavailable
    ///
    /// An unavailable recogniser is reported through the presenter before
    /// the error is returned; no run state is created.
    pub fn new(
        words: WordList,
        recognizer: Box<dyn Recognizer>,
        collaborators: Collaborators,
        options: TrainerOptions,
    ) -> Result<Self, TrainerError> {
        let Collaborators {
            mut presenter,
            scores,
            diagnostics,
            clock,
        } = collaborators;

        if !recognizer.supported() {
            tracing::error!("Speech recognition is not supported, training cannot start");
            presenter.show_error(UNSUPPORTED_MESSAGE);
            return Err(TrainerError::RecognitionUnavailable(
                RecognitionError::Unsupported.to_string(),
            ));
        }

        let session = ListeningSession::new(
            recognizer,
            options.recognition,
            options.timing,
            diagnostics,
        );

        tracing::info!(
            "Trainer ready with {} words (Hebrew-only mode: {})",
            words.len(),
            options.hebrew_only_mode
        );

        Ok(Self {
            words,
            session,
            presenter,
            scores,
            clock,
            timing: options.timing,
            run: RunState {
                hebrew_only_mode: options.hebrew_only_mode,
                ..RunState::default()
            },
            hebrew_only_requested: options.hebrew_only_mode,
            timers: Scheduler::new(),
            stage_timer: None,
            events: VecDeque::new(),
            last_summary: None,
        })
    }

    pub fn stage(&self) -> Stage {
        self.run.current_stage
    }

    pub fn current_word_index(&self) -> usize {
        self.run.current_word_index
    }

    pub fn run_state(&self) -> &RunState {
        &self.run
    }

    pub fn words(&self) -> &WordList {
        &self.words
    }

    pub fn session(&self) -> &ListeningSession {
        &self.session
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    pub fn is_result_accepted(&self) -> bool {
        self.session.is_result_accepted()
    }

    /// Summary of the most recently completed run
    pub fn last_summary(&self) -> Option<&RunSummary> {
        self.last_summary.as_ref()
    }

    /// Best stored time, `None` if unset or unreadable
    pub fn best_score(&self) -> Option<u64> {
        self.scores.get_best_score().unwrap_or_else(|e| {
            tracing::error!("Failed to read best score: {}", e);
            None
        })
    }

    /// Choose Hebrew-only mode for the next run
    pub fn set_hebrew_only_mode(&mut self, enabled: bool) {
        self.hebrew_only_requested = enabled;
        tracing::info!(
            "Hebrew-only mode {} (applies at next run)",
            if enabled { "ON" } else { "OFF" }
        );
    }

    /// Start a fresh run at the first word
    pub fn begin_run(&mut self) {
        let now = self.clock.now_ms();

        self.session.stop();
        self.cancel_stage_timer();
        self.events.clear();
        self.last_summary = None;
        self.run = RunState {
            current_word_index: 0,
            current_stage: Stage::Start,
            start_time_ms: Some(now),
            hebrew_only_mode: self.hebrew_only_requested,
        };

        self.presenter.hide_error();
        self.presenter.clear();
        self.presenter.show_listening_indicator(false);

        tracing::info!(
            "Run started: {} words, Hebrew-only mode {}",
            self.words.len(),
            self.run.hebrew_only_mode
        );

        if self.words.is_empty() {
            tracing::warn!("Word list is empty, completing immediately");
            self.complete(now);
            return;
        }

        self.enter_hebrew_stage(0, now);
    }

    /// Abandon the current run and begin a new one
    pub fn restart(&mut self) {
        tracing::info!("Restarting run");
        self.begin_run();
    }

    /// Abandon the current run and return to the start stage
    pub fn exit(&mut self) {
        tracing::info!("Leaving run at stage {}", self.run.current_stage);
        self.session.stop();
        self.cancel_stage_timer();
        self.events.clear();
        self.run = RunState {
            hebrew_only_mode: self.hebrew_only_requested,
            ..RunState::default()
        };
        self.presenter.show_listening_indicator(false);
        self.presenter.clear();
    }

    /// Queue an event from the recogniser and process the queue
    pub fn handle_recognition_event(&mut self, event: RecognitionEvent) {
        self.enqueue_event(event);
        self.process_pending_events();
    }

    /// Queue an event without processing it
    pub fn enqueue_event(&mut self, event: RecognitionEvent) {
        self.events.push_back(event);
    }

    /// Apply queued recogniser events in arrival order
    pub fn process_pending_events(&mut self) {
        while let Some(event) = self.events.pop_front() {
            let now = self.clock.now_ms();
            let live = self.run.snapshot();
            let is_end = matches!(event, RecognitionEvent::End);

            let word = self.words.get(live.word_index).ok();
            let outcome = self.session.handle_event(event, live, word, now);

            if is_end {
                self.on_session_ended();
            }
            if let Some(outcome) = outcome {
                self.apply_outcome(outcome, now);
            }
        }
    }

    /// Earliest pending deadline across stage and session timers
    pub fn next_deadline(&self) -> Option<i64> {
        match (self.timers.next_deadline(), self.session.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Fire every timer due by the clock's current time
    ///
    /// Timers fire in deadline order; follow-up timers are scheduled relative
    /// to the deadline that caused them, so late ticks replay the same
    /// timeline.
    pub fn tick(&mut self) {
        let now = self.clock.now_ms();
        loop {
            let trainer_due = self.timers.next_deadline().filter(|d| *d <= now);
            let session_due = self.session.next_deadline().filter(|d| *d <= now);

            match (trainer_due, session_due) {
                (None, None) => break,
                (Some(t), Some(s)) if s < t => self.fire_session_timers(s),
                (None, Some(s)) => self.fire_session_timers(s),
                (Some(t), _) => self.fire_trainer_timer(t),
            }
        }
        self.process_pending_events();
    }

    /// Accept the expected answer for the live stage, as if spoken
    ///
    /// Returns whether the answer was accepted.
    pub fn simulate_correct_answer(&mut self) -> bool {
        let live = self.run.snapshot();
        if !live.stage.is_listening() {
            tracing::debug!("Nothing to answer in stage {}", live.stage);
            return false;
        }
        let Ok(word) = self.words.get(live.word_index) else {
            return false;
        };

        let answer = match live.stage {
            Stage::Hebrew => word.spoken_hebrew(),
            _ => word.spoken_english(),
        }
        .to_string();

        tracing::info!("Simulating answer {:?} for stage {}", answer, live.stage);
        let now = self.clock.now_ms();
        match self.session.submit_answer(live, &answer, word) {
            Some(SessionOutcome::Accepted(acceptance)) => {
                self.on_accept(acceptance, now);
                true
            }
            _ => false,
        }
    }

    fn fire_session_timers(&mut self, at: i64) {
        let live = self.run.snapshot();
        if let Err(e) = self.session.fire_due(at, live) {
            self.fail(e);
        }
    }

    fn fire_trainer_timer(&mut self, at: i64) {
        let Some((id, timer)) = self.timers.pop_due(at) else {
            return;
        };
        if self.stage_timer == Some(id) {
            self.stage_timer = None;
        }

        let live = self.run.snapshot();
        match timer {
            TrainerTimer::StageSettled(snapshot) if snapshot == live => {
                tracing::debug!("Stage {} settled, starting recognition", live.stage);
                if let Err(e) = self.session.start(live, false, at) {
                    self.fail(e);
                }
            }
            TrainerTimer::FeedbackDone(snapshot) if snapshot == live => {
                self.advance_after_match(at);
            }
            other => {
                tracing::debug!("Dropping stale timer {:?} (live {:?})", other, live);
            }
        }
    }

    fn apply_outcome(&mut self, outcome: SessionOutcome, now: i64) {
        match outcome {
            SessionOutcome::ListeningStarted { stage, language } => {
                tracing::debug!("Listening for {} in {}", stage, language);
                self.presenter.show_listening_indicator(true);
                self.presenter.update_status(STATUS_LISTENING);
            }
            SessionOutcome::Accepted(acceptance) => self.on_accept(acceptance, now),
            SessionOutcome::Fatal(error) if !self.run.current_stage.is_listening() => {
                tracing::warn!(
                    "Ignoring recogniser failure in stage {}: {}",
                    self.run.current_stage,
                    error
                );
            }
            SessionOutcome::Fatal(error) => self.fail(error),
        }
    }

    fn on_session_ended(&mut self) {
        self.presenter.show_listening_indicator(false);

        let will_listen_again = self.stage_timer.is_some()
            || self.session.has_pending_start()
            || self.session.pending_restart().is_some();
        if self.run.current_stage.is_listening()
            && !will_listen_again
            && !self.session.is_result_accepted()
        {
            self.presenter.update_status(STATUS_NOT_LISTENING);
        }
    }

    fn on_accept(&mut self, acceptance: Acceptance, now: i64) {
        let live = self.run.snapshot();
        if acceptance.snapshot != live || !live.stage.is_listening() {
            tracing::warn!(
                "Ignoring acceptance for {:?}, live is {:?}",
                acceptance.snapshot,
                live
            );
            return;
        }

        tracing::info!(
            "Correct {} answer for word {}: {:?} matched {:?}",
            live.stage,
            live.word_index + 1,
            acceptance.transcript,
            acceptance.alternative
        );

        self.session.stop();
        self.presenter.show_listening_indicator(false);
        self.presenter.update_status(STATUS_NOT_LISTENING);
        self.presenter.show_match_feedback();
        self.schedule_stage_timer(
            TrainerTimer::FeedbackDone(live),
            self.timing.feedback_delay_ms,
            now,
        );
    }

    fn advance_after_match(&mut self, now: i64) {
        let index = self.run.current_word_index;
        match self.run.current_stage {
            Stage::Hebrew if self.run.hebrew_only_mode => self.next_word(now),
            Stage::Hebrew => self.enter_translation_stage(index, now),
            Stage::Translation => self.next_word(now),
            Stage::Start | Stage::Complete => {}
        }
    }

    fn enter_hebrew_stage(&mut self, index: usize, now: i64) {
        let he = match self.words.get(index) {
            Ok(word) => word.he.clone(),
            Err(e) => {
                tracing::error!("Cannot show word: {}", e);
                self.complete(now);
                return;
            }
        };

        self.session.stop();
        self.run.current_word_index = index;
        self.run.current_stage = Stage::Hebrew;
        self.session.reset_gate();

        tracing::info!(
            "Stage -> hebrew (word {}/{}: {})",
            index + 1,
            self.words.len(),
            he
        );

        self.presenter.show_word(&he);
        self.presenter
            .update_status(&format!("{}: {}", Stage::Hebrew.description(), he));
        self.schedule_stage_timer(
            TrainerTimer::StageSettled(self.run.snapshot()),
            self.timing.stage_settle_delay_ms,
            now,
        );
    }

    fn enter_translation_stage(&mut self, index: usize, now: i64) {
        self.session.stop();
        self.run.current_word_index = index;
        self.run.current_stage = Stage::Translation;
        self.session.reset_gate();

        tracing::info!("Stage -> translation (word {}/{})", index + 1, self.words.len());

        // The Hebrew word stays on screen; the meaning is never shown
        self.presenter.update_status(Stage::Translation.description());
        self.schedule_stage_timer(
            TrainerTimer::StageSettled(self.run.snapshot()),
            self.timing.stage_settle_delay_ms,
            now,
        );
    }

    fn next_word(&mut self, now: i64) {
        self.run.current_word_index += 1;
        if self.run.current_word_index >= self.words.len() {
            self.complete(now);
        } else {
            self.enter_hebrew_stage(self.run.current_word_index, now);
        }
    }

    fn complete(&mut self, now: i64) {
        self.run.current_stage = Stage::Complete;
        self.session.stop();
        self.cancel_stage_timer();
        self.presenter.show_listening_indicator(false);

        let elapsed = self
            .run
            .start_time_ms
            .map(|start| elapsed_seconds(start, now))
            .unwrap_or(0);

        let (is_new_best, best_seconds) = if self.words.is_empty() {
            (false, self.best_score())
        } else {
            self.update_best_score(elapsed)
        };

        let summary = RunSummary {
            elapsed_seconds: elapsed,
            is_new_best,
            best_seconds,
            word_count: self.words.len(),
            hebrew_only: self.run.hebrew_only_mode,
            completed_at: chrono::DateTime::from_timestamp_millis(now)
                .map(|at| at.to_rfc3339())
                .unwrap_or_default(),
        };

        if !self.words.is_empty() {
            if let Err(e) = self.scores.record_run(&summary) {
                tracing::error!("Failed to record run: {}", e);
            }
        }

        tracing::info!(
            "Run complete in {}s (new best: {}, best: {:?})",
            elapsed,
            is_new_best,
            best_seconds
        );

        self.presenter.show_word("");
        self.presenter.update_status(if is_new_best {
            STATUS_NEW_BEST
        } else {
            STATUS_COMPLETE
        });
        self.presenter
            .show_completion(elapsed, is_new_best, best_seconds);
        self.last_summary = Some(summary);
    }

    /// Compare `elapsed` with the stored best, persisting it if faster
    ///
    /// If the stored best can't be read the run is not counted as a new best
    /// and nothing is written.
    fn update_best_score(&mut self, elapsed: u64) -> (bool, Option<u64>) {
        let previous = match self.scores.get_best_score() {
            Ok(previous) => previous,
            Err(e) => {
                tracing::error!("Failed to read best score: {}", e);
                return (false, None);
            }
        };

        let is_new_best = previous.map_or(true, |best| elapsed < best);
        if !is_new_best {
            return (false, previous);
        }

        if let Err(e) = self.scores.set_best_score(elapsed) {
            tracing::error!("Failed to save best score: {}", e);
        }
        (true, Some(elapsed))
    }

    fn fail(&mut self, error: RecognitionError) {
        tracing::error!("Stopping run: {}", error);
        self.session.stop();
        self.cancel_stage_timer();
        self.run.current_stage = Stage::Start;
        self.presenter.show_listening_indicator(false);

        let message = match &error {
            RecognitionError::Unsupported => UNSUPPORTED_MESSAGE.to_string(),
            RecognitionError::PermissionDenied(_) => PERMISSION_MESSAGE.to_string(),
            other => other.to_string(),
        };
        self.presenter.show_error(&message);
    }

    fn schedule_stage_timer(&mut self, timer: TrainerTimer, delay_ms: u64, now: i64) {
        self.cancel_stage_timer();
        self.stage_timer = Some(self.timers.schedule(now, delay_ms, timer));
    }

    fn cancel_stage_timer(&mut self) {
        if let Some(id) = self.stage_timer.take() {
            self.timers.cancel(id);
        }
    }
}
