//! Recognition diagnostics
//!
//! Best-effort record of what the recogniser heard and why it was or wasn't
//! acted on. Sinks must never fail or block the state machine.

use parking_lot::Mutex;
use serde::Serialize;

use crate::recognition::ErrorClass;
use crate::trainer::Stage;

/// A single diagnostic observation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiagnosticEvent {
    /// A non-empty hypothesis arrived
    Heard {
        stage: Stage,
        transcript: String,
        confidence: Option<f32>,
        is_final: bool,
        alternatives: Vec<String>,
    },
    /// Result belonged to a stage or word the trainer has moved past
    StaleResult {
        listening_stage: Option<Stage>,
        current_stage: Stage,
        transcript: String,
    },
    /// Hebrew script heard while English was expected
    ForeignScript { transcript: String },
    /// Final result that matched nothing
    NoMatch {
        stage: Stage,
        transcript: String,
        expected: Vec<String>,
    },
    /// Result accepted as the answer for the current stage
    Accepted {
        stage: Stage,
        transcript: String,
        alternative: String,
        is_final: bool,
    },
    /// Final result arriving after an interim result was already accepted
    DuplicateIgnored { stage: Stage, transcript: String },
    /// Stream ended without an accepted result
    SessionEndedWithoutMatch {
        stage: Stage,
        result_count: u32,
        last_heard: String,
        confidence: Option<f32>,
        expected: Vec<String>,
    },
    /// Recogniser reported silence
    NoSpeech { stage: Stage, expected: Vec<String> },
    /// Any error code reported by the stream
    StreamError { code: String, class: ErrorClass },
}

/// Receiver for diagnostic events
pub trait DiagnosticsSink: Send + Sync {
    fn record(&self, event: DiagnosticEvent);
}

/// Renders diagnostics through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl DiagnosticsSink for TracingDiagnostics {
    fn record(&self, event: DiagnosticEvent) {
        match &event {
            DiagnosticEvent::Heard {
                stage,
                transcript,
                confidence,
                is_final,
                ..
            } => tracing::debug!(
                "Heard ({}): {:?} confidence={:?} final={}",
                stage,
                transcript,
                confidence,
                is_final
            ),
            DiagnosticEvent::StaleResult {
                listening_stage,
                current_stage,
                transcript,
            } => tracing::debug!(
                "Stale result ignored: {:?} (listening {:?}, now {})",
                transcript,
                listening_stage,
                current_stage
            ),
            DiagnosticEvent::ForeignScript { transcript } => {
                tracing::debug!("Hebrew script during English stage ignored: {:?}", transcript)
            }
            DiagnosticEvent::NoMatch {
                stage,
                transcript,
                expected,
            } => tracing::info!(
                "No match ({}): heard {:?}, expected one of {:?}",
                stage,
                transcript,
                expected
            ),
            DiagnosticEvent::Accepted {
                stage,
                transcript,
                alternative,
                is_final,
            } => tracing::info!(
                "Accepted ({}): {:?} matched {:?} ({})",
                stage,
                transcript,
                alternative,
                if *is_final { "final" } else { "fast-pass" }
            ),
            DiagnosticEvent::DuplicateIgnored { stage, transcript } => tracing::debug!(
                "Final result after fast-pass ignored ({}): {:?}",
                stage,
                transcript
            ),
            DiagnosticEvent::SessionEndedWithoutMatch {
                stage,
                result_count,
                last_heard,
                confidence,
                expected,
            } => tracing::warn!(
                "Session ended without accepted match ({}, {} results): last heard {:?} confidence={:?}, expected {:?}",
                stage,
                result_count,
                last_heard,
                confidence,
                expected
            ),
            DiagnosticEvent::NoSpeech { stage, expected } => tracing::info!(
                "No speech detected ({}), expected one of {:?}",
                stage,
                expected
            ),
            DiagnosticEvent::StreamError { code, class } => {
                tracing::debug!("Recognition error {:?} classified {:?}", code, class)
            }
        }
    }
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct MemoryDiagnostics {
    events: Mutex<Vec<DiagnosticEvent>>,
}

impl MemoryDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.events.lock().clone()
    }

    /// Count events satisfying `predicate`
    pub fn count(&self, predicate: impl Fn(&DiagnosticEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| predicate(e)).count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl DiagnosticsSink for MemoryDiagnostics {
    fn record(&self, event: DiagnosticEvent) {
        self.events.lock().push(event);
    }
}
