//! Training run state
//!
//! Stages, the per-run state record and the timers the training state machine
//! schedules for itself.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stage of a training run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// No run in progress
    #[default]
    Start,
    /// Waiting for the Hebrew word to be read aloud
    Hebrew,
    /// Waiting for the English meaning
    Translation,
    /// Every word answered
    Complete,
}

impl Stage {
    /// Instruction shown to the user for this stage
    pub fn description(&self) -> &'static str {
        match self {
            Stage::Start => "Waiting to start",
            Stage::Hebrew => "Read the Hebrew word aloud",
            Stage::Translation => "Say the English meaning out loud",
            Stage::Complete => "Training complete",
        }
    }

    /// Whether the recogniser should be listening in this stage
    pub fn is_listening(&self) -> bool {
        matches!(self, Stage::Hebrew | Stage::Translation)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Start => "start",
            Stage::Hebrew => "hebrew",
            Stage::Translation => "translation",
            Stage::Complete => "complete",
        };
        f.write_str(name)
    }
}

/// The (stage, word) pair a piece of work was created for
///
/// Timers and listening sessions carry one of these and compare it against
/// the live snapshot before acting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StageSnapshot {
    pub stage: Stage,
    pub word_index: usize,
}

/// Mutable state of one training run
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunState {
    pub current_word_index: usize,
    pub current_stage: Stage,
    /// Epoch milliseconds when the run began
    pub start_time_ms: Option<i64>,
    pub hebrew_only_mode: bool,
}

impl RunState {
    pub fn snapshot(&self) -> StageSnapshot {
        StageSnapshot {
            stage: self.current_stage,
            word_index: self.current_word_index,
        }
    }
}

/// Outcome of a completed run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub elapsed_seconds: u64,
    pub is_new_best: bool,
    /// Best time after this run was taken into account
    pub best_seconds: Option<u64>,
    pub word_count: usize,
    pub hebrew_only: bool,
    /// RFC 3339 timestamp
    pub completed_at: String,
}

/// Timers owned by the training state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainerTimer {
    /// Stage display has settled; start listening
    StageSettled(StageSnapshot),
    /// Match celebration finished; move on
    FeedbackDone(StageSnapshot),
}

/// Format whole seconds as `42s` or `3m 5s`
pub fn format_duration(total_seconds: u64) -> String {
    let minutes = total_seconds / 60;
    let seconds = total_seconds % 60;
    if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Round a millisecond span to whole seconds, clamping negatives to zero
pub fn elapsed_seconds(start_ms: i64, end_ms: i64) -> u64 {
    let elapsed_ms = end_ms.saturating_sub(start_ms).max(0);
    (elapsed_ms as f64 / 1000.0).round() as u64
}
