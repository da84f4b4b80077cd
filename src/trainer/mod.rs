//! Training run
//!
//! Walks the word list one word at a time. Each word is read aloud in
//! Hebrew, then its English meaning is spoken, unless Hebrew-only mode
//! skips the translation stage.
//!
//! ## Stages
//!
//! ```text
//! ┌───────┐ begin_run ┌────────┐  match  ┌─────────────┐
//! │ START │──────────►│ HEBREW │────────►│ TRANSLATION │
//! └───────┘           └────────┘         └─────────────┘
//!     ▲                ▲    │ match (Hebrew-only)  │ match
//!     │                │    ▼                      ▼
//!     │                └──── next word ◄───────────┘
//!     │ restart/exit            │ list exhausted
//!     │                         ▼
//!     │                   ┌──────────┐
//!     └───────────────────│ COMPLETE │
//!                         └──────────┘
//! ```
//!
//! Every wait (stage settle, match feedback, session start and restart) is a
//! timer tagged with the (stage, word) it was scheduled for and checked
//! against the live state when it fires. The owner drives time by calling
//! [`TrainingStateMachine::tick`] at or after
//! [`TrainingStateMachine::next_deadline`].

pub mod machine;
pub mod state;

pub use machine::{Collaborators, TrainerOptions, TrainingStateMachine};
pub use state::{
    elapsed_seconds, format_duration, RunState, RunSummary, Stage, StageSnapshot, TrainerTimer,
};
