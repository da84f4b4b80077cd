//! Speech-driven Hebrew vocabulary trainer
//!
//! A run walks a [`words::WordList`]: each word is read aloud in Hebrew and
//! then translated aloud into English. Answers come from an external
//! continuous speech recogniser driven through [`recognition::Recognizer`];
//! [`trainer::TrainingStateMachine`] decides when to listen, what counts as a
//! match and when the run is over.

pub mod config;
pub mod database;
pub mod diagnostics;
pub mod error;
pub mod logging;
pub mod matching;
pub mod presentation;
pub mod recognition;
pub mod scheduler;
pub mod trainer;
pub mod words;

pub use error::TrainerError;
pub use trainer::{Collaborators, Stage, TrainerOptions, TrainingStateMachine};
pub use words::{WordEntry, WordList};
