//! Top-level error type

use crate::config::ConfigError;
use crate::database::DatabaseError;
use crate::recognition::RecognitionError;
use crate::words::WordListError;

/// Any error the trainer can surface to its caller
#[derive(Debug, thiserror::Error)]
pub enum TrainerError {
    #[error("Speech recognition is not available: {0}")]
    RecognitionUnavailable(String),

    #[error(transparent)]
    Recognition(#[from] RecognitionError),

    #[error(transparent)]
    WordList(#[from] WordListError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
