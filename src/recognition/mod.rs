//! Speech recognition capability
//!
//! The trainer never does speech-to-text itself. It drives an external
//! continuous recogniser through the [`Recognizer`] trait and consumes the
//! [`RecognitionEvent`]s that recogniser emits asynchronously.
//!
//! ## Event flow
//!
//! ```text
//!   start() ──► Start ──► Result* ──► End
//!                  │                   ▲
//!                  └──── Error(code) ──┘
//! ```
//!
//! A stream may emit `Result` and `End` events after `stop()` was requested;
//! [`ListeningSession`] guards against those tails.

pub mod console;
pub mod mock;
pub mod session;

use serde::{Deserialize, Serialize};

pub use console::{ConsoleMicrophone, ConsoleRecognizer};
pub use mock::{MockHandle, MockRecognizer, RecognizerCall};
pub use session::{
    Acceptance, AcceptanceGate, ListeningSession, RestartCause, SessionOutcome, SessionState,
};

/// Errors raised by a recogniser or by the session driving it
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecognitionError {
    #[error("Speech recognition is not supported on this system")]
    Unsupported,

    #[error("Microphone access denied ({0})")]
    PermissionDenied(String),

    #[error("Failed to start recognition: {0}")]
    Start(String),

    #[error("Failed to stop recognition: {0}")]
    Stop(String),
}

impl RecognitionError {
    /// Whether this error must halt the run instead of being retried
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RecognitionError::Unsupported | RecognitionError::PermissionDenied(_)
        )
    }
}

/// Settings applied to the recogniser before each start
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognitionSettings {
    pub continuous: bool,
    pub interim_results: bool,
    pub max_alternatives: u32,
    /// BCP 47 language tag, e.g. `he-IL`
    pub language: String,
}

/// External continuous speech recogniser
///
/// Implementations deliver their events out of band (callback, channel);
/// the owner feeds them back via `TrainingStateMachine::handle_recognition_event`.
pub trait Recognizer: Send {
    /// Whether the capability exists at all on this system
    fn supported(&self) -> bool;

    fn configure(&mut self, settings: &RecognitionSettings) -> Result<(), RecognitionError>;

    fn start(&mut self) -> Result<(), RecognitionError>;

    /// Advisory stop; the stream may still emit trailing events
    fn stop(&mut self) -> Result<(), RecognitionError>;
}

/// One transcription hypothesis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hypothesis {
    pub transcript: String,
    pub confidence: Option<f32>,
}

impl Hypothesis {
    pub fn new(transcript: impl Into<String>, confidence: Option<f32>) -> Self {
        Self {
            transcript: transcript.into(),
            confidence,
        }
    }
}

/// Ranked alternatives for one utterance segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HypothesisSet {
    pub is_final: bool,
    pub alternatives: Vec<Hypothesis>,
}

impl HypothesisSet {
    pub fn interim(transcript: &str) -> Self {
        Self {
            is_final: false,
            alternatives: vec![Hypothesis::new(transcript, None)],
        }
    }

    pub fn final_result(transcript: &str, confidence: f32) -> Self {
        Self {
            is_final: true,
            alternatives: vec![Hypothesis::new(transcript, Some(confidence))],
        }
    }

    /// Top-ranked transcript, empty when the set has no alternatives
    pub fn primary(&self) -> &str {
        self.alternatives
            .first()
            .map(|h| h.transcript.as_str())
            .unwrap_or("")
    }

    pub fn primary_confidence(&self) -> Option<f32> {
        self.alternatives.first().and_then(|h| h.confidence)
    }
}

/// A result callback payload: every segment heard so far in this stream
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResultBatch {
    pub results: Vec<HypothesisSet>,
}

impl ResultBatch {
    pub fn single(set: HypothesisSet) -> Self {
        Self { results: vec![set] }
    }

    /// The segment currently being recognised
    pub fn latest(&self) -> Option<&HypothesisSet> {
        self.results.last()
    }
}

/// Error codes a recognition stream can report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecognitionErrorCode {
    NoSpeech,
    Aborted,
    NotAllowed,
    ServiceNotAllowed,
    AudioCapture,
    Network,
    Other(String),
}

/// How the session reacts to an error code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Logged only; the stream keeps going or is already ending
    Benign,
    /// Restarted after the error backoff
    Recoverable,
    /// Surfaced to the user, never retried
    Fatal,
}

impl RecognitionErrorCode {
    /// Parse a recogniser error string (`no-speech`, `not-allowed`, ...)
    pub fn parse(code: &str) -> Self {
        match code {
            "no-speech" => Self::NoSpeech,
            "aborted" => Self::Aborted,
            "not-allowed" => Self::NotAllowed,
            "service-not-allowed" => Self::ServiceNotAllowed,
            "audio-capture" => Self::AudioCapture,
            "network" => Self::Network,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::NoSpeech => "no-speech",
            Self::Aborted => "aborted",
            Self::NotAllowed => "not-allowed",
            Self::ServiceNotAllowed => "service-not-allowed",
            Self::AudioCapture => "audio-capture",
            Self::Network => "network",
            Self::Other(code) => code,
        }
    }

    pub fn classify(&self) -> ErrorClass {
        match self {
            Self::NoSpeech | Self::Aborted => ErrorClass::Benign,
            Self::NotAllowed | Self::ServiceNotAllowed => ErrorClass::Fatal,
            Self::AudioCapture | Self::Network | Self::Other(_) => ErrorClass::Recoverable,
        }
    }
}

/// Events emitted by a recognition stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum RecognitionEvent {
    Start,
    End,
    Error(RecognitionErrorCode),
    Result(ResultBatch),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_parse_roundtrip() {
        for code in [
            "no-speech",
            "aborted",
            "not-allowed",
            "service-not-allowed",
            "audio-capture",
            "network",
            "bad-grammar",
        ] {
            assert_eq!(RecognitionErrorCode::parse(code).as_str(), code);
        }
    }

    #[test]
    fn test_error_classification() {
        assert_eq!(RecognitionErrorCode::NoSpeech.classify(), ErrorClass::Benign);
        assert_eq!(RecognitionErrorCode::Aborted.classify(), ErrorClass::Benign);
        assert_eq!(RecognitionErrorCode::NotAllowed.classify(), ErrorClass::Fatal);
        assert_eq!(
            RecognitionErrorCode::ServiceNotAllowed.classify(),
            ErrorClass::Fatal
        );
        assert_eq!(RecognitionErrorCode::Network.classify(), ErrorClass::Recoverable);
        assert_eq!(
            RecognitionErrorCode::parse("language-not-supported").classify(),
            ErrorClass::Recoverable
        );
    }

    #[test]
    fn test_fatal_errors() {
        assert!(RecognitionError::Unsupported.is_fatal());
        assert!(RecognitionError::PermissionDenied("not-allowed".into()).is_fatal());
        assert!(!RecognitionError::Start("busy".into()).is_fatal());
    }

    #[test]
    fn test_primary_of_empty_set() {
        let set = HypothesisSet {
            is_final: true,
            alternatives: vec![],
        };
        assert_eq!(set.primary(), "");
        assert_eq!(set.primary_confidence(), None);
    }

    #[test]
    fn test_batch_latest_is_last_segment() {
        let batch = ResultBatch {
            results: vec![
                HypothesisSet::final_result("first", 0.9),
                HypothesisSet::interim("second"),
            ],
        };
        assert_eq!(batch.latest().unwrap().primary(), "second");
    }

    #[test]
    fn test_event_serialisation() {
        let event = RecognitionEvent::Error(RecognitionErrorCode::NoSpeech);
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"error","data":"no-speech"}"#);
    }
}
