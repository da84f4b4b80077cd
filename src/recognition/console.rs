//! Console-backed recogniser
//!
//! Stands in for a real speech engine in the terminal front-end: typed lines
//! become hypotheses. Lifecycle events are sent over a channel so they arrive
//! asynchronously, the same way a real engine's callbacks would.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

use super::{
    HypothesisSet, RecognitionError, RecognitionEvent, RecognitionSettings, Recognizer,
    ResultBatch,
};

/// Recogniser whose "audio" is whatever the user types
pub struct ConsoleRecognizer {
    events: UnboundedSender<RecognitionEvent>,
    running: Arc<AtomicBool>,
    language: String,
}

/// Input side of a [`ConsoleRecognizer`]
#[derive(Clone)]
pub struct ConsoleMicrophone {
    events: UnboundedSender<RecognitionEvent>,
    running: Arc<AtomicBool>,
}

impl ConsoleRecognizer {
    pub fn new(events: UnboundedSender<RecognitionEvent>) -> (Self, ConsoleMicrophone) {
        let running = Arc::new(AtomicBool::new(false));
        let microphone = ConsoleMicrophone {
            events: events.clone(),
            running: running.clone(),
        };
        (
            Self {
                events,
                running,
                language: String::new(),
            },
            microphone,
        )
    }

    fn send(&self, event: RecognitionEvent) -> Result<(), String> {
        self.events
            .send(event)
            .map_err(|_| "event channel closed".to_string())
    }
}

impl Recognizer for ConsoleRecognizer {
    fn supported(&self) -> bool {
        true
    }

    fn configure(&mut self, settings: &RecognitionSettings) -> Result<(), RecognitionError> {
        self.language = settings.language.clone();
        Ok(())
    }

    fn start(&mut self) -> Result<(), RecognitionError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(RecognitionError::Start("recognition already started".into()));
        }
        tracing::debug!("Console recogniser started ({})", self.language);
        self.send(RecognitionEvent::Start)
            .map_err(RecognitionError::Start)
    }

    fn stop(&mut self) -> Result<(), RecognitionError> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::debug!("Console recogniser stopped");
        self.send(RecognitionEvent::End).map_err(RecognitionError::Stop)
    }
}

impl ConsoleMicrophone {
    /// Deliver a typed line as a hypothesis
    ///
    /// Returns false when the recogniser isn't running, in which case the
    /// line was not heard.
    pub fn hear(&self, text: &str, is_final: bool) -> bool {
        if !self.running.load(Ordering::SeqCst) {
            return false;
        }
        let set = if is_final {
            HypothesisSet::final_result(text, 1.0)
        } else {
            HypothesisSet::interim(text)
        };
        self.events
            .send(RecognitionEvent::Result(ResultBatch::single(set)))
            .is_ok()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
