//! Mock recogniser for driving the trainer without a microphone.
//!
//! Records every call the session makes so tests can assert on start/stop
//! counts and the language that was configured. Events are injected by the
//! test itself through `TrainingStateMachine::handle_recognition_event`.

use parking_lot::Mutex;
use std::sync::Arc;

use super::{RecognitionError, RecognitionSettings, Recognizer};

/// A call made against the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognizerCall {
    Configure(String),
    Start,
    Stop,
}

#[derive(Debug, Default)]
struct MockState {
    calls: Vec<RecognizerCall>,
    language: Option<String>,
    fail_next_start: Option<RecognitionError>,
    fail_every_start: Option<RecognitionError>,
    failed_starts: usize,
}

/// Shared view onto a [`MockRecognizer`]'s recorded calls
#[derive(Debug, Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockHandle {
    pub fn calls(&self) -> Vec<RecognizerCall> {
        self.state.lock().calls.clone()
    }

    pub fn start_count(&self) -> usize {
        self.count(&RecognizerCall::Start)
    }

    pub fn stop_count(&self) -> usize {
        self.count(&RecognizerCall::Stop)
    }

    /// Language from the most recent `configure` call
    pub fn language(&self) -> Option<String> {
        self.state.lock().language.clone()
    }

    /// Make the next `start()` fail with `error`
    pub fn fail_next_start(&self, error: RecognitionError) {
        self.state.lock().fail_next_start = Some(error);
    }

    /// Make every `start()` fail with `error` until cleared with `None`
    pub fn fail_every_start(&self, error: Option<RecognitionError>) {
        self.state.lock().fail_every_start = error;
    }

    /// Number of `start()` calls that returned an error
    pub fn failed_start_count(&self) -> usize {
        self.state.lock().failed_starts
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    fn count(&self, call: &RecognizerCall) -> usize {
        self.state.lock().calls.iter().filter(|c| *c == call).count()
    }
}

/// In-memory [`Recognizer`]
pub struct MockRecognizer {
    supported: bool,
    state: Arc<Mutex<MockState>>,
}

impl MockRecognizer {
    pub fn new() -> (Self, MockHandle) {
        Self::with_support(true)
    }

    /// A recogniser that reports the capability as absent
    pub fn unsupported() -> (Self, MockHandle) {
        Self::with_support(false)
    }

    fn with_support(supported: bool) -> (Self, MockHandle) {
        let state = Arc::new(Mutex::new(MockState::default()));
        let handle = MockHandle {
            state: state.clone(),
        };
        (Self { supported, state }, handle)
    }
}

impl Recognizer for MockRecognizer {
    fn supported(&self) -> bool {
        self.supported
    }

    fn configure(&mut self, settings: &RecognitionSettings) -> Result<(), RecognitionError> {
        let mut state = self.state.lock();
        state
            .calls
            .push(RecognizerCall::Configure(settings.language.clone()));
        state.language = Some(settings.language.clone());
        Ok(())
    }

    fn start(&mut self) -> Result<(), RecognitionError> {
        let mut state = self.state.lock();
        if let Some(error) = state
            .fail_next_start
            .take()
            .or_else(|| state.fail_every_start.clone())
        {
            state.failed_starts += 1;
            return Err(error);
        }
        state.calls.push(RecognizerCall::Start);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), RecognitionError> {
        self.state.lock().calls.push(RecognizerCall::Stop);
        Ok(())
    }
}
