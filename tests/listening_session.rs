//! Listening session integration tests.
//!
//! Exercises `ListeningSession` on its own through the public API: start
//! and stop sequencing, the acceptance gate and restart gating.

use std::sync::Arc;

use hebrew_trainer::config::{RecognitionConfig, TimingConfig};
use hebrew_trainer::diagnostics::{DiagnosticEvent, MemoryDiagnostics};
use hebrew_trainer::recognition::{
    Hypothesis, HypothesisSet, ListeningSession, MockHandle, MockRecognizer, RecognitionErrorCode,
    RecognitionEvent, RecognizerCall, RestartCause, ResultBatch, SessionOutcome, SessionState,
};
use hebrew_trainer::trainer::{Stage, StageSnapshot};
use hebrew_trainer::words::WordList;

const HEBREW: StageSnapshot = StageSnapshot {
    stage: Stage::Hebrew,
    word_index: 1,
};
const TRANSLATION: StageSnapshot = StageSnapshot {
    stage: Stage::Translation,
    word_index: 1,
};

fn new_session(timing: TimingConfig) -> (ListeningSession, MockHandle, Arc<MemoryDiagnostics>) {
    let (recognizer, handle) = MockRecognizer::new();
    let diagnostics = Arc::new(MemoryDiagnostics::new());
    let session = ListeningSession::new(
        Box::new(recognizer),
        RecognitionConfig::default(),
        timing,
        diagnostics.clone(),
    );
    (session, handle, diagnostics)
}

fn bought() -> hebrew_trainer::words::WordEntry {
    WordList::builtin().get(1).unwrap().clone()
}

fn result(set: HypothesisSet) -> RecognitionEvent {
    RecognitionEvent::Result(ResultBatch::single(set))
}

#[test]
fn test_stop_is_idempotent_in_every_state() {
    let (mut session, handle, _) = new_session(TimingConfig::default());
    let word = bought();

    session.stop();
    assert!(handle.calls().is_empty());

    session.start(HEBREW, true, 0).unwrap();
    session.stop();
    session.stop();
    assert_eq!(handle.stop_count(), 1);
    assert_eq!(session.state(), SessionState::Stopping);

    session.handle_event(RecognitionEvent::End, HEBREW, Some(&word), 0);
    session.stop();
    assert_eq!(session.state(), SessionState::Idle);
    assert!(!session.allow_auto_restart());
    assert_eq!(handle.stop_count(), 1);
}

#[test]
fn test_restart_after_stop_needs_new_start() {
    let (mut session, handle, _) = new_session(TimingConfig::default());
    let word = bought();

    session.start(HEBREW, true, 0).unwrap();
    session.handle_event(RecognitionEvent::Start, HEBREW, Some(&word), 0);
    session.stop();
    session.handle_event(RecognitionEvent::End, HEBREW, Some(&word), 10);
    session.fire_due(10_000, HEBREW).unwrap();
    assert_eq!(handle.start_count(), 1);

    session.start(HEBREW, true, 10_000).unwrap();
    assert_eq!(handle.start_count(), 2);
    assert!(session.allow_auto_restart());
}

#[test]
fn test_only_first_matching_hypothesis_is_accepted() {
    let (mut session, _, diagnostics) = new_session(TimingConfig::default());
    let word = bought();
    session.start(TRANSLATION, true, 0).unwrap();
    session.handle_event(RecognitionEvent::Start, TRANSLATION, Some(&word), 0);

    let mut accepted = 0;
    for event in [
        result(HypothesisSet::interim("I")),
        result(HypothesisSet::interim("I bought")),
        result(HypothesisSet::interim("I bought bread")),
        result(HypothesisSet::final_result("I bought bread", 0.92)),
    ] {
        if let Some(SessionOutcome::Accepted(_)) =
            session.handle_event(event, TRANSLATION, Some(&word), 0)
        {
            accepted += 1;
        }
    }

    assert_eq!(accepted, 1);
    assert_eq!(
        diagnostics.count(|e| matches!(e, DiagnosticEvent::Accepted { is_final: false, .. })),
        1
    );
}

#[test]
fn test_final_with_several_segments_uses_latest() {
    let (mut session, _, _) = new_session(TimingConfig::default());
    let word = bought();
    session.start(TRANSLATION, true, 0).unwrap();
    session.handle_event(RecognitionEvent::Start, TRANSLATION, Some(&word), 0);

    let batch = ResultBatch {
        results: vec![
            HypothesisSet::final_result("bought", 0.9),
            HypothesisSet {
                is_final: true,
                alternatives: vec![
                    Hypothesis::new("hello there", Some(0.7)),
                    Hypothesis::new("hello bot", Some(0.2)),
                ],
            },
        ],
    };
    let outcome = session.handle_event(RecognitionEvent::Result(batch), TRANSLATION, Some(&word), 0);

    match outcome {
        Some(SessionOutcome::Accepted(acceptance)) => {
            assert_eq!(acceptance.transcript, "hello bot");
            assert_eq!(acceptance.alternative, "bot");
        }
        other => panic!("expected acceptance, got {:?}", other),
    }
}

#[test]
fn test_result_before_stream_start_is_stale() {
    let (mut session, _, diagnostics) = new_session(TimingConfig::default());
    let word = bought();
    session.start(HEBREW, true, 0).unwrap();

    let outcome = session.handle_event(
        result(HypothesisSet::final_result("קנה", 0.9)),
        HEBREW,
        Some(&word),
        0,
    );
    assert_eq!(outcome, None);
    assert_eq!(
        diagnostics.count(|e| matches!(
            e,
            DiagnosticEvent::StaleResult {
                listening_stage: None,
                ..
            }
        )),
        1
    );
}

#[test]
fn test_custom_timings_are_respected() {
    let timing = TimingConfig {
        start_delay_ms: 10,
        restart_delay_ms: 20,
        error_restart_delay_ms: 30,
        ..TimingConfig::default()
    };
    let (mut session, handle, _) = new_session(timing);
    let word = bought();

    session.start(HEBREW, false, 0).unwrap();
    session.fire_due(10, HEBREW).unwrap();
    assert_eq!(handle.start_count(), 1);

    session.handle_event(RecognitionEvent::Start, HEBREW, Some(&word), 10);
    session.handle_event(RecognitionEvent::End, HEBREW, Some(&word), 100);
    assert_eq!(session.next_deadline(), Some(120));

    session.fire_due(120, HEBREW).unwrap();
    session.handle_event(RecognitionEvent::Start, HEBREW, Some(&word), 120);
    session.handle_event(
        RecognitionEvent::Error(RecognitionErrorCode::parse("language-not-supported")),
        HEBREW,
        Some(&word),
        200,
    );
    assert_eq!(session.pending_restart(), Some(RestartCause::StreamError));
    assert_eq!(session.next_deadline(), Some(230));
}

#[test]
fn test_language_follows_stage() {
    let (mut session, handle, _) = new_session(TimingConfig::default());
    let word = bought();

    session.start(HEBREW, true, 0).unwrap();
    session.handle_event(RecognitionEvent::Start, HEBREW, Some(&word), 0);
    assert_eq!(session.listening_lang(), Some("he-IL"));

    session.start(TRANSLATION, false, 0).unwrap();
    session.handle_event(RecognitionEvent::End, TRANSLATION, Some(&word), 50);
    session.fire_due(100, TRANSLATION).unwrap();
    session.handle_event(RecognitionEvent::Start, TRANSLATION, Some(&word), 100);

    assert_eq!(session.listening_lang(), Some("en-US"));
    assert_eq!(
        handle.calls(),
        vec![
            RecognizerCall::Configure("he-IL".into()),
            RecognizerCall::Start,
            RecognizerCall::Stop,
            RecognizerCall::Configure("en-US".into()),
            RecognizerCall::Start,
        ]
    );
}
