//! Session loop integration tests
//!
//! Drives the loop with scripted audio, transcripts, and completions

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use sovra::{Acknowledgements, Error, Pace, SessionState};

mod common;

use common::{
    FakeCompleter, Harness, ScriptedSource, ScriptedTranscriber, fast_session_config, settle,
};

const ANSWER: &str = "A UTXO is an unspent transaction output.";

#[test]
fn test_unaddressed_speech_is_ignored() {
    let mut h = Harness::with_answer(ANSWER, 3);

    let pace = tokio_test::block_on(h.session.handle_transcript("hello there"));

    assert_eq!(pace, Pace::Short);
    assert_eq!(h.session.state(), SessionState::new(true));
    assert!(h.completer.prompts().is_empty());
    assert!(!h.session.speaker().is_busy());
    assert!(h.log.spoken().is_empty());
}

#[tokio::test]
async fn test_question_is_answered_aloud() {
    let mut h = Harness::with_answer(ANSWER, 3);

    let pace = h.session.handle_transcript("Sovra, what is a UTXO?").await;

    assert_eq!(pace, Pace::Cooldown);
    assert_eq!(h.completer.prompts(), vec!["what is a UTXO?"]);
    settle(h.session.speaker()).await;
    assert_eq!(h.log.spoken(), vec![ANSWER]);
}

#[tokio::test]
async fn test_bare_wake_word_does_nothing() {
    let mut h = Harness::with_answer(ANSWER, 3);

    let pace = h.session.handle_transcript("Sovra?").await;

    assert_eq!(pace, Pace::Short);
    assert!(h.completer.prompts().is_empty());
    assert!(h.log.spoken().is_empty());
}

#[tokio::test]
async fn test_pause_then_questions_are_ignored() {
    let mut h = Harness::with_answer(ANSWER, 2);

    let pace = h.session.handle_transcript("Sovra pause.").await;
    assert_eq!(pace, Pace::Cooldown);
    assert!(!h.session.state().enabled);
    settle(h.session.speaker()).await;

    let pace = h.session.handle_transcript("sovra what is bitcoin").await;
    assert_eq!(pace, Pace::Short);
    assert!(h.completer.prompts().is_empty());
    assert_eq!(h.log.spoken(), vec![Acknowledgements::default().paused]);
}

#[tokio::test]
async fn test_turn_on_from_paused() {
    let mut config = fast_session_config();
    config.start_enabled = false;
    let mut h = Harness::new(
        ScriptedSource::silent(),
        ScriptedTranscriber::default(),
        FakeCompleter::answering(ANSWER),
        2,
        config,
    );
    assert!(!h.session.state().enabled);

    let pace = h.session.handle_transcript("Sovra turn on.").await;

    assert_eq!(pace, Pace::Cooldown);
    assert!(h.session.state().enabled);
    settle(h.session.speaker()).await;
    assert_eq!(h.log.spoken(), vec![Acknowledgements::default().turned_on]);
}

#[tokio::test]
async fn test_turn_on_when_already_on() {
    let mut h = Harness::with_answer(ANSWER, 2);

    let pace = h.session.handle_transcript("sovra turn on").await;

    assert_eq!(pace, Pace::Cooldown);
    assert!(h.session.state().enabled);
    settle(h.session.speaker()).await;
    assert_eq!(h.log.spoken(), vec![Acknowledgements::default().already_on]);
}

#[tokio::test]
async fn test_completion_failure_is_silent() {
    let mut h = Harness::new(
        ScriptedSource::silent(),
        ScriptedTranscriber::default(),
        FakeCompleter::failing(),
        3,
        fast_session_config(),
    );

    let pace = h.session.handle_transcript("sovra what is a mempool").await;

    assert_eq!(pace, Pace::Short);
    assert_eq!(h.completer.prompts(), vec!["what is a mempool"]);
    assert!(h.session.state().enabled);
    assert!(!h.session.speaker().is_busy());
    assert!(h.log.spoken().is_empty());
}

#[tokio::test]
async fn test_stop_interrupts_answer() {
    let mut h = Harness::with_answer(ANSWER, 1000);

    h.session.handle_transcript("sovra what is a UTXO").await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(h.session.speaker().is_busy());

    let pace = h.session.handle_transcript("Sovra, stop!").await;

    assert_eq!(pace, Pace::Short);
    assert!(!h.session.speaker().is_busy());
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(h.log.cancelled(), 1);
    assert_eq!(h.log.active(), 0);
    assert!(h.session.state().enabled);
}

#[tokio::test]
async fn test_stop_when_silent_is_harmless() {
    let mut h = Harness::with_answer(ANSWER, 3);

    let pace = h.session.handle_transcript("sovra stop").await;

    assert_eq!(pace, Pace::Short);
    assert!(h.session.state().enabled);
    assert!(h.log.spoken().is_empty());
}

#[tokio::test]
async fn test_own_voice_is_not_obeyed_while_speaking() {
    let mut h = Harness::with_answer(ANSWER, 1000);

    h.session.handle_transcript("sovra what is a UTXO").await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    // The microphone hears trigger-like phrases while the answer plays
    assert_eq!(h.session.handle_transcript("sovra pause").await, Pace::Short);
    assert_eq!(
        h.session.handle_transcript("sovra what is a block").await,
        Pace::Short
    );

    assert!(h.session.state().enabled);
    assert_eq!(h.completer.prompts().len(), 1);
    assert!(h.session.speaker().is_busy());
    assert_eq!(h.log.cancelled(), 0);

    h.session.speaker().shutdown().await;
}

#[tokio::test]
async fn test_commands_while_speaking_without_suppression() {
    let mut config = fast_session_config();
    config.suppress_while_speaking = false;
    let mut h = Harness::new(
        ScriptedSource::silent(),
        ScriptedTranscriber::default(),
        FakeCompleter::answering(ANSWER),
        1000,
        config,
    );

    h.session.handle_transcript("sovra what is a UTXO").await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    let pace = h.session.handle_transcript("sovra pause").await;
    assert_eq!(pace, Pace::Cooldown);
    assert!(!h.session.state().enabled);

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(
        h.log.spoken(),
        vec![ANSWER.to_string(), Acknowledgements::default().paused]
    );
    assert_eq!(h.log.cancelled(), 1);
    assert_eq!(h.log.max_active(), 1);

    h.session.speaker().shutdown().await;
}

#[tokio::test]
async fn test_cycle_transcribes_and_answers() {
    let mut h = Harness::new(
        ScriptedSource::silent(),
        ScriptedTranscriber::hearing(&["Sovra, what is a UTXO?"]),
        FakeCompleter::answering(ANSWER),
        2,
        fast_session_config(),
    );

    assert_eq!(h.session.run_cycle().await, Pace::Cooldown);
    assert_eq!(h.completer.prompts(), vec!["what is a UTXO?"]);

    // Nothing more is heard
    settle(h.session.speaker()).await;
    assert_eq!(h.session.run_cycle().await, Pace::Short);
    assert_eq!(h.log.spoken(), vec![ANSWER]);
}

#[tokio::test]
async fn test_device_error_backs_off() {
    let mut h = Harness::new(
        ScriptedSource::new(vec![Err(Error::Audio("device unplugged".to_string()))]),
        ScriptedTranscriber::default(),
        FakeCompleter::answering(ANSWER),
        2,
        fast_session_config(),
    );

    assert_eq!(h.session.run_cycle().await, Pace::Backoff);
    // Capture recovers on the next cycle
    assert_eq!(h.session.run_cycle().await, Pace::Short);
}

#[tokio::test]
async fn test_transcription_error_is_treated_as_silence() {
    let mut h = Harness::new(
        ScriptedSource::silent(),
        ScriptedTranscriber::new(vec![Err(Error::Stt("503 from backend".to_string()))]),
        FakeCompleter::answering(ANSWER),
        2,
        fast_session_config(),
    );

    assert_eq!(h.session.run_cycle().await, Pace::Short);
    assert!(h.completer.prompts().is_empty());
    assert!(h.log.spoken().is_empty());
}

#[test]
fn test_pace_delays_follow_config() {
    let config = fast_session_config();

    assert_eq!(Pace::Short.delay(&config), config.pacing);
    assert_eq!(Pace::Cooldown.delay(&config), config.cooldown);
    assert_eq!(Pace::Backoff.delay(&config), config.backoff);
}

#[tokio::test]
async fn test_shutdown_stops_loop_and_speech() {
    let Harness {
        session,
        completer,
        log,
    } = Harness::new(
        ScriptedSource::silent(),
        ScriptedTranscriber::hearing(&["sovra explain mining"]),
        FakeCompleter::answering("Mining secures the chain."),
        1000,
        fast_session_config(),
    );

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let result = tokio::time::timeout(Duration::from_secs(2), session.run(shutdown))
        .await
        .expect("loop should stop on shutdown");

    assert!(result.is_ok());
    assert_eq!(completer.prompts(), vec!["explain mining"]);
    assert_eq!(log.spoken(), vec!["Mining secures the chain."]);
    assert_eq!(log.active(), 0);
    assert_eq!(log.cancelled(), 1);
}
