//! End-to-end relay tests: directory, processor, orchestrator, and
//! broadcast wired together with scripted recognizer events and noop
//! translation/synthesis backends.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use babelcast_config::Settings;
use babelcast_core::{
    AsrEvent, FinalResult, LanguageTag, PartialResult, ServerFrame, SessionTunables,
};
use babelcast_server::{AppState, ScriptedTranscriptionEngine};

fn test_state() -> (AppState, Arc<ScriptedTranscriptionEngine>) {
    let mut settings = Settings::default();
    settings.upstream.provider = "noop".into();
    let engine = Arc::new(ScriptedTranscriptionEngine::new());
    (AppState::with_engine(settings, engine.clone()), engine)
}

fn en() -> LanguageTag {
    LanguageTag::parse("en").unwrap()
}

fn es() -> LanguageTag {
    LanguageTag::parse("es").unwrap()
}

async fn speaker_session(state: &AppState) -> String {
    let speaker = "speaker-conn".to_string();
    state.directory.attach(&speaker, Instant::now());
    let session = state
        .directory
        .create_session(&speaker, en(), SessionTunables::default())
        .unwrap();
    state.start_session_runtime(&session).await.unwrap();
    session.session_id.clone()
}

fn partial(session: &str, id: &str, text: &str, stability: f32, origin: u64) -> AsrEvent {
    AsrEvent::Partial(PartialResult {
        result_id: id.into(),
        text: text.into(),
        stability: Some(stability),
        origin_timestamp_ms: origin,
        session_id: session.into(),
        source_language: en(),
    })
}

fn final_result(session: &str, id: &str, text: &str, origin: u64) -> AsrEvent {
    AsrEvent::Final(FinalResult {
        result_id: id.into(),
        text: text.into(),
        origin_timestamp_ms: origin,
        session_id: session.into(),
        source_language: en(),
        replaces: Vec::new(),
    })
}

/// Listener registered with a live frame channel.
fn join_listener(
    state: &AppState,
    session_id: &str,
    connection_id: &str,
) -> mpsc::Receiver<ServerFrame> {
    let connection_id = connection_id.to_string();
    let (tx, rx) = mpsc::channel(64);
    state.registry.register(connection_id.clone(), tx);
    state.directory.attach(&connection_id, Instant::now());
    state
        .directory
        .join_session(&connection_id, &session_id.to_string(), es())
        .unwrap();
    rx
}

#[tokio::test]
async fn basic_forward_reaches_listener_exactly_once() {
    let (state, engine) = test_state();
    let session_id = speaker_session(&state).await;
    let mut listener_rx = join_listener(&state, &session_id, "listener-1");

    let injector = engine.injector(&session_id).unwrap();
    injector
        .send(partial(&session_id, "p1", "Hello everyone, this is important", 0.72, 1_000))
        .await
        .unwrap();
    injector
        .send(partial(&session_id, "p2", "Hello everyone, this is important news.", 0.88, 1_400))
        .await
        .unwrap();
    injector
        .send(final_result(&session_id, "f1", "Hello everyone, this is important news.", 1_500))
        .await
        .unwrap();

    // Let the processor tick drain its rate-limit window and the fan-out
    // complete.
    tokio::time::sleep(Duration::from_millis(1_800)).await;

    let mut transcripts = 0;
    let mut audio_chunks = 0;
    while let Ok(frame) = listener_rx.try_recv() {
        match frame {
            ServerFrame::FinalTranscript { text, .. } => {
                assert_eq!(text, "Hello everyone, this is important news.");
                transcripts += 1;
            }
            ServerFrame::AudioChunk { .. } => audio_chunks += 1,
            _ => {}
        }
    }
    // The 0.88 partial and the final normalize to the same text: exactly
    // one forward reaches the listener.
    assert_eq!(transcripts, 1, "duplicate suppressed");
    assert_eq!(audio_chunks, 1);

    let session = state.directory.session(&session_id).unwrap();
    assert_eq!(session.listener_count(), 1);
}

#[tokio::test]
async fn stale_listener_is_reaped_without_negative_count() {
    let (state, engine) = test_state();
    let session_id = speaker_session(&state).await;

    // Listener joins but never registers a frame channel: the transport is
    // already gone.
    let ghost = "ghost-listener".to_string();
    state.directory.attach(&ghost, Instant::now());
    state
        .directory
        .join_session(&ghost, &session_id, es())
        .unwrap();
    let session = state.directory.session(&session_id).unwrap();
    assert_eq!(session.listener_count(), 1);

    let injector = engine.injector(&session_id).unwrap();
    injector
        .send(final_result(&session_id, "f1", "Anyone listening?", 500))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(500)).await;

    // The broadcaster observed the gone connection and the directory
    // settled the count at zero.
    assert_eq!(session.listener_count(), 0);
    assert!(state.directory.connection(&ghost).is_none());
}

#[tokio::test]
async fn speaker_disconnect_notifies_listeners_and_stops_runtime() {
    let (state, engine) = test_state();
    let session_id = speaker_session(&state).await;
    let mut listener_rx = join_listener(&state, &session_id, "listener-1");

    assert!(engine.injector(&session_id).is_some());
    state.handle_disconnect(&"speaker-conn".to_string()).await;

    let frame = tokio::time::timeout(Duration::from_secs(1), listener_rx.recv())
        .await
        .expect("listener should be notified")
        .expect("channel open");
    assert!(matches!(frame, ServerFrame::SessionEnded { .. }));

    assert!(state.directory.session(&session_id).is_none());
    assert!(!state.runtimes.contains_key(&session_id));
}

#[tokio::test]
async fn paused_broadcast_suppresses_fanout_until_resume() {
    let (state, engine) = test_state();
    let session_id = speaker_session(&state).await;
    let mut listener_rx = join_listener(&state, &session_id, "listener-1");

    state
        .directory
        .update_control(&session_id, babelcast_core::BroadcastAction::Pause, None)
        .unwrap();

    let injector = engine.injector(&session_id).unwrap();
    injector
        .send(final_result(&session_id, "f1", "You cannot hear this.", 100))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(listener_rx.try_recv().is_err(), "paused session must not forward");

    state
        .directory
        .update_control(&session_id, babelcast_core::BroadcastAction::Resume, None)
        .unwrap();
    injector
        .send(final_result(&session_id, "f2", "Now you can.", 6_000))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;

    let got_final = std::iter::from_fn(|| listener_rx.try_recv().ok())
        .any(|frame| matches!(frame, ServerFrame::FinalTranscript { .. }));
    assert!(got_final);
}

#[tokio::test]
async fn listener_rejoin_round_trips_count() {
    let (state, _engine) = test_state();
    let session_id = speaker_session(&state).await;

    let session = state.directory.session(&session_id).unwrap();
    let before = session.listener_count();

    let _rx = join_listener(&state, &session_id, "listener-1");
    assert_eq!(session.listener_count(), before + 1);

    state.handle_disconnect(&"listener-1".to_string()).await;
    assert_eq!(session.listener_count(), before);
}
