//! WebSocket ingress dispatcher
//!
//! One socket per client. Inbound frames are tagged on `action`; the
//! dispatcher validates frame size, role authority, and audio rate before
//! routing. Errors go back as in-band error frames and never tear down the
//! connection. Outbound frames flow through a per-connection channel
//! drained by a writer task, which is also the path the broadcaster uses.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures::{SinkExt, StreamExt};
use std::sync::atomic::Ordering;
use std::time::Instant;
use tokio::sync::mpsc;

use babelcast_core::{
    AudioFrame, BroadcastAction, ClientFrame, ConnectionId, Error, ErrorCode, LanguageTag,
    ServerFrame, SessionId, SessionTunables, MAX_AUDIO_FRAME_BYTES, MAX_CONTROL_FRAME_BYTES,
};

use crate::directory::Role;
use crate::state::AppState;

/// Handle a WebSocket upgrade at the ingress path.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id: ConnectionId = uuid::Uuid::new_v4().to_string();
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let (tx, mut rx) = mpsc::channel::<ServerFrame>(256);
    state.registry.register(connection_id.clone(), tx.clone());
    state.directory.attach(&connection_id, Instant::now());
    metrics::counter!("connections_accepted_total").increment(1);
    tracing::debug!(connection_id = %connection_id, "connection attached");

    let writer_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let json = match serde_json::to_string(&frame) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!(error = %e, "failed to serialize outbound frame");
                    continue;
                }
            };
            if ws_sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = ws_receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                state.directory.touch(&connection_id, Instant::now());
                if let Some(reply) = dispatch_text(&state, &connection_id, &text).await {
                    let _ = tx.send(reply).await;
                }
            }
            Ok(Message::Binary(data)) => {
                state.directory.touch(&connection_id, Instant::now());
                if let Some(reply) = dispatch_binary(&state, &connection_id, data).await {
                    let _ = tx.send(reply).await;
                }
            }
            Ok(Message::Close(_)) => break,
            Err(e) => {
                tracing::debug!(connection_id = %connection_id, error = %e, "websocket error");
                break;
            }
            _ => {}
        }
    }

    writer_task.abort();
    state.handle_disconnect(&connection_id).await;
    tracing::debug!(connection_id = %connection_id, "connection closed");
}

/// Validate and route one JSON text frame. Returns the reply frame, if
/// any.
async fn dispatch_text(
    state: &AppState,
    connection_id: &ConnectionId,
    text: &str,
) -> Option<ServerFrame> {
    // Audio frames may carry up to 32 KB of base64 payload; reject
    // anything larger outright before parsing.
    if text.len() > MAX_AUDIO_FRAME_BYTES * 2 {
        return Some(ServerFrame::error(
            ErrorCode::MessageTooLarge,
            "frame exceeds maximum size",
        ));
    }

    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            return Some(ServerFrame::error(
                ErrorCode::InvalidRequest,
                format!("malformed frame: {e}"),
            ));
        }
    };

    if !matches!(frame, ClientFrame::SendAudio { .. }) && text.len() > MAX_CONTROL_FRAME_BYTES {
        return Some(ServerFrame::error(
            ErrorCode::MessageTooLarge,
            "control frame exceeds 1 KB",
        ));
    }

    match dispatch_frame(state, connection_id, frame).await {
        Ok(reply) => reply,
        Err(e) => Some(error_frame(e)),
    }
}

/// Raw binary messages are speaker audio.
async fn dispatch_binary(
    state: &AppState,
    connection_id: &ConnectionId,
    data: Vec<u8>,
) -> Option<ServerFrame> {
    if data.len() > MAX_AUDIO_FRAME_BYTES {
        return Some(ServerFrame::error(
            ErrorCode::MessageTooLarge,
            "audio frame exceeds 32 KB",
        ));
    }
    let record = state.directory.connection(connection_id)?;
    let Some(session_id) = record.session_id.clone() else {
        return Some(ServerFrame::error(
            ErrorCode::InvalidRole,
            "no session bound for audio",
        ));
    };
    match admit_audio(state, connection_id, &session_id, data, None).await {
        Ok(()) => None,
        Err(e) => Some(error_frame(e)),
    }
}

async fn dispatch_frame(
    state: &AppState,
    connection_id: &ConnectionId,
    frame: ClientFrame,
) -> Result<Option<ServerFrame>, Error> {
    match frame {
        ClientFrame::CreateSession {
            source_language,
            auth_token,
            partial_results,
            min_stability,
            max_buffer_timeout,
        } => {
            let reply = create_session(
                state,
                connection_id,
                &source_language,
                auth_token.as_deref(),
                partial_results,
                min_stability,
                max_buffer_timeout,
            )
            .await?;
            Ok(Some(reply))
        }

        ClientFrame::JoinSession {
            session_id,
            target_language,
        } => {
            let language = LanguageTag::parse(&target_language)?;
            let (session, listener_count) =
                state
                    .directory
                    .join_session(connection_id, &session_id, language.clone())?;
            Ok(Some(ServerFrame::SessionJoined {
                session_id: session.session_id.clone(),
                target_language: language,
                listener_count,
            }))
        }

        ClientFrame::SendAudio {
            session_id,
            audio_data,
            timestamp,
        } => {
            require_role(state, connection_id, Role::Speaker, &session_id)?;
            let bytes = BASE64.decode(audio_data.as_bytes()).map_err(|_| {
                Error::protocol(ErrorCode::InvalidAudioFormat, "audio is not valid base64")
            })?;
            admit_audio(state, connection_id, &session_id, bytes, timestamp).await?;
            Ok(None)
        }

        ClientFrame::ControlBroadcast {
            session_id,
            control_action,
            volume,
        } => {
            require_role(state, connection_id, Role::Speaker, &session_id)?;
            let control = state
                .directory
                .update_control(&session_id, control_action, volume)?;
            let announcement = ServerFrame::BroadcastState {
                session_id: session_id.clone(),
                paused: control.paused,
                muted: control.muted,
                volume: control.volume,
            };
            state.announce(&session_id, announcement.clone()).await;
            if matches!(control_action, BroadcastAction::Pause | BroadcastAction::Resume) {
                tracing::info!(
                    session_id = %session_id,
                    paused = control.paused,
                    "broadcast state changed"
                );
            }
            Ok(Some(announcement))
        }

        ClientFrame::GetSessionStatus { session_id } => {
            require_role(state, connection_id, Role::Speaker, &session_id)?;
            Ok(Some(state.directory.describe(&session_id)?))
        }

        ClientFrame::ChangeLanguage { target_language } => {
            let language = LanguageTag::parse(&target_language)?;
            let updated = state.directory.retarget(connection_id, language)?;
            Ok(Some(ServerFrame::LanguageChanged {
                target_language: updated,
            }))
        }

        ClientFrame::Heartbeat => Ok(Some(ServerFrame::HeartbeatAck)),
    }
}

async fn create_session(
    state: &AppState,
    connection_id: &ConnectionId,
    source_language: &str,
    auth_token: Option<&str>,
    partial_results: Option<bool>,
    min_stability: Option<f32>,
    max_buffer_timeout: Option<f32>,
) -> Result<ServerFrame, Error> {
    let token = auth_token.unwrap_or_default();
    state.auth.verify(token).await.map_err(|e| {
        tracing::info!(connection_id = %connection_id, error = %e, "speaker auth failed");
        Error::protocol(ErrorCode::Unauthenticated, "speaker identity not verified")
    })?;

    let language = LanguageTag::parse(source_language)?;

    // Rollout snapshot supplies defaults; explicit client values win.
    let snapshot = state.gate.snapshot(Instant::now()).await;
    let defaults = &state.settings.pipeline;
    let tunables = SessionTunables {
        partial_results_enabled: partial_results.unwrap_or(defaults.partial_results_enabled),
        min_stability_threshold: min_stability
            .or(snapshot.min_stability_threshold)
            .unwrap_or(defaults.min_stability_threshold),
        max_buffer_timeout_secs: max_buffer_timeout
            .or(snapshot.max_buffer_timeout_secs)
            .unwrap_or(defaults.max_buffer_timeout_secs),
    };

    let session = state
        .directory
        .create_session(connection_id, language, tunables)?;

    if let Err(e) = state.start_session_runtime(&session).await {
        state.directory.fail_session(&session.session_id);
        tracing::error!(
            session_id = %session.session_id,
            error = %e,
            "failed to start session runtime"
        );
        return Err(Error::Internal("could not start session".into()));
    }

    Ok(ServerFrame::SessionCreated {
        session_id: session.session_id.clone(),
        source_language: session.source_language.clone(),
        tunables: session.tunables,
    })
}

/// Rate-limit, validate, and fan one audio frame into the emotion analyzer
/// and the transcription stream. Both dispatches are asynchronous; neither
/// blocks the other, nor this receive loop.
async fn admit_audio(
    state: &AppState,
    connection_id: &ConnectionId,
    session_id: &SessionId,
    bytes: Vec<u8>,
    timestamp: Option<u64>,
) -> Result<(), Error> {
    if bytes.is_empty() || bytes.len() % 2 != 0 {
        return Err(Error::protocol(
            ErrorCode::InvalidAudioFormat,
            "audio must be non-empty PCM16",
        ));
    }
    if bytes.len() > MAX_AUDIO_FRAME_BYTES {
        return Err(Error::protocol(
            ErrorCode::MessageTooLarge,
            "audio frame exceeds 32 KB",
        ));
    }

    let runtime = state
        .runtimes
        .get(session_id)
        .ok_or_else(|| Error::protocol(ErrorCode::SessionInactive, "session has no runtime"))?;

    runtime
        .audio_limiter
        .lock()
        .try_acquire(Instant::now())
        .map_err(|e| {
            metrics::counter!("audio_frames_rejected_total").increment(1);
            tracing::debug!(connection_id = %connection_id, error = %e, "audio rate limited");
            Error::protocol(ErrorCode::RateLimitExceeded, e.to_string())
        })?;

    let sequence = runtime.next_sequence.fetch_add(1, Ordering::Relaxed);
    let origin_ts = timestamp.unwrap_or_else(epoch_ms);
    let frame = AudioFrame::from_pcm16(&bytes, sequence, origin_ts);
    runtime.audio_activity.touch(Instant::now());
    metrics::counter!("audio_frames_admitted_total").increment(1);

    let analyzer = state.analyzer.clone();
    let analyzer_session = session_id.clone();
    let analyzer_frame = frame.clone();
    tokio::spawn(async move {
        analyzer.submit(&analyzer_session, analyzer_frame).await;
    });

    let audio_tx = runtime.audio_tx.clone();
    drop(runtime);
    tokio::spawn(async move {
        if audio_tx.send(frame).await.is_err() {
            tracing::debug!("transcription stream closed, dropping audio frame");
        }
    });

    Ok(())
}

fn require_role(
    state: &AppState,
    connection_id: &ConnectionId,
    role: Role,
    session_id: &SessionId,
) -> Result<(), Error> {
    let record = state
        .directory
        .connection(connection_id)
        .ok_or_else(|| Error::protocol(ErrorCode::SessionNotFound, "unknown connection"))?;
    if record.role != role {
        return Err(Error::protocol(
            ErrorCode::InvalidRole,
            "action not permitted for this role",
        ));
    }
    if record.session_id.as_deref() != Some(session_id.as_str()) {
        return Err(Error::protocol(
            ErrorCode::Unauthorized,
            "connection does not own this session",
        ));
    }
    Ok(())
}

fn error_frame(error: Error) -> ServerFrame {
    match &error {
        Error::Protocol { code, message } => ServerFrame::error(*code, message.clone()),
        other => {
            tracing::error!(error = %other, "internal error on dispatch");
            ServerFrame::error(ErrorCode::InternalError, "internal error")
        }
    }
}

fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pump::ScriptedTranscriptionEngine;
    use babelcast_config::Settings;
    use std::sync::Arc;

    fn noop_state() -> AppState {
        let mut settings = Settings::default();
        settings.upstream.provider = "noop".into();
        AppState::with_engine(settings, Arc::new(ScriptedTranscriptionEngine::new()))
    }

    async fn created_session(state: &AppState, connection_id: &ConnectionId) -> SessionId {
        state.directory.attach(connection_id, Instant::now());
        let reply = dispatch_text(
            state,
            connection_id,
            r#"{"action":"createSession","sourceLanguage":"en","authToken":"tok"}"#,
        )
        .await
        .unwrap();
        match reply {
            ServerFrame::SessionCreated { session_id, .. } => session_id,
            other => panic!("expected sessionCreated, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn create_session_binds_speaker_role() {
        let state = noop_state();
        let connection_id = "conn-speaker".to_string();
        let session_id = created_session(&state, &connection_id).await;

        let record = state.directory.connection(&connection_id).unwrap();
        assert_eq!(record.role, Role::Speaker);
        assert_eq!(record.session_id.as_deref(), Some(session_id.as_str()));
        assert!(state.runtimes.contains_key(&session_id));
    }

    #[tokio::test]
    async fn create_session_without_token_is_unauthenticated() {
        let state = noop_state();
        let connection_id = "conn".to_string();
        state.directory.attach(&connection_id, Instant::now());

        let reply = dispatch_text(
            &state,
            &connection_id,
            r#"{"action":"createSession","sourceLanguage":"en"}"#,
        )
        .await
        .unwrap();
        match reply {
            ServerFrame::Error { code, .. } => assert_eq!(code, ErrorCode::Unauthenticated),
            other => panic!("expected error frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_frame_is_answered_not_fatal() {
        let state = noop_state();
        let connection_id = "conn".to_string();
        state.directory.attach(&connection_id, Instant::now());

        let reply = dispatch_text(&state, &connection_id, "{not json").await.unwrap();
        assert!(matches!(
            reply,
            ServerFrame::Error {
                code: ErrorCode::InvalidRequest,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn oversized_control_frame_rejected() {
        let state = noop_state();
        let connection_id = "conn".to_string();
        state.directory.attach(&connection_id, Instant::now());

        let padding = "x".repeat(2_000);
        let raw = format!(
            r#"{{"action":"joinSession","sessionId":"{padding}","targetLanguage":"es"}}"#
        );
        let reply = dispatch_text(&state, &connection_id, &raw).await.unwrap();
        assert!(matches!(
            reply,
            ServerFrame::Error {
                code: ErrorCode::MessageTooLarge,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn listener_cannot_send_audio() {
        let state = noop_state();
        let speaker = "speaker".to_string();
        let session_id = created_session(&state, &speaker).await;

        let listener = "listener".to_string();
        state.directory.attach(&listener, Instant::now());
        let join = format!(
            r#"{{"action":"joinSession","sessionId":"{session_id}","targetLanguage":"es"}}"#
        );
        let reply = dispatch_text(&state, &listener, &join).await.unwrap();
        assert!(matches!(reply, ServerFrame::SessionJoined { .. }));

        let audio = BASE64.encode([0u8; 320]);
        let send = format!(
            r#"{{"action":"sendAudio","sessionId":"{session_id}","audioData":"{audio}"}}"#
        );
        let reply = dispatch_text(&state, &listener, &send).await.unwrap();
        assert!(matches!(
            reply,
            ServerFrame::Error {
                code: ErrorCode::InvalidRole,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn audio_rate_limit_kicks_in_past_burst() {
        let state = noop_state();
        let speaker = "speaker".to_string();
        let session_id = created_session(&state, &speaker).await;

        let audio = BASE64.encode([0u8; 320]);
        let send = format!(
            r#"{{"action":"sendAudio","sessionId":"{session_id}","audioData":"{audio}"}}"#
        );
        let mut rejected = 0;
        for _ in 0..25 {
            if let Some(ServerFrame::Error { code, .. }) =
                dispatch_text(&state, &speaker, &send).await
            {
                assert_eq!(code, ErrorCode::RateLimitExceeded);
                rejected += 1;
            }
        }
        // Burst of 20 admitted, the rest rejected.
        assert!(rejected >= 4, "expected rejects past burst, got {rejected}");
    }

    #[tokio::test]
    async fn invalid_audio_encoding_rejected() {
        let state = noop_state();
        let speaker = "speaker".to_string();
        let session_id = created_session(&state, &speaker).await;

        let send = format!(
            r#"{{"action":"sendAudio","sessionId":"{session_id}","audioData":"@@not-base64@@"}}"#
        );
        let reply = dispatch_text(&state, &speaker, &send).await.unwrap();
        assert!(matches!(
            reply,
            ServerFrame::Error {
                code: ErrorCode::InvalidAudioFormat,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn heartbeat_acks() {
        let state = noop_state();
        let connection_id = "conn".to_string();
        state.directory.attach(&connection_id, Instant::now());

        let reply = dispatch_text(&state, &connection_id, r#"{"action":"heartbeat"}"#)
            .await
            .unwrap();
        assert!(matches!(reply, ServerFrame::HeartbeatAck));
    }
}
