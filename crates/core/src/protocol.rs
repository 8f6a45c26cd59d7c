//! Wire protocol frames
//!
//! Inbound client frames are tagged unions on `action`; outbound server
//! frames are tagged on `type`. Field names follow the wire contract
//! (camelCase). Audio payloads are base64-encoded PCM16 when carried in
//! JSON text frames; raw binary WebSocket messages are also accepted as
//! audio at the transport layer.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::ErrorCode;
use crate::language::LanguageTag;
use crate::SessionId;

/// Maximum size of a control frame on the wire.
pub const MAX_CONTROL_FRAME_BYTES: usize = 1024;

/// Maximum size of an audio frame on the wire.
pub const MAX_AUDIO_FRAME_BYTES: usize = 32 * 1024;

/// Per-session tunables, validated at session creation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTunables {
    pub partial_results_enabled: bool,
    /// In [0.70, 0.95]
    pub min_stability_threshold: f32,
    /// In [2.0, 10.0] seconds
    pub max_buffer_timeout_secs: f32,
}

impl Default for SessionTunables {
    fn default() -> Self {
        Self {
            partial_results_enabled: true,
            min_stability_threshold: 0.85,
            max_buffer_timeout_secs: 5.0,
        }
    }
}

/// Broadcast control verbs a speaker may issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BroadcastAction {
    Pause,
    Resume,
    Mute,
    Unmute,
}

/// Inbound client frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ClientFrame {
    #[serde(rename_all = "camelCase")]
    CreateSession {
        source_language: String,
        /// Speaker identity token, checked against the auth oracle
        auth_token: Option<String>,
        partial_results: Option<bool>,
        min_stability: Option<f32>,
        max_buffer_timeout: Option<f32>,
    },
    #[serde(rename_all = "camelCase")]
    JoinSession {
        session_id: SessionId,
        target_language: String,
    },
    #[serde(rename_all = "camelCase")]
    SendAudio {
        session_id: SessionId,
        /// Base64 PCM16 16 kHz mono
        audio_data: String,
        /// Speaker-side capture timestamp, epoch milliseconds
        timestamp: Option<u64>,
    },
    #[serde(rename_all = "camelCase")]
    ControlBroadcast {
        session_id: SessionId,
        control_action: BroadcastAction,
        volume: Option<f32>,
    },
    #[serde(rename_all = "camelCase")]
    GetSessionStatus { session_id: SessionId },
    #[serde(rename_all = "camelCase")]
    ChangeLanguage { target_language: String },
    Heartbeat,
}

/// Outbound server frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerFrame {
    #[serde(rename_all = "camelCase")]
    SessionCreated {
        session_id: SessionId,
        source_language: LanguageTag,
        tunables: SessionTunables,
    },
    #[serde(rename_all = "camelCase")]
    SessionJoined {
        session_id: SessionId,
        target_language: LanguageTag,
        listener_count: u32,
    },
    #[serde(rename_all = "camelCase")]
    PartialTranscript {
        session_id: SessionId,
        text: String,
        stability: Option<f32>,
        origin_timestamp: u64,
    },
    #[serde(rename_all = "camelCase")]
    FinalTranscript {
        session_id: SessionId,
        text: String,
        /// Listener frames carry the translated text and its language;
        /// speaker echo frames carry the source language.
        language: LanguageTag,
        origin_timestamp: u64,
    },
    #[serde(rename_all = "camelCase")]
    AudioChunk {
        session_id: SessionId,
        target_language: LanguageTag,
        /// Base64 PCM16 16 kHz mono
        audio_data: String,
        is_partial: bool,
    },
    #[serde(rename_all = "camelCase")]
    BroadcastState {
        session_id: SessionId,
        paused: bool,
        muted: bool,
        volume: f32,
    },
    #[serde(rename_all = "camelCase")]
    SessionStatus {
        session_id: SessionId,
        active: bool,
        listener_count: u32,
        language_distribution: HashMap<String, u32>,
        created_at: chrono::DateTime<chrono::Utc>,
        expires_at: chrono::DateTime<chrono::Utc>,
    },
    #[serde(rename_all = "camelCase")]
    LanguageChanged { target_language: LanguageTag },
    HeartbeatAck,
    #[serde(rename_all = "camelCase")]
    SessionEnded {
        session_id: SessionId,
        reason: String,
    },
    #[serde(rename_all = "camelCase")]
    Error {
        code: ErrorCode,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        retry_after: Option<u64>,
    },
}

impl ServerFrame {
    /// Build an error frame, attaching `retryAfter` for capacity errors.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        let retry_after = code.is_capacity().then_some(1);
        ServerFrame::Error {
            code,
            message: message.into(),
            retry_after,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_frame_round_trip() {
        let raw = r#"{"action":"createSession","sourceLanguage":"en","minStability":0.9}"#;
        let frame: ClientFrame = serde_json::from_str(raw).unwrap();
        match frame {
            ClientFrame::CreateSession {
                source_language,
                min_stability,
                ..
            } => {
                assert_eq!(source_language, "en");
                assert_eq!(min_stability, Some(0.9));
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn heartbeat_is_bare() {
        let frame: ClientFrame = serde_json::from_str(r#"{"action":"heartbeat"}"#).unwrap();
        assert!(matches!(frame, ClientFrame::Heartbeat));
    }

    #[test]
    fn error_frame_carries_retry_after_for_capacity() {
        let frame = ServerFrame::error(ErrorCode::RateLimitExceeded, "slow down");
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains("\"retryAfter\":1"));
        assert!(json.contains("RATE_LIMIT_EXCEEDED"));

        let frame = ServerFrame::error(ErrorCode::SessionNotFound, "nope");
        let json = serde_json::to_string(&frame).unwrap();
        assert!(!json.contains("retryAfter"));
    }

    #[test]
    fn server_frame_type_tags() {
        let frame = ServerFrame::HeartbeatAck;
        assert_eq!(
            serde_json::to_string(&frame).unwrap(),
            r#"{"type":"heartbeatAck"}"#
        );
    }
}
