//! Traits at the seams between subsystems
//!
//! The external collaborators (speech-to-text, machine translation,
//! text-to-speech, speaker auth, feature flags) are remote services; the
//! core consumes them through these narrow interfaces so implementations
//! stay swappable and tests can script them.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::mpsc;

use crate::audio::AudioFrame;
use crate::emotion::EmotionSample;
use crate::error::UpstreamError;
use crate::language::LanguageTag;
use crate::protocol::ServerFrame;
use crate::transcript::AsrEvent;
use crate::{ConnectionId, SessionId};

/// Verified speaker identity returned by the auth oracle.
#[derive(Debug, Clone)]
pub struct SpeakerIdentity {
    pub subject: String,
}

/// Identity oracle consulted on session creation.
#[async_trait]
pub trait SpeakerAuth: Send + Sync {
    async fn verify(&self, token: &str) -> Result<SpeakerIdentity, UpstreamError>;
}

/// Live bidirectional ASR stream: a frame sink and an event source.
///
/// Dropping the handle closes the stream.
pub struct TranscriptionHandle {
    pub audio_tx: mpsc::Sender<AudioFrame>,
    pub events: mpsc::Receiver<AsrEvent>,
}

/// Factory for per-session ASR streams (16 kHz PCM, high partial
/// stability).
#[async_trait]
pub trait TranscriptionEngine: Send + Sync {
    async fn open_stream(
        &self,
        session_id: SessionId,
        source_language: LanguageTag,
    ) -> Result<TranscriptionHandle, UpstreamError>;
}

/// Remote machine-translation service.
#[async_trait]
pub trait MachineTranslator: Send + Sync {
    async fn translate(
        &self,
        text: &str,
        source: &LanguageTag,
        target: &LanguageTag,
    ) -> Result<String, UpstreamError>;
}

/// Remote text-to-speech service. Output is PCM16, 16 kHz, mono.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, ssml: &str, voice: &str) -> Result<Vec<u8>, UpstreamError>;
}

/// Feature-flag snapshot for the partial-results rollout.
#[derive(Debug, Clone)]
pub struct FlagSnapshot {
    pub enabled: bool,
    /// Canary rollout percentage in [0, 100]
    pub rollout_percentage: u8,
    pub min_stability_threshold: Option<f32>,
    pub max_buffer_timeout_secs: Option<f32>,
}

impl FlagSnapshot {
    /// Fully-on snapshot, used when the oracle is unreachable.
    pub fn full_on() -> Self {
        Self {
            enabled: true,
            rollout_percentage: 100,
            min_stability_threshold: None,
            max_buffer_timeout_secs: None,
        }
    }
}

/// Remote feature-flag oracle.
#[async_trait]
pub trait FeatureFlagOracle: Send + Sync {
    async fn get(&self, parameter: &str) -> Result<FlagSnapshot, UpstreamError>;
}

/// Payload handed from the partial-result processor to the fan-out
/// orchestrator. Copied out of the processor's critical region before
/// dispatch.
#[derive(Debug, Clone)]
pub struct ForwardPayload {
    pub session_id: SessionId,
    pub source_language: LanguageTag,
    pub text: String,
    pub is_partial: bool,
    pub stability: Option<f32>,
    pub origin_timestamp_ms: u64,
    pub emotion: Option<EmotionSample>,
}

/// Downstream consumer of completed text segments.
#[async_trait]
pub trait ForwardSink: Send + Sync {
    async fn forward(&self, payload: ForwardPayload) -> Result<(), UpstreamError>;
}

/// Broadcast state a speaker controls for the whole session.
#[derive(Debug, Clone, Copy)]
pub struct BroadcastControl {
    pub paused: bool,
    pub muted: bool,
    pub volume: f32,
}

impl Default for BroadcastControl {
    fn default() -> Self {
        Self {
            paused: false,
            muted: false,
            volume: 1.0,
        }
    }
}

/// Read side of the session/connection directory the orchestrator needs.
#[async_trait]
pub trait ListenerDirectory: Send + Sync {
    /// Map of target language to the listener connections subscribed to it.
    fn listeners_by_language(
        &self,
        session_id: &SessionId,
    ) -> HashMap<LanguageTag, Vec<ConnectionId>>;

    fn broadcast_control(&self, session_id: &SessionId) -> BroadcastControl;

    /// Remove a connection observed gone mid-send (decrements the
    /// listener count).
    async fn remove_connection(&self, connection_id: &ConnectionId);
}

/// Outbound transport seam: delivers a frame to one connection.
#[async_trait]
pub trait ListenerSink: Send + Sync {
    /// `Err(ConnectionGone)` marks the connection for removal; other
    /// errors are transient.
    async fn send(
        &self,
        connection_id: &ConnectionId,
        frame: ServerFrame,
    ) -> Result<(), crate::error::Error>;
}
