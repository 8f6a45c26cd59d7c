//! Core traits and types for the streaming translation relay
//!
//! This crate provides foundational types used across all other crates:
//! - Audio frame types and PCM conversion
//! - Transcription event types (partial / final results)
//! - Language tags and validation
//! - Emotion samples derived from speaker audio
//! - Wire protocol frames (client actions, server responses)
//! - Traits for the external collaborators (ASR, MT, TTS, auth, flags)
//! - Error types and wire error codes

pub mod audio;
pub mod emotion;
pub mod error;
pub mod language;
pub mod protocol;
pub mod traits;
pub mod transcript;

pub use audio::AudioFrame;
pub use emotion::{EmotionSample, EmotionTone, RateClass, VolumeClass};
pub use error::{Error, ErrorCode, Result, UpstreamError, UpstreamKind};
pub use language::LanguageTag;
pub use protocol::{
    BroadcastAction, ClientFrame, ServerFrame, SessionTunables, MAX_AUDIO_FRAME_BYTES,
    MAX_CONTROL_FRAME_BYTES,
};
pub use traits::{
    BroadcastControl, FeatureFlagOracle, FlagSnapshot, ForwardPayload, ForwardSink,
    ListenerDirectory, ListenerSink, MachineTranslator, SpeakerAuth, SpeakerIdentity,
    SpeechSynthesizer, TranscriptionEngine, TranscriptionHandle,
};
pub use transcript::{AsrEvent, FinalResult, PartialResult};

/// Connection identifier assigned on transport accept.
pub type ConnectionId = String;

/// Session identifier, human-memorable (`adjective-noun-NNN`).
pub type SessionId = String;
