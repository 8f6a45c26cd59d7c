//! Error types
//!
//! Two layers: `ErrorCode` is the stable wire taxonomy returned to clients
//! in error frames; `Error` is the crate-internal error enum. Upstream
//! (ASR / MT / TTS) failures carry a transient/permanent kind so call sites
//! can decide whether a retry allowance applies.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Stable error codes carried in `{type:"error"}` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidRequest,
    InvalidRole,
    Unauthorized,
    Unauthenticated,
    RateLimitExceeded,
    MessageTooLarge,
    InvalidAudioFormat,
    SessionNotFound,
    SessionInactive,
    SessionAtCapacity,
    UnsupportedLanguage,
    InternalError,
}

impl ErrorCode {
    /// Whether the client should be told to back off and retry.
    pub fn is_capacity(&self) -> bool {
        matches!(
            self,
            ErrorCode::RateLimitExceeded | ErrorCode::SessionAtCapacity
        )
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::InvalidRole => "INVALID_ROLE",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Unauthenticated => "UNAUTHENTICATED",
            ErrorCode::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            ErrorCode::MessageTooLarge => "MESSAGE_TOO_LARGE",
            ErrorCode::InvalidAudioFormat => "INVALID_AUDIO_FORMAT",
            ErrorCode::SessionNotFound => "SESSION_NOT_FOUND",
            ErrorCode::SessionInactive => "SESSION_INACTIVE",
            ErrorCode::SessionAtCapacity => "SESSION_AT_CAPACITY",
            ErrorCode::UnsupportedLanguage => "UNSUPPORTED_LANGUAGE",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        };
        f.write_str(s)
    }
}

/// Transient errors consume a retry allowance; permanent ones do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamKind {
    Transient,
    Permanent,
}

/// Failure reported by an external collaborator (ASR, MT, TTS, flags).
#[derive(Debug, Clone, Error)]
#[error("{kind:?} upstream error: {message}")]
pub struct UpstreamError {
    pub kind: UpstreamKind,
    pub message: String,
}

impl UpstreamError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: UpstreamKind::Transient,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: UpstreamKind::Permanent,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == UpstreamKind::Transient
    }
}

/// Core error enum shared across crates.
#[derive(Debug, Error)]
pub enum Error {
    /// Client-visible protocol violation (answered in-band, never fatal).
    #[error("{code}: {message}")]
    Protocol { code: ErrorCode, message: String },

    /// External collaborator failure.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// Transport-level loss of a connection.
    #[error("connection gone: {0}")]
    ConnectionGone(String),

    /// Invariant violation or other unrecoverable internal state.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn protocol(code: ErrorCode, message: impl Into<String>) -> Self {
        Error::Protocol {
            code,
            message: message.into(),
        }
    }

    /// The wire code this error maps to.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Protocol { code, .. } => *code,
            Error::Upstream(_) | Error::ConnectionGone(_) | Error::Internal(_) => {
                ErrorCode::InternalError
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_serialize_screaming_snake() {
        let json = serde_json::to_string(&ErrorCode::RateLimitExceeded).unwrap();
        assert_eq!(json, "\"RATE_LIMIT_EXCEEDED\"");
    }

    #[test]
    fn capacity_codes() {
        assert!(ErrorCode::RateLimitExceeded.is_capacity());
        assert!(ErrorCode::SessionAtCapacity.is_capacity());
        assert!(!ErrorCode::SessionNotFound.is_capacity());
    }

    #[test]
    fn protocol_error_keeps_code() {
        let err = Error::protocol(ErrorCode::SessionNotFound, "no such session");
        assert_eq!(err.code(), ErrorCode::SessionNotFound);
    }
}
