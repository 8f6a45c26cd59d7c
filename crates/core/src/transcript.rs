//! Transcription event types
//!
//! The external ASR emits a stream of partial results (interim, carrying a
//! stability score) and final results (stable, optionally naming the
//! partials they replace). Events arrive in emission order but may be
//! non-monotonic by origin timestamp; consumers sort on read when they
//! need temporal order.

use serde::{Deserialize, Serialize};

use crate::language::LanguageTag;
use crate::SessionId;

/// Interim transcription, possibly revised by later events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartialResult {
    pub result_id: String,
    /// Non-empty, trimmed text
    pub text: String,
    /// ASR-supplied confidence the text will not be revised; `None` = unknown
    pub stability: Option<f32>,
    /// Speaker-side capture timestamp, epoch milliseconds
    pub origin_timestamp_ms: u64,
    pub session_id: SessionId,
    pub source_language: LanguageTag,
}

impl PartialResult {
    /// Stability for ordering purposes; unknown ranks lowest.
    pub fn stability_rank(&self) -> f32 {
        self.stability.unwrap_or(0.0)
    }

    /// Whitespace-delimited word count, used for buffer capacity estimates.
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// Stable transcription terminating a partial chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalResult {
    pub result_id: String,
    pub text: String,
    pub origin_timestamp_ms: u64,
    pub session_id: SessionId,
    pub source_language: LanguageTag,
    /// Explicit partial result ids this final supersedes
    #[serde(default)]
    pub replaces: Vec<String>,
}

/// Event emitted by the external ASR stream.
#[derive(Debug, Clone)]
pub enum AsrEvent {
    Partial(PartialResult),
    Final(FinalResult),
    /// Upstream stream failure; the client may reconnect internally.
    Error(String),
}

impl AsrEvent {
    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            AsrEvent::Partial(p) => Some(&p.session_id),
            AsrEvent::Final(f) => Some(&f.session_id),
            AsrEvent::Error(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partial(text: &str, stability: Option<f32>) -> PartialResult {
        PartialResult {
            result_id: "r1".into(),
            text: text.into(),
            stability,
            origin_timestamp_ms: 0,
            session_id: "golden-eagle-427".into(),
            source_language: LanguageTag::parse("en").unwrap(),
        }
    }

    #[test]
    fn unknown_stability_ranks_lowest() {
        assert_eq!(partial("hi", None).stability_rank(), 0.0);
        assert_eq!(partial("hi", Some(0.9)).stability_rank(), 0.9);
    }

    #[test]
    fn word_count_estimate() {
        assert_eq!(partial("the quick  brown fox", Some(0.9)).word_count(), 4);
        assert_eq!(partial("hello", None).word_count(), 1);
    }
}
