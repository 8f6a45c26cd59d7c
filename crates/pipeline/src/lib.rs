//! Partial-result processing and emotion analysis
//!
//! One `PartialResultProcessor` runs per active session as a single-consumer
//! task, filtering the high-volume stream of partial and final
//! transcription events down to stable, deduplicated segments handed to the
//! fan-out orchestrator. The `EmotionAnalyzer` runs volume and speaking-rate
//! detection over raw audio frames in parallel and keeps a latest-wins
//! sample per session for prosody shaping.

pub mod boundary;
pub mod buffer;
pub mod dedup;
pub mod emotion;
pub mod flags;
pub mod processor;
pub mod rate_limit;

pub use boundary::SentenceBoundaryDetector;
pub use buffer::{BufferedResult, ResultBuffer};
pub use dedup::DedupCache;
pub use emotion::{EmotionAnalyzer, EmotionRegistry};
pub use flags::{canary_bucket, CanaryGate};
pub use processor::{
    levenshtein, AudioActivity, PartialResultProcessor, ProcessorConfig, ProcessorEvent,
    ProcessorMode,
};
pub use rate_limit::{PartialRateLimiter, WindowOutcome};
