//! Translation fan-out and broadcast
//!
//! Consumes completed text segments from the partial-result processor and
//! fans them out: per target language, translate (cache-first), compose
//! SSML from the speaker's emotion sample, synthesize, then broadcast to
//! every subscribed listener under a bounded-concurrency semaphore with
//! retry and stale-connection reaping. No language blocks another; the
//! orchestrator joins all per-language pipelines before recording
//! completion metrics.

pub mod broadcast;
pub mod listener_buffer;
pub mod orchestrator;
pub mod retry;

pub use broadcast::Broadcaster;
pub use listener_buffer::ListenerBuffer;
pub use orchestrator::FanoutOrchestrator;
pub use retry::with_retries;
