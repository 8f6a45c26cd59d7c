//! Centralized behavioural constants
//!
//! These values are contracts of the pipeline, not deployment knobs; the
//! tunable knobs live in [`crate::settings`]. Grouped by subsystem.

/// Partial-result rate limiting.
pub mod rate_limit {
    /// Sliding-window width: 5 windows per second.
    pub const WINDOW_MS: u64 = 200;
}

/// Result buffer capacity.
pub mod buffer {
    /// Word-count estimate ceiling: 30 wpm over a 10 s horizon.
    pub const MAX_ESTIMATED_WORDS: usize = 300;
    /// Entries shed per overflow pass.
    pub const SHED_BATCH: usize = 5;
    /// Final-to-partial timestamp correlation window, each side.
    pub const MATCH_WINDOW_MS: u64 = 5_000;
    /// Hold window for unknown-stability partials before they may forward.
    pub const UNKNOWN_STABILITY_HOLD_MS: u64 = 3_000;
}

/// Dedup cache.
pub mod dedup {
    /// Entry lifetime.
    pub const DEFAULT_TTL_SECS: u64 = 10;
    /// Minimum spacing between opportunistic sweeps.
    pub const SWEEP_INTERVAL_SECS: u64 = 30;
    /// Emergency-flush threshold.
    pub const MAX_ENTRIES: usize = 10_000;
    /// Hex characters kept from the SHA-256 digest.
    pub const HASH_PREFIX_LEN: usize = 16;
}

/// Orphan reclamation.
pub mod orphan {
    /// Buffered partials older than this are treated as missing a final.
    pub const TIMEOUT_SECS: u64 = 15;
    /// Minimum spacing between opportunistic cleanup passes.
    pub const CLEANUP_INTERVAL_SECS: u64 = 5;
}

/// Stream-health fallback.
pub mod stream_health {
    /// Audio flowing but no ASR result for this long trips finals-only.
    pub const SILENCE_WINDOW_SECS: u64 = 10;
}

/// Translation cache.
pub mod translation_cache {
    pub const DEFAULT_TTL_SECS: u64 = 3_600;
    pub const MAX_ENTRIES: usize = 10_000;
    /// Fraction of entries evicted (LRU) when the cap is hit.
    pub const EVICTION_FRACTION: f64 = 0.10;
}

/// Session and connection lifecycle.
pub mod session {
    /// Sessions expire at most this long after creation.
    pub const MAX_LIFETIME_SECS: u64 = 2 * 60 * 60;
    /// Connections idle longer than this are reaped.
    pub const IDLE_TIMEOUT_SECS: u64 = 10 * 60;
    /// Reaper cadence.
    pub const REAP_INTERVAL_SECS: u64 = 60;
    /// Listener capacity per session.
    pub const MAX_LISTENERS: u32 = 500;
    /// Tunable bounds.
    pub const MIN_STABILITY_LOW: f32 = 0.70;
    pub const MIN_STABILITY_HIGH: f32 = 0.95;
    pub const BUFFER_TIMEOUT_LOW_SECS: f32 = 2.0;
    pub const BUFFER_TIMEOUT_HIGH_SECS: f32 = 10.0;
}

/// Ingress audio admission.
pub mod ingress {
    /// Sustained audio frame rate per session.
    pub const AUDIO_FRAMES_PER_SEC: u32 = 10;
    /// Burst allowance.
    pub const AUDIO_BURST: u32 = 20;
}

/// Fan-out and broadcast.
pub mod fanout {
    pub const MAX_CONCURRENT_BROADCASTS: usize = 100;
    pub const TRANSLATE_TIMEOUT_SECS: u64 = 5;
    pub const SYNTHESIZE_TIMEOUT_SECS: u64 = 5;
    pub const SEND_TIMEOUT_SECS: u64 = 2;
    pub const MAX_RETRIES: u32 = 2;
    pub const RETRY_BACKOFF_MS: u64 = 100;
    /// Per-listener buffer bound: 10 s of PCM16 at 16 kHz mono.
    pub const LISTENER_BUFFER_MAX_BYTES: usize = 10 * 16_000 * 2;
}

/// Feature flags.
pub mod flags {
    /// Snapshot cache lifetime.
    pub const CACHE_TTL_SECS: u64 = 60;
    /// Flag parameter controlling partial-result processing.
    pub const PARTIAL_RESULTS_PARAMETER: &str = "partial-results-enabled";
}
