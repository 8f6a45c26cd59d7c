//! Partial-result processor
//!
//! One instance per active session, run as a single-consumer task: all ASR
//! events for the session arrive in order over one channel, so buffer and
//! cache invariants never need cross-task locking. The processor never
//! suspends while mutating its buffer or caches; forward payloads are
//! copied out and dispatched on their own task.
//!
//! Modes: `partials-enabled` (initial, when the feature gate allows) and
//! `finals-only` (stream-health fallback). The fallback trips when audio is
//! flowing but the ASR has produced nothing for 10 s, or on an upstream
//! stream error; the first subsequent partial recovers it.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};

use babelcast_config::constants::{buffer as buffer_consts, dedup, orphan, stream_health};
use babelcast_core::{
    AsrEvent, FinalResult, ForwardPayload, ForwardSink, LanguageTag, PartialResult,
    SessionId, SessionTunables,
};

use crate::boundary::SentenceBoundaryDetector;
use crate::buffer::ResultBuffer;
use crate::dedup::DedupCache;
use crate::emotion::EmotionRegistry;
use crate::flags::CanaryGate;
use crate::rate_limit::PartialRateLimiter;

/// Shared record of the speaker's most recent audio frame, written by the
/// ingress path and read by the stream-health probe.
#[derive(Clone, Default)]
pub struct AudioActivity(Arc<Mutex<Option<Instant>>>);

impl AudioActivity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn touch(&self, now: Instant) {
        *self.0.lock() = Some(now);
    }

    pub fn last(&self) -> Option<Instant> {
        *self.0.lock()
    }
}

/// Observable processor events, mirrored as metrics.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessorEvent {
    FallbackTriggered,
    FallbackRecovered,
    PartialsDropped(usize),
    DuplicateDetected,
    OrphansFlushed(usize),
    BufferShed(usize),
    Discrepancy {
        partial_text: String,
        final_text: String,
        ratio: f32,
    },
}

/// Processor mode state machine. No other states exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorMode {
    PartialsEnabled,
    FinalsOnly,
}

/// Per-session processor configuration.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub session_id: SessionId,
    pub source_language: LanguageTag,
    pub tunables: SessionTunables,
    pub pause_threshold: Duration,
    pub orphan_timeout: Duration,
    pub cleanup_interval: Duration,
    pub dedup_ttl: Duration,
    pub silence_window: Duration,
}

impl ProcessorConfig {
    pub fn new(
        session_id: SessionId,
        source_language: LanguageTag,
        tunables: SessionTunables,
    ) -> Self {
        Self {
            session_id,
            source_language,
            tunables,
            pause_threshold: Duration::from_secs_f32(2.0),
            orphan_timeout: Duration::from_secs(orphan::TIMEOUT_SECS),
            cleanup_interval: Duration::from_secs(orphan::CLEANUP_INTERVAL_SECS),
            dedup_ttl: Duration::from_secs(dedup::DEFAULT_TTL_SECS),
            silence_window: Duration::from_secs(stream_health::SILENCE_WINDOW_SECS),
        }
    }
}

pub struct PartialResultProcessor {
    config: ProcessorConfig,
    mode: ProcessorMode,
    rate_limiter: PartialRateLimiter,
    buffer: ResultBuffer,
    dedup: DedupCache,
    boundary: SentenceBoundaryDetector,
    gate: Arc<CanaryGate>,
    forward: Arc<dyn ForwardSink>,
    emotion: Arc<EmotionRegistry>,
    audio: AudioActivity,
    last_forwarded_at: Instant,
    last_result_at: Instant,
    last_cleanup: Instant,
    events_tx: broadcast::Sender<ProcessorEvent>,
}

impl PartialResultProcessor {
    pub fn new(
        config: ProcessorConfig,
        gate: Arc<CanaryGate>,
        forward: Arc<dyn ForwardSink>,
        emotion: Arc<EmotionRegistry>,
        audio: AudioActivity,
        now: Instant,
    ) -> Self {
        let (events_tx, _) = broadcast::channel(64);
        Self {
            mode: ProcessorMode::PartialsEnabled,
            rate_limiter: PartialRateLimiter::new(),
            buffer: ResultBuffer::new(config.tunables.min_stability_threshold),
            dedup: DedupCache::new(config.dedup_ttl, now),
            boundary: SentenceBoundaryDetector::new(
                config.pause_threshold,
                Duration::from_secs_f32(config.tunables.max_buffer_timeout_secs),
            ),
            gate,
            forward,
            emotion,
            audio,
            last_forwarded_at: now,
            last_result_at: now,
            last_cleanup: now,
            events_tx,
            config,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProcessorEvent> {
        self.events_tx.subscribe()
    }

    pub fn mode(&self) -> ProcessorMode {
        self.mode
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Consume the session's event stream until it closes. A one-second
    /// tick drives the opportunistic work (window drain, orphan reap,
    /// dedup sweep, stream-health probe) while events are sparse.
    pub async fn run(mut self, mut events: mpsc::Receiver<AsrEvent>) {
        let mut tick = tokio::time::interval(Duration::from_secs(1));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                maybe = events.recv() => match maybe {
                    Some(event) => self.handle_event(event, Instant::now()).await,
                    None => break,
                },
                _ = tick.tick() => self.opportunistic(Instant::now()).await,
            }
        }
        tracing::debug!(session_id = %self.config.session_id, "processor stream closed");
    }

    /// Process one ASR event.
    pub async fn handle_event(&mut self, event: AsrEvent, now: Instant) {
        match event {
            AsrEvent::Partial(partial) => self.handle_partial(partial, now).await,
            AsrEvent::Final(final_result) => self.handle_final(final_result, now).await,
            AsrEvent::Error(message) => {
                tracing::error!(
                    session_id = %self.config.session_id,
                    error = %message,
                    "transcription stream error"
                );
                self.enter_fallback("upstream stream error");
            }
        }
        self.maybe_cleanup(now).await;
    }

    async fn handle_partial(&mut self, partial: PartialResult, now: Instant) {
        if partial.text.trim().is_empty() {
            tracing::warn!(
                session_id = %self.config.session_id,
                result_id = %partial.result_id,
                "dropping malformed partial with empty text"
            );
            return;
        }

        // Stream-health probe: audio flowing but the recognizer silent.
        if self.audio_flowing(now)
            && now.duration_since(self.last_result_at) >= self.config.silence_window
        {
            self.enter_fallback("no recognizer output while audio flowing");
            self.last_result_at = now;
            return;
        }

        self.last_result_at = now;
        if self.mode == ProcessorMode::FinalsOnly {
            self.mode = ProcessorMode::PartialsEnabled;
            tracing::info!(
                session_id = %self.config.session_id,
                "partial processing recovered"
            );
            let _ = self.events_tx.send(ProcessorEvent::FallbackRecovered);
        }

        // Feature flag & canary gate.
        if !self.config.tunables.partial_results_enabled {
            return;
        }
        if !self
            .gate
            .partials_enabled(&self.config.session_id, now)
            .await
        {
            return;
        }

        // Rate limit: the arrival may close the previous window.
        let outcome = self.rate_limiter.offer(partial, now);
        if outcome.dropped > 0 {
            metrics::counter!("partial_results_dropped_total").increment(outcome.dropped as u64);
            let _ = self
                .events_tx
                .send(ProcessorEvent::PartialsDropped(outcome.dropped));
        }
        if let Some(best) = outcome.emitted {
            self.accept_partial(best, now).await;
        }
    }

    /// Steps downstream of the rate limiter: stability filter, buffer &
    /// boundary, dedup gate, forward.
    async fn accept_partial(&mut self, best: PartialResult, now: Instant) {
        let shed = self.buffer.insert(best.clone(), now);
        if !shed.is_empty() {
            metrics::counter!("result_buffer_shed_total").increment(shed.len() as u64);
            let _ = self.events_tx.send(ProcessorEvent::BufferShed(shed.len()));
            tracing::debug!(
                session_id = %self.config.session_id,
                shed = shed.len(),
                "result buffer over capacity, shed oldest stable entries"
            );
        }

        let entry = match self.buffer.get(&best.result_id) {
            Some(entry) => entry,
            None => return, // shed by its own insert
        };
        let added_at = entry.added_at;
        let already_forwarded = entry.forwarded;
        if already_forwarded {
            return;
        }

        let stability_ok = match best.stability {
            Some(s) => s >= self.config.tunables.min_stability_threshold,
            None => {
                now.duration_since(added_at)
                    >= Duration::from_millis(buffer_consts::UNKNOWN_STABILITY_HOLD_MS)
            }
        };
        if !stability_ok {
            return;
        }

        if !self
            .boundary
            .is_complete(&best.text, false, added_at, self.last_forwarded_at, now)
        {
            return;
        }

        self.forward_gated(
            best.text.clone(),
            Some(best.result_id.as_str()),
            true,
            best.stability,
            best.origin_timestamp_ms,
            now,
        );
    }

    async fn handle_final(&mut self, final_result: FinalResult, now: Instant) {
        if final_result.text.trim().is_empty() {
            tracing::warn!(
                session_id = %self.config.session_id,
                result_id = %final_result.result_id,
                "dropping malformed final with empty text"
            );
            return;
        }
        self.last_result_at = now;

        // Retire the partials this final supersedes: explicit ids when
        // given, else timestamp-window correlation.
        let removed = if !final_result.replaces.is_empty() {
            final_result
                .replaces
                .iter()
                .filter_map(|id| self.buffer.remove_by_id(id))
                .collect::<Vec<_>>()
        } else {
            self.buffer
                .remove_in_window(final_result.origin_timestamp_ms)
        };

        self.forward_gated(
            final_result.text.clone(),
            None,
            false,
            None,
            final_result.origin_timestamp_ms,
            now,
        );

        // Discrepancy check: a forwarded partial that differs from its
        // final by more than 20% normalized edit distance is worth a WARN.
        for entry in removed.iter().filter(|e| e.forwarded) {
            let distance = levenshtein(&entry.partial.text, &final_result.text);
            let max_len = entry
                .partial
                .text
                .chars()
                .count()
                .max(final_result.text.chars().count());
            if max_len == 0 {
                continue;
            }
            let ratio = distance as f32 / max_len as f32;
            if ratio > 0.20 {
                metrics::counter!("transcript_discrepancies_total").increment(1);
                tracing::warn!(
                    session_id = %self.config.session_id,
                    partial = %truncate(&entry.partial.text, 80),
                    final_text = %truncate(&final_result.text, 80),
                    ratio,
                    "discrepancy between forwarded partial and final"
                );
                let _ = self.events_tx.send(ProcessorEvent::Discrepancy {
                    partial_text: truncate(&entry.partial.text, 80),
                    final_text: truncate(&final_result.text, 80),
                    ratio,
                });
            }
        }
    }

    /// Dedup gate plus the actual dispatch. Returns whether a forward was
    /// initiated. The dedup entry is inserted before dispatch so the race
    /// window between check and send stays closed; a failed forward keeps
    /// the entry and lets the TTL self-heal rather than retrying.
    fn forward_gated(
        &mut self,
        text: String,
        result_id: Option<&str>,
        is_partial: bool,
        stability: Option<f32>,
        origin_timestamp_ms: u64,
        now: Instant,
    ) -> bool {
        let key = DedupCache::key_for(&text);
        if self.dedup.contains(&key, now) {
            if let Some(id) = result_id {
                self.buffer.mark_forwarded(id);
            }
            metrics::counter!("duplicates_detected_total").increment(1);
            let _ = self.events_tx.send(ProcessorEvent::DuplicateDetected);
            return false;
        }
        self.dedup.insert(key, now);
        if let Some(id) = result_id {
            self.buffer.mark_forwarded(id);
        }
        self.last_forwarded_at = now;

        let payload = ForwardPayload {
            session_id: self.config.session_id.clone(),
            source_language: self.config.source_language.clone(),
            text,
            is_partial,
            stability,
            origin_timestamp_ms,
            emotion: self.emotion.get(&self.config.session_id),
        };
        let sink = self.forward.clone();
        let session_id = self.config.session_id.clone();
        tokio::spawn(async move {
            if let Err(e) = sink.forward(payload).await {
                metrics::counter!("forward_failures_total").increment(1);
                tracing::warn!(session_id = %session_id, error = %e, "forward failed");
            }
        });
        true
    }

    /// Periodic work: drain an elapsed rate-limit window, run the
    /// stream-health probe, then the spaced cleanup pass.
    pub async fn opportunistic(&mut self, now: Instant) {
        let outcome = self.rate_limiter.close_if_elapsed(now);
        if outcome.dropped > 0 {
            metrics::counter!("partial_results_dropped_total").increment(outcome.dropped as u64);
            let _ = self
                .events_tx
                .send(ProcessorEvent::PartialsDropped(outcome.dropped));
        }
        if let Some(best) = outcome.emitted {
            self.accept_partial(best, now).await;
        }

        if self.mode == ProcessorMode::PartialsEnabled
            && self.audio_flowing(now)
            && now.duration_since(self.last_result_at) >= self.config.silence_window
        {
            self.enter_fallback("no recognizer output while audio flowing");
        }

        self.maybe_cleanup(now).await;
    }

    /// Orphan reclamation and dedup sweep, spaced at least five seconds
    /// apart regardless of how often it is invoked.
    async fn maybe_cleanup(&mut self, now: Instant) {
        if now.duration_since(self.last_cleanup) < self.config.cleanup_interval {
            return;
        }
        self.last_cleanup = now;

        let orphan_ids = self.buffer.orphans(now, self.config.orphan_timeout);
        let mut flushed = 0usize;
        for id in orphan_ids {
            let Some(entry) = self.buffer.remove_by_id(&id) else {
                continue;
            };
            if entry.forwarded {
                continue;
            }
            // Missing final: forward the buffered text as a synthetic
            // complete segment unless it already went out.
            if self.forward_gated(
                entry.partial.text.clone(),
                None,
                false,
                entry.partial.stability,
                entry.partial.origin_timestamp_ms,
                now,
            ) {
                flushed += 1;
            }
        }
        if flushed > 0 {
            metrics::counter!("orphaned_results_flushed_total").increment(flushed as u64);
            let _ = self
                .events_tx
                .send(ProcessorEvent::OrphansFlushed(flushed));
            tracing::info!(
                session_id = %self.config.session_id,
                flushed,
                "flushed orphaned partials as synthetic finals"
            );
        }

        let swept = self.dedup.maybe_sweep(now);
        if swept > 0 {
            tracing::debug!(
                session_id = %self.config.session_id,
                swept,
                "dedup cache swept expired entries"
            );
        }
    }

    fn audio_flowing(&self, now: Instant) -> bool {
        match self.audio.last() {
            Some(at) => now.duration_since(at) < self.config.silence_window,
            None => false,
        }
    }

    fn enter_fallback(&mut self, reason: &str) {
        if self.mode == ProcessorMode::FinalsOnly {
            return;
        }
        self.mode = ProcessorMode::FinalsOnly;
        metrics::counter!("transcribe_fallback_triggered_total").increment(1);
        tracing::warn!(
            session_id = %self.config.session_id,
            reason,
            "entering finals-only fallback"
        );
        let _ = self.events_tx.send(ProcessorEvent::FallbackTriggered);
    }
}

/// Levenshtein edit distance, case-insensitive, two-row DP.
pub fn levenshtein(s1: &str, s2: &str) -> usize {
    let s1_chars: Vec<char> = s1.chars().collect();
    let s2_chars: Vec<char> = s2.chars().collect();
    let len1 = s1_chars.len();
    let len2 = s2_chars.len();

    if len1 == 0 {
        return len2;
    }
    if len2 == 0 {
        return len1;
    }

    let mut prev_row: Vec<usize> = (0..=len2).collect();
    let mut curr_row: Vec<usize> = vec![0; len2 + 1];

    for i in 1..=len1 {
        curr_row[0] = i;
        for j in 1..=len2 {
            let cost = if s1_chars[i - 1].to_lowercase().next()
                == s2_chars[j - 1].to_lowercase().next()
            {
                0
            } else {
                1
            };
            curr_row[j] = std::cmp::min(
                std::cmp::min(prev_row[j] + 1, curr_row[j - 1] + 1),
                prev_row[j - 1] + cost,
            );
        }
        std::mem::swap(&mut prev_row, &mut curr_row);
    }

    prev_row[len2]
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
