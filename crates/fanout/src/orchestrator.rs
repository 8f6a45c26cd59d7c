//! Fan-out orchestrator
//!
//! One forward: discover the session's listener languages, then per
//! language — cache-first translate, SSML composition from the emotion
//! sample, synthesis — and broadcast to each subscribed listener. Each
//! language runs on its own task; an error in one language drops only that
//! language. A session end flips the session's cancellation flag and
//! in-flight forwards discard their results between stages.

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

use babelcast_core::{
    ConnectionId, ForwardPayload, ForwardSink, LanguageTag, ListenerDirectory, MachineTranslator,
    ServerFrame, SessionId, SpeechSynthesizer, UpstreamError,
};
use babelcast_config::FanoutConfig;
use babelcast_translation::{build_ssml, cache_key, voice_for, TranslationCache};

use crate::broadcast::Broadcaster;
use crate::retry::with_retries;

pub struct FanoutOrchestrator {
    directory: Arc<dyn ListenerDirectory>,
    translator: Arc<dyn MachineTranslator>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    cache: Arc<TranslationCache>,
    broadcaster: Arc<Broadcaster>,
    translate_timeout: Duration,
    synthesize_timeout: Duration,
    cancellations: DashMap<SessionId, watch::Sender<bool>>,
}

impl FanoutOrchestrator {
    pub fn new(
        directory: Arc<dyn ListenerDirectory>,
        translator: Arc<dyn MachineTranslator>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        cache: Arc<TranslationCache>,
        broadcaster: Arc<Broadcaster>,
        config: &FanoutConfig,
    ) -> Self {
        Self {
            directory,
            translator,
            synthesizer,
            cache,
            broadcaster,
            translate_timeout: Duration::from_secs(config.translate_timeout_secs),
            synthesize_timeout: Duration::from_secs(config.synthesize_timeout_secs),
            cancellations: DashMap::new(),
        }
    }

    pub fn cache(&self) -> Arc<TranslationCache> {
        self.cache.clone()
    }

    /// Cancel all in-flight forwards for a session (cooperative: running
    /// upstream calls finish but their results are discarded).
    pub fn cancel_session(&self, session_id: &SessionId) {
        if let Some((_, tx)) = self.cancellations.remove(session_id) {
            let _ = tx.send(true);
        }
    }

    fn cancel_flag(&self, session_id: &SessionId) -> watch::Receiver<bool> {
        self.cancellations
            .entry(session_id.clone())
            .or_insert_with(|| watch::channel(false).0)
            .subscribe()
    }

    async fn forward_language(
        &self,
        payload: &ForwardPayload,
        language: LanguageTag,
        listeners: Vec<ConnectionId>,
        cancelled: watch::Receiver<bool>,
        muted: bool,
        volume: f32,
    ) -> Result<(), UpstreamError> {
        // Translate, cache-first.
        let key = cache_key(&payload.source_language, &language, &payload.text);
        let translated = match self.cache.get(&key, Instant::now()) {
            Some(hit) => {
                metrics::counter!("translation_cache_hits_total").increment(1);
                hit
            }
            None => {
                metrics::counter!("translation_cache_misses_total").increment(1);
                let text = payload.text.clone();
                let source = payload.source_language.clone();
                let target = language.clone();
                let translator = self.translator.clone();
                let translated = with_retries("translate", self.translate_timeout, move || {
                    let translator = translator.clone();
                    let text = text.clone();
                    let source = source.clone();
                    let target = target.clone();
                    async move { translator.translate(&text, &source, &target).await }
                })
                .await?;
                self.cache.insert(key, translated.clone(), Instant::now());
                translated
            }
        };

        if *cancelled.borrow() {
            return Ok(());
        }

        // Deliver the translated transcript even when audio is muted.
        let transcript_frame = if payload.is_partial {
            ServerFrame::PartialTranscript {
                session_id: payload.session_id.clone(),
                text: translated.clone(),
                stability: payload.stability,
                origin_timestamp: payload.origin_timestamp_ms,
            }
        } else {
            ServerFrame::FinalTranscript {
                session_id: payload.session_id.clone(),
                text: translated.clone(),
                language: language.clone(),
                origin_timestamp: payload.origin_timestamp_ms,
            }
        };
        for connection_id in &listeners {
            self.broadcaster
                .deliver_frame(connection_id, transcript_frame.clone())
                .await;
        }

        if muted {
            return Ok(());
        }

        // Synthesize with a language-appropriate neural voice.
        let voice = match voice_for(&language) {
            Some(voice) => voice,
            None => {
                tracing::warn!(language = %language, "no neural voice, dropping language");
                return Err(UpstreamError::permanent(format!(
                    "no voice for language {language}"
                )));
            }
        };
        let ssml = build_ssml(&translated, payload.emotion.as_ref());
        let synthesizer = self.synthesizer.clone();
        let mut audio = with_retries("synthesize", self.synthesize_timeout, move || {
            let synthesizer = synthesizer.clone();
            let ssml = ssml.clone();
            async move { synthesizer.synthesize(&ssml, voice).await }
        })
        .await?;

        if *cancelled.borrow() {
            return Ok(());
        }

        if (volume - 1.0).abs() > f32::EPSILON {
            scale_pcm16(&mut audio, volume);
        }

        // Broadcast to every listener of this language.
        let sends = listeners.iter().map(|connection_id| {
            self.broadcaster.deliver_audio(
                &payload.session_id,
                connection_id,
                &language,
                audio.clone(),
                payload.is_partial,
                payload.origin_timestamp_ms,
            )
        });
        join_all(sends).await;
        Ok(())
    }
}

#[async_trait]
impl ForwardSink for FanoutOrchestrator {
    async fn forward(&self, payload: ForwardPayload) -> Result<(), UpstreamError> {
        let started = Instant::now();
        let control = self.directory.broadcast_control(&payload.session_id);
        if control.paused {
            tracing::debug!(session_id = %payload.session_id, "broadcast paused, skipping forward");
            return Ok(());
        }

        let listeners = self.directory.listeners_by_language(&payload.session_id);
        if listeners.values().all(|conns| conns.is_empty()) {
            return Ok(());
        }

        let cancelled = self.cancel_flag(&payload.session_id);

        // Per-language pipelines run concurrently; none blocks another and
        // an error in one drops only that language.
        let tasks = listeners.into_iter().filter(|(_, conns)| !conns.is_empty()).map(
            |(language, conns)| {
                let payload = &payload;
                let cancelled = cancelled.clone();
                let muted = control.muted;
                let volume = control.volume;
                async move {
                    let language_tag = language.clone();
                    if let Err(e) = self
                        .forward_language(payload, language, conns, cancelled, muted, volume)
                        .await
                    {
                        metrics::counter!("fanout_language_failures_total").increment(1);
                        tracing::warn!(
                            session_id = %payload.session_id,
                            language = %language_tag,
                            error = %e,
                            "language dropped from forward"
                        );
                    }
                }
            },
        );
        join_all(tasks).await;

        metrics::histogram!("fanout_forward_seconds").record(started.elapsed().as_secs_f64());
        Ok(())
    }
}

/// In-place gain scaling of little-endian PCM16.
fn scale_pcm16(audio: &mut [u8], gain: f32) {
    for chunk in audio.chunks_exact_mut(2) {
        let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
        let scaled = ((sample as f32) * gain).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        chunk.copy_from_slice(&scaled.to_le_bytes());
    }
}
