//! Emotion analyzer
//!
//! Volume and speaking-rate detection run in parallel per audio frame on
//! the blocking pool, off the I/O path, then fold into the per-session
//! `EmotionSample` slot. The latest sample wins; the slot is cleared when
//! the session ends. A failed detector degrades to neutral defaults and
//! never blocks the pipeline.

pub mod rate;
pub mod volume;

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

use babelcast_core::{
    AudioFrame, EmotionSample, EmotionTone, RateClass, SessionId, VolumeClass,
};

use rate::RateDetector;
use volume::{normalized_volume, VolumeDetector};

/// Per-session latest-wins emotion slots.
#[derive(Default)]
pub struct EmotionRegistry {
    samples: DashMap<SessionId, EmotionSample>,
}

impl EmotionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, session_id: &SessionId) -> Option<EmotionSample> {
        self.samples.get(session_id).map(|s| s.clone())
    }

    pub fn set(&self, session_id: SessionId, sample: EmotionSample) {
        self.samples.insert(session_id, sample);
    }

    pub fn clear(&self, session_id: &SessionId) {
        self.samples.remove(session_id);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

struct SessionDetectors {
    volume: Mutex<VolumeDetector>,
    rate: Mutex<RateDetector>,
}

/// Analyzer front-end: feeds frames through both detectors in parallel.
pub struct EmotionAnalyzer {
    registry: Arc<EmotionRegistry>,
    detectors: DashMap<SessionId, Arc<SessionDetectors>>,
}

impl EmotionAnalyzer {
    pub fn new(registry: Arc<EmotionRegistry>) -> Self {
        Self {
            registry,
            detectors: DashMap::new(),
        }
    }

    pub fn registry(&self) -> Arc<EmotionRegistry> {
        self.registry.clone()
    }

    /// Analyze one frame and update the session's emotion slot. Volume and
    /// rate run concurrently; the frame budget is well inside the 100 ms
    /// frame cadence.
    pub async fn submit(&self, session_id: &SessionId, frame: AudioFrame) {
        let detectors = self
            .detectors
            .entry(session_id.clone())
            .or_insert_with(|| {
                Arc::new(SessionDetectors {
                    volume: Mutex::new(VolumeDetector::new()),
                    rate: Mutex::new(RateDetector::new()),
                })
            })
            .clone();

        let samples_for_volume = frame.samples.clone();
        let samples_for_rate = frame.samples.clone();
        let frame_ts = frame.origin_timestamp_ms;

        let volume_task = {
            let detectors = detectors.clone();
            tokio::task::spawn_blocking(move || {
                detectors.volume.lock().analyze(&samples_for_volume)
            })
        };
        let rate_task = tokio::task::spawn_blocking(move || {
            detectors.rate.lock().analyze(&samples_for_rate, frame_ts)
        });

        let (volume_result, rate_result) = tokio::join!(volume_task, rate_task);

        let sample = match (volume_result, rate_result) {
            (Ok(volume), Ok(rate)) => {
                let normalized = normalized_volume(volume.rms_db);
                let (tone, intensity) = derive_tone(volume.class, rate.class, normalized, rate.multiplier);
                EmotionSample {
                    volume: normalized,
                    rate: rate.multiplier,
                    energy: normalized,
                    volume_db: volume.rms_db,
                    rate_wpm: rate.wpm,
                    volume_class: volume.class,
                    rate_class: rate.class,
                    tone,
                    intensity,
                    produced_at_ms: frame_ts,
                }
            }
            (volume_result, rate_result) => {
                if let Err(e) = volume_result {
                    tracing::warn!(session_id = %session_id, error = %e, "volume detector failed");
                }
                if let Err(e) = rate_result {
                    tracing::warn!(session_id = %session_id, error = %e, "rate detector failed");
                }
                EmotionSample::neutral(frame_ts)
            }
        };

        self.registry.set(session_id.clone(), sample);
    }

    /// Drop per-session state on session end.
    pub fn end_session(&self, session_id: &SessionId) {
        self.detectors.remove(session_id);
        self.registry.clear(session_id);
    }
}

/// Fold volume and rate classes into a coarse tone for SSML shaping.
fn derive_tone(
    volume: VolumeClass,
    rate: RateClass,
    normalized_volume: f32,
    rate_multiplier: f32,
) -> (EmotionTone, f32) {
    let intensity = ((normalized_volume - 0.5).abs().max((rate_multiplier - 1.0).abs())
        * 2.0)
        .clamp(0.0, 1.0);

    let tone = match (volume, rate) {
        (VolumeClass::VeryLoud, RateClass::Fast | RateClass::VeryFast) => EmotionTone::Angry,
        (VolumeClass::Loud | VolumeClass::VeryLoud, RateClass::VeryFast) => EmotionTone::Excited,
        (VolumeClass::Loud, RateClass::Fast) => EmotionTone::Excited,
        (VolumeClass::Medium | VolumeClass::Loud, RateClass::VeryFast) => EmotionTone::Surprised,
        (VolumeClass::Whisper | VolumeClass::Soft, RateClass::VerySlow | RateClass::Slow) => {
            EmotionTone::Sad
        }
        (VolumeClass::Whisper, RateClass::Fast | RateClass::VeryFast) => EmotionTone::Fearful,
        _ => EmotionTone::Neutral,
    };
    (tone, intensity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn submit_updates_registry_latest_wins() {
        let analyzer = EmotionAnalyzer::new(Arc::new(EmotionRegistry::new()));
        let session = "golden-eagle-427".to_string();

        let quiet = AudioFrame::new(vec![0.001; 1600], 0, 100);
        analyzer.submit(&session, quiet).await;
        let first = analyzer.registry().get(&session).unwrap();
        assert_eq!(first.produced_at_ms, 100);

        let loud = AudioFrame::new(vec![0.7; 1600], 1, 200);
        analyzer.submit(&session, loud).await;
        let second = analyzer.registry().get(&session).unwrap();
        assert_eq!(second.produced_at_ms, 200);
        assert!(second.volume > first.volume);
    }

    #[tokio::test]
    async fn end_session_clears_slot() {
        let analyzer = EmotionAnalyzer::new(Arc::new(EmotionRegistry::new()));
        let session = "golden-eagle-427".to_string();
        analyzer.submit(&session, AudioFrame::new(vec![0.1; 1600], 0, 0)).await;
        assert!(analyzer.registry().get(&session).is_some());

        analyzer.end_session(&session);
        assert!(analyzer.registry().get(&session).is_none());
    }

    #[test]
    fn tone_derivation_maps_extremes() {
        let (tone, intensity) = derive_tone(VolumeClass::VeryLoud, RateClass::VeryFast, 1.0, 2.0);
        assert_eq!(tone, EmotionTone::Angry);
        assert!(intensity > 0.7);

        let (tone, _) = derive_tone(VolumeClass::Soft, RateClass::VerySlow, 0.2, 0.5);
        assert_eq!(tone, EmotionTone::Sad);

        let (tone, _) = derive_tone(VolumeClass::Medium, RateClass::Medium, 0.5, 1.0);
        assert_eq!(tone, EmotionTone::Neutral);
    }
}
