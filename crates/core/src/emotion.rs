//! Emotion sample types
//!
//! The emotion analyzer folds per-frame volume and speaking-rate readings
//! into a per-session sample. The latest sample wins; there is no TTL. The
//! sample carries both the normalized multipliers used for prosody shaping
//! and the raw dB / WPM readings plus categorical classes for SSML.

use serde::{Deserialize, Serialize};

/// Volume classification from dB cutoffs on normalized amplitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeClass {
    Whisper,
    Soft,
    Medium,
    Loud,
    VeryLoud,
}

impl VolumeClass {
    /// Classify an RMS level in dB relative to full scale.
    pub fn from_db(db: f32) -> Self {
        if db < -30.0 {
            VolumeClass::Whisper
        } else if db < -20.0 {
            VolumeClass::Soft
        } else if db < -10.0 {
            VolumeClass::Medium
        } else if db < -3.0 {
            VolumeClass::Loud
        } else {
            VolumeClass::VeryLoud
        }
    }
}

/// Speaking-rate classification from words-per-minute cutoffs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateClass {
    VerySlow,
    Slow,
    Medium,
    Fast,
    VeryFast,
}

impl RateClass {
    pub fn from_wpm(wpm: f32) -> Self {
        if wpm < 100.0 {
            RateClass::VerySlow
        } else if wpm < 130.0 {
            RateClass::Slow
        } else if wpm < 160.0 {
            RateClass::Medium
        } else if wpm < 190.0 {
            RateClass::Fast
        } else {
            RateClass::VeryFast
        }
    }
}

/// Coarse emotional tone derived from volume and rate, used only for SSML
/// emphasis and break rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmotionTone {
    Neutral,
    Excited,
    Angry,
    Surprised,
    Sad,
    Fearful,
}

/// Latest per-session emotion reading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmotionSample {
    /// Normalized volume in [0, 1]
    pub volume: f32,
    /// Speaking-rate multiplier in [0.5, 2.0]
    pub rate: f32,
    /// Energy (tracks volume)
    pub energy: f32,
    /// Raw RMS level in dB
    pub volume_db: f32,
    /// Estimated words per minute
    pub rate_wpm: f32,
    pub volume_class: VolumeClass,
    pub rate_class: RateClass,
    pub tone: EmotionTone,
    /// Tone intensity in [0, 1]
    pub intensity: f32,
    /// Epoch milliseconds when the sample was produced
    pub produced_at_ms: u64,
}

impl EmotionSample {
    /// Neutral defaults used when a detector fails.
    pub fn neutral(produced_at_ms: u64) -> Self {
        Self {
            volume: 0.5,
            rate: 1.0,
            energy: 0.5,
            volume_db: -20.0,
            rate_wpm: 145.0,
            volume_class: VolumeClass::Medium,
            rate_class: RateClass::Medium,
            tone: EmotionTone::Neutral,
            intensity: 0.0,
            produced_at_ms,
        }
    }
}
