//! Volume detection
//!
//! Frame-wise RMS over 100 ms sub-frames, classified with fixed dB
//! cutoffs. The advisory SNR metric uses an adaptive noise floor: a very
//! quiet, steady second of audio is treated as a clean signal measured
//! against the quantization floor; otherwise the 10th-percentile sub-frame
//! RMS stands in for the noise level. Volume classification itself always
//! uses the raw RMS.

use std::collections::VecDeque;

use babelcast_core::audio::SAMPLE_RATE_HZ;
use babelcast_core::VolumeClass;

/// 100 ms sub-frame at 16 kHz.
const SUBFRAME_SAMPLES: usize = (SAMPLE_RATE_HZ as usize) / 10;

/// One second of sub-frame history.
const HISTORY_LEN: usize = 10;

/// Steadiness bound below which the signal counts as clean.
const CLEAN_STDDEV: f32 = 0.001;

/// Quantization noise floor amplitude for 16-bit samples.
const QUANTIZATION_FLOOR: f32 = 1.0 / 65_536.0;

#[derive(Debug, Clone, Copy)]
pub struct VolumeReading {
    pub rms: f32,
    pub rms_db: f32,
    pub class: VolumeClass,
    /// Advisory signal-to-noise ratio in dB.
    pub snr_db: f32,
}

pub struct VolumeDetector {
    history: VecDeque<f32>,
}

impl Default for VolumeDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl VolumeDetector {
    pub fn new() -> Self {
        Self {
            history: VecDeque::with_capacity(HISTORY_LEN),
        }
    }

    /// Analyze one frame of samples.
    pub fn analyze(&mut self, samples: &[f32]) -> VolumeReading {
        let mut frame_rms_sum = 0.0f32;
        let mut subframes = 0usize;
        for chunk in samples.chunks(SUBFRAME_SAMPLES) {
            if chunk.is_empty() {
                continue;
            }
            let rms = rms_of(chunk);
            self.push_history(rms);
            frame_rms_sum += rms;
            subframes += 1;
        }
        let rms = if subframes > 0 {
            frame_rms_sum / subframes as f32
        } else {
            0.0
        };
        let rms_db = to_db(rms);

        VolumeReading {
            rms,
            rms_db,
            class: VolumeClass::from_db(rms_db),
            snr_db: self.snr_db(rms),
        }
    }

    fn push_history(&mut self, rms: f32) {
        if self.history.len() == HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back(rms);
    }

    /// Advisory SNR against the adaptive noise floor.
    fn snr_db(&self, signal_rms: f32) -> f32 {
        if self.history.is_empty() {
            return 0.0;
        }
        let noise_floor = if self.history_stddev() < CLEAN_STDDEV {
            QUANTIZATION_FLOOR
        } else {
            self.percentile_10().max(QUANTIZATION_FLOOR)
        };
        to_db(signal_rms.max(QUANTIZATION_FLOOR)) - to_db(noise_floor)
    }

    fn history_stddev(&self) -> f32 {
        let n = self.history.len() as f32;
        let mean: f32 = self.history.iter().sum::<f32>() / n;
        let variance: f32 = self.history.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / n;
        variance.sqrt()
    }

    fn percentile_10(&self) -> f32 {
        let mut sorted: Vec<f32> = self.history.iter().copied().collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let idx = (sorted.len() as f32 * 0.10).floor() as usize;
        sorted[idx.min(sorted.len() - 1)]
    }
}

fn rms_of(samples: &[f32]) -> f32 {
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

fn to_db(amplitude: f32) -> f32 {
    if amplitude > 0.0 {
        20.0 * amplitude.log10()
    } else {
        -96.0
    }
}

/// Map a dB level to the normalized [0, 1] volume scale used by prosody.
pub fn normalized_volume(rms_db: f32) -> f32 {
    ((rms_db + 60.0) / 60.0).clamp(0.0, 1.0)
}
