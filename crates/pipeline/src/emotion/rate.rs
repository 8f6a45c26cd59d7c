//! Speaking-rate detection
//!
//! Spectral-flux onset detection: each 512-sample window is Hann-weighted
//! and FFT'd, and the positive magnitude difference against the previous
//! spectrum forms the flux. A flux spike above the running baseline counts
//! as a syllable onset. Onsets per second convert to words per minute at
//! roughly 1.5 syllables per word, then into the prosody multiplier.

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::collections::VecDeque;
use std::sync::Arc;

use babelcast_core::audio::SAMPLE_RATE_HZ;
use babelcast_core::RateClass;

const FFT_SIZE: usize = 512;
const HOP_SIZE: usize = 256;

/// Syllables per word used for the WPM estimate.
const SYLLABLES_PER_WORD: f32 = 1.5;

/// Onsets are counted over this trailing window.
const ONSET_WINDOW_MS: u64 = 2_000;

/// Flux must exceed baseline by this factor to count as an onset.
const ONSET_FACTOR: f32 = 1.5;

/// Absolute flux floor that filters silence.
const ONSET_MIN_FLUX: f32 = 0.05;

/// Consecutive onsets closer than this are one syllable.
const MIN_ONSET_GAP_MS: u64 = 60;

const FLUX_HISTORY: usize = 32;

#[derive(Debug, Clone, Copy)]
pub struct RateReading {
    pub wpm: f32,
    pub class: RateClass,
    /// Prosody multiplier in [0.5, 2.0], 1.0 = nominal 150 wpm.
    pub multiplier: f32,
}

pub struct RateDetector {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    carry: Vec<f32>,
    prev_magnitudes: Vec<f32>,
    flux_history: VecDeque<f32>,
    onset_times_ms: VecDeque<u64>,
    last_onset_ms: u64,
}

impl Default for RateDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl RateDetector {
    pub fn new() -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(FFT_SIZE);
        let window = (0..FFT_SIZE)
            .map(|i| {
                let phase = std::f32::consts::TAU * i as f32 / (FFT_SIZE - 1) as f32;
                0.5 * (1.0 - phase.cos())
            })
            .collect();
        Self {
            fft,
            window,
            carry: Vec::new(),
            prev_magnitudes: vec![0.0; FFT_SIZE / 2],
            flux_history: VecDeque::with_capacity(FLUX_HISTORY),
            onset_times_ms: VecDeque::new(),
            last_onset_ms: 0,
        }
    }

    /// Analyze one frame of samples stamped at `frame_ts_ms`.
    pub fn analyze(&mut self, samples: &[f32], frame_ts_ms: u64) -> RateReading {
        self.carry.extend_from_slice(samples);

        let mut offset = 0usize;
        while self.carry.len() - offset >= FFT_SIZE {
            let hop_ts = frame_ts_ms
                + ((offset as u64) * 1_000) / SAMPLE_RATE_HZ as u64;
            let frame: Vec<f32> = self.carry[offset..offset + FFT_SIZE].to_vec();
            let flux = self.flux_of(&frame);
            self.observe_flux(flux, hop_ts);
            offset += HOP_SIZE;
        }
        self.carry.drain(..offset);

        self.prune_onsets(frame_ts_ms);
        let window_secs = (ONSET_WINDOW_MS as f32) / 1_000.0;
        let syllables_per_sec = self.onset_times_ms.len() as f32 / window_secs;
        let wpm = syllables_per_sec * 60.0 / SYLLABLES_PER_WORD;
        let multiplier = (wpm / 150.0).clamp(0.5, 2.0);

        RateReading {
            wpm,
            class: RateClass::from_wpm(wpm),
            multiplier,
        }
    }

    fn flux_of(&mut self, frame: &[f32]) -> f32 {
        let mut buf: Vec<Complex<f32>> = frame
            .iter()
            .zip(self.window.iter())
            .map(|(s, w)| Complex::new(s * w, 0.0))
            .collect();
        self.fft.process(&mut buf);

        let mut flux = 0.0f32;
        for (bin, value) in buf.iter().take(FFT_SIZE / 2).enumerate() {
            let magnitude = value.norm() / FFT_SIZE as f32;
            let diff = magnitude - self.prev_magnitudes[bin];
            if diff > 0.0 {
                flux += diff;
            }
            self.prev_magnitudes[bin] = magnitude;
        }
        flux
    }

    fn observe_flux(&mut self, flux: f32, ts_ms: u64) {
        let baseline = if self.flux_history.is_empty() {
            0.0
        } else {
            self.flux_history.iter().sum::<f32>() / self.flux_history.len() as f32
        };

        let is_onset = flux > ONSET_MIN_FLUX
            && flux > baseline * ONSET_FACTOR
            && ts_ms.saturating_sub(self.last_onset_ms) >= MIN_ONSET_GAP_MS;
        if is_onset {
            self.last_onset_ms = ts_ms;
            self.onset_times_ms.push_back(ts_ms);
        }

        if self.flux_history.len() == FLUX_HISTORY {
            self.flux_history.pop_front();
        }
        self.flux_history.push_back(flux);
    }

    fn prune_onsets(&mut self, now_ms: u64) {
        while let Some(&front) = self.onset_times_ms.front() {
            if now_ms.saturating_sub(front) > ONSET_WINDOW_MS {
                self.onset_times_ms.pop_front();
            } else {
                break;
            }
        }
    }
}
