//! Audio frame types and utilities
//!
//! The relay speaks exactly one format end to end: 16-bit signed PCM,
//! little-endian, 16 kHz, mono. Frames are decoded once at the ingress
//! boundary and carried as normalized f32 samples for analysis.

use std::sync::Arc;
use std::time::Duration;

/// Sample rate the relay operates at.
pub const SAMPLE_RATE_HZ: u32 = 16_000;

/// PCM16 normalization constant (decode path).
const PCM16_NORMALIZE: f32 = 32_768.0;

/// PCM16 scaling constant (encode path).
const PCM16_SCALE: f32 = 32_767.0;

/// Decoded audio frame with metadata.
///
/// Samples are f32 normalized to [-1.0, 1.0].
#[derive(Clone)]
pub struct AudioFrame {
    /// Raw audio samples
    pub samples: Arc<[f32]>,
    /// Frame sequence number for ordering
    pub sequence: u64,
    /// Speaker-side capture timestamp in epoch milliseconds
    pub origin_timestamp_ms: u64,
    /// Duration of this frame
    pub duration: Duration,
    /// RMS energy level in dB
    pub energy_db: f32,
}

impl std::fmt::Debug for AudioFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioFrame")
            .field("samples_len", &self.samples.len())
            .field("sequence", &self.sequence)
            .field("origin_timestamp_ms", &self.origin_timestamp_ms)
            .field("duration", &self.duration)
            .field("energy_db", &self.energy_db)
            .finish()
    }
}

impl AudioFrame {
    /// Create a frame from f32 samples.
    pub fn new(samples: Vec<f32>, sequence: u64, origin_timestamp_ms: u64) -> Self {
        let duration = Duration::from_secs_f64(samples.len() as f64 / SAMPLE_RATE_HZ as f64);
        let energy_db = rms_db(&samples);
        Self {
            samples: samples.into(),
            sequence,
            origin_timestamp_ms,
            duration,
            energy_db,
        }
    }

    /// Decode PCM16 little-endian bytes into a frame.
    pub fn from_pcm16(bytes: &[u8], sequence: u64, origin_timestamp_ms: u64) -> Self {
        let samples: Vec<f32> = bytes
            .chunks_exact(2)
            .map(|chunk| {
                let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
                sample as f32 / PCM16_NORMALIZE
            })
            .collect();
        Self::new(samples, sequence, origin_timestamp_ms)
    }

    /// Encode the frame back to PCM16 little-endian bytes.
    pub fn to_pcm16(&self) -> Vec<u8> {
        self.samples
            .iter()
            .flat_map(|&sample| {
                let clamped = sample.clamp(-1.0, 1.0);
                let pcm16 = (clamped * PCM16_SCALE) as i16;
                pcm16.to_le_bytes()
            })
            .collect()
    }

    /// Duration in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        self.duration.as_millis() as u64
    }

    /// Whether the frame is likely silence given an energy threshold.
    pub fn is_likely_silence(&self, threshold_db: f32) -> bool {
        self.energy_db < threshold_db
    }
}

/// RMS energy of a sample slice in decibels relative to full scale.
pub fn rms_db(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return -96.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    let rms = (sum_squares / samples.len() as f32).sqrt();
    if rms > 0.0 {
        20.0 * rms.log10()
    } else {
        -96.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm16_round_trip() {
        let pcm16: Vec<u8> = vec![0x00, 0x40, 0x00, 0xC0];
        let frame = AudioFrame::from_pcm16(&pcm16, 0, 0);
        assert_eq!(frame.samples.len(), 2);
        assert!(frame.samples[0] > 0.0);
        assert!(frame.samples[1] < 0.0);

        let encoded = frame.to_pcm16();
        assert_eq!(encoded.len(), 4);
    }

    #[test]
    fn energy_of_silence_and_signal() {
        let silent = AudioFrame::new(vec![0.0; 160], 0, 0);
        assert!(silent.energy_db < -90.0);
        assert!(silent.is_likely_silence(-50.0));

        let loud = AudioFrame::new(vec![0.5; 160], 0, 0);
        assert!(loud.energy_db > -10.0);
        assert!(!loud.is_likely_silence(-50.0));
    }

    #[test]
    fn frame_duration() {
        // 1600 samples at 16 kHz = 100 ms
        let frame = AudioFrame::new(vec![0.1; 1600], 0, 0);
        assert_eq!(frame.duration_ms(), 100);
    }
}
