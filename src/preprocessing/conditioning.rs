//! Signal conditioning for LTC decoding
//!
//! Turns raw samples of unknown level and offset into a bounded, zero-centred signal:
//! - DC removal by subtracting a running mean
//! - Normalization against a slowly decaying peak hold, clamped to [-1.0, 1.0]
//! - An envelope follower that scales the hysteresis band, so the band follows level
//!   changes (tape dropouts, fades) instead of sitting at a fixed constant
//! - Peak and noise-floor statistics for diagnostics and the insufficient-signal check
//!
//! # Example
//!
//! ```
//! use ltc_dsp::preprocessing::conditioning::SignalConditioner;
//! use ltc_dsp::DecoderConfig;
//!
//! let config = DecoderConfig::default();
//! let mut conditioner = SignalConditioner::new(48000, &config);
//! let y = conditioner.process(0.5);
//! assert!((-1.0..=1.0).contains(&y));
//! ```

use crate::config::DecoderConfig;
use crate::error::DecodeError;
use serde::{Deserialize, Serialize};

/// Numerical stability epsilon for divisions and logarithms
const EPSILON: f32 = 1e-10;

/// Block duration for the noise-floor estimate
const NOISE_BLOCK_MS: f32 = 10.0;

/// DC time constants to wait before level statistics are trusted
const SETTLE_TIME_CONSTANTS: f32 = 8.0;

/// Hysteresis band handed to the edge detector
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HysteresisThresholds {
    /// Level the signal must exceed to count as high
    pub upper: f32,
    /// Level the signal must fall below to count as low
    pub lower: f32,
}

/// Level statistics gathered while conditioning
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalStats {
    /// Largest DC-removed magnitude in dBFS
    pub peak_db: f32,
    /// Quietest 10 ms block RMS in dBFS
    pub noise_floor_db: f32,
    /// Final running-mean DC offset (linear)
    pub dc_offset: f32,
}

/// Streaming signal conditioner
///
/// Holds only a handful of running values, so it conditions inputs of any length in
/// constant memory.
#[derive(Debug, Clone)]
pub struct SignalConditioner {
    dc_alpha: f32,
    mean: f32,
    peak_hold: f32,
    peak_decay: f32,
    envelope: f32,
    envelope_release: f32,
    hysteresis_fraction: f32,
    floor: f32,
    max_peak: f32,
    raw_peak: f32,
    settle_samples: u64,
    block_len: usize,
    block_energy: f32,
    block_count: usize,
    min_block_rms: f32,
    samples_seen: u64,
}

impl SignalConditioner {
    /// Create a conditioner for the given sample rate
    pub fn new(sample_rate: u32, config: &DecoderConfig) -> Self {
        let sr = sample_rate.max(1) as f32;
        let per_sample = |ms: f32| (ms / 1000.0 * sr).max(1.0);

        Self {
            dc_alpha: 1.0 - (-1.0 / per_sample(config.dc_time_constant_ms)).exp(),
            mean: 0.0,
            peak_hold: 0.0,
            // Half-life decay: after `peak_hold_ms` the hold has fallen to 50%
            peak_decay: 0.5_f32.powf(1.0 / per_sample(config.peak_hold_ms)),
            envelope: 0.0,
            envelope_release: (-1.0 / per_sample(config.envelope_release_ms)).exp(),
            hysteresis_fraction: config.hysteresis_fraction,
            floor: config.min_amplitude_linear(),
            max_peak: 0.0,
            raw_peak: 0.0,
            settle_samples: (SETTLE_TIME_CONSTANTS * per_sample(config.dc_time_constant_ms)) as u64,
            block_len: per_sample(NOISE_BLOCK_MS) as usize,
            block_energy: 0.0,
            block_count: 0,
            min_block_rms: f32::INFINITY,
            samples_seen: 0,
        }
    }

    /// Condition one sample
    ///
    /// Returns the DC-removed, normalized sample in [-1.0, 1.0], or 0.0 while the held
    /// peak is below the amplitude floor (the edge detector then sees silence).
    pub fn process(&mut self, sample: f32) -> f32 {
        let sample = if sample.is_finite() { sample } else { 0.0 };
        self.samples_seen += 1;

        self.mean += self.dc_alpha * (sample - self.mean);
        let centred = sample - self.mean;
        let magnitude = centred.abs();

        self.raw_peak = self.raw_peak.max(magnitude);
        if self.is_settled() {
            self.max_peak = self.max_peak.max(magnitude);
            self.track_noise_floor(centred);
        }
        self.peak_hold = (self.peak_hold * self.peak_decay).max(magnitude);

        if self.peak_hold < self.floor {
            self.envelope *= self.envelope_release;
            return 0.0;
        }

        let normalized = (centred / self.peak_hold).clamp(-1.0, 1.0);
        self.envelope = (self.envelope * self.envelope_release).max(normalized.abs());
        normalized
    }

    /// Current hysteresis band in normalized units
    pub fn thresholds(&self) -> HysteresisThresholds {
        let band = self.hysteresis_fraction * self.envelope.max(EPSILON);
        HysteresisThresholds {
            upper: band,
            lower: -band,
        }
    }

    /// Statistics gathered so far
    pub fn stats(&self) -> SignalStats {
        let noise_floor = if self.min_block_rms.is_finite() {
            self.min_block_rms
        } else {
            // Less than one block seen: fall back to the running block energy
            (self.block_energy / self.block_count.max(1) as f32).sqrt()
        };
        SignalStats {
            peak_db: to_db(self.peak()),
            noise_floor_db: to_db(noise_floor),
            dc_offset: self.mean,
        }
    }

    /// Fail if the signal never rose above the amplitude floor
    ///
    /// # Errors
    ///
    /// Returns `DecodeError::InsufficientSignal` with the measured peak level
    pub fn check_sufficient(&self) -> Result<(), DecodeError> {
        if self.peak() < self.floor {
            return Err(DecodeError::InsufficientSignal(format!(
                "peak level {:.1} dBFS is below the {:.1} dBFS floor",
                to_db(self.peak()),
                to_db(self.floor)
            )));
        }
        Ok(())
    }

    /// Samples processed so far
    pub fn samples_seen(&self) -> u64 {
        self.samples_seen
    }

    fn is_settled(&self) -> bool {
        self.samples_seen > self.settle_samples
    }

    /// Largest DC-removed magnitude, ignoring the DC remover's start-up transient when
    /// enough input has been seen
    fn peak(&self) -> f32 {
        if self.is_settled() {
            self.max_peak
        } else {
            self.raw_peak
        }
    }

    fn track_noise_floor(&mut self, centred: f32) {
        self.block_energy += centred * centred;
        self.block_count += 1;
        if self.block_count >= self.block_len {
            let rms = (self.block_energy / self.block_count as f32).sqrt();
            self.min_block_rms = self.min_block_rms.min(rms);
            self.block_energy = 0.0;
            self.block_count = 0;
        }
    }
}

/// Measure a complete buffer without keeping its conditioned output
///
/// Used by the batch entry point to reject silent input before any edge or sync work.
pub fn measure(samples: &[f32], sample_rate: u32, config: &DecoderConfig) -> SignalConditioner {
    let mut conditioner = SignalConditioner::new(sample_rate, config);
    for &s in samples {
        conditioner.process(s);
    }
    conditioner
}

/// Convert a linear amplitude to dBFS
pub fn to_db(linear: f32) -> f32 {
    20.0 * linear.max(EPSILON).log10()
}
