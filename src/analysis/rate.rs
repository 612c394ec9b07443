//! Frame rate estimation from bit timing
//!
//! Every LTC frame is exactly 80 bits, so the bit period fixes the frame rate:
//! `fps = sample_rate / (bit_period * 80)`. Per-frame bit periods are accumulated with
//! Welford's online algorithm; the mean gives the rate and the spread gives the
//! confidence. The measurement is snapped to the nearest standard rate.

use crate::config::DecoderConfig;
use crate::features::frame::FRAME_BITS;
use crate::timecode::FrameRate;
use serde::{Deserialize, Serialize};

/// Frame rate estimate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateEstimate {
    /// Standard rate the measurement snapped to
    pub rate: FrameRate,

    /// Measured frames per second before snapping
    pub measured_fps: f64,

    /// Drop-frame numbering in use (majority of observed frames, 29.97 only)
    pub drop_frame: bool,

    /// Confidence (0.0-1.0) from the spread of per-frame bit periods
    pub confidence: f32,

    /// Measurement did not single out one standard rate
    pub ambiguous: bool,

    /// Frames the estimate is based on
    pub frames_observed: u64,

    /// Mean bit period in samples
    pub bit_period_samples: f64,
}

/// Result of snapping a measured rate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnappedRate {
    /// Closest standard rate
    pub rate: FrameRate,
    /// Relative error between the measurement and the chosen rate
    pub relative_error: f64,
    /// A neighboring rate was just as close
    pub ambiguous: bool,
}

/// Snap a measured frame rate to the nearest standard rate
///
/// When two rates lie within `ambiguity_tolerance` of the measurement, the drop-frame
/// flag decides between 29.97 and 30; otherwise the nearer rate wins and the result is
/// marked ambiguous.
pub fn snap_rate(measured_fps: f64, drop_frame_hint: bool, ambiguity_tolerance: f64) -> SnappedRate {
    let mut ranked: Vec<(FrameRate, f64)> = FrameRate::ALL
        .iter()
        .map(|&rate| (rate, (measured_fps - rate.fps()).abs() / rate.fps()))
        .collect();
    ranked.sort_by(|a, b| a.1.total_cmp(&b.1));

    let (best, best_err) = ranked[0];
    let (second, second_err) = ranked[1];
    if second_err > ambiguity_tolerance {
        return SnappedRate {
            rate: best,
            relative_error: best_err,
            ambiguous: false,
        };
    }

    let pair = [best, second];
    let drop_pair = pair.contains(&FrameRate::Fps29_97) && pair.contains(&FrameRate::Fps30);
    if drop_pair && drop_frame_hint {
        let err = if best == FrameRate::Fps29_97 { best_err } else { second_err };
        return SnappedRate {
            rate: FrameRate::Fps29_97,
            relative_error: err,
            ambiguous: false,
        };
    }

    SnappedRate {
        rate: best,
        relative_error: best_err,
        ambiguous: true,
    }
}

/// Streaming frame rate estimator
#[derive(Debug, Clone)]
pub struct FrameRateEstimator {
    sample_rate: f64,
    count: u64,
    mean: f64,
    m2: f64,
    drop_votes: u64,
    snap_tolerance: f64,
    ambiguity_tolerance: f64,
    min_confidence: f32,
    variation_reference: f64,
}

impl FrameRateEstimator {
    /// Create an estimator for the given sample rate
    pub fn new(sample_rate: u32, config: &DecoderConfig) -> Self {
        Self {
            sample_rate: sample_rate as f64,
            count: 0,
            mean: 0.0,
            m2: 0.0,
            drop_votes: 0,
            snap_tolerance: config.rate_snap_tolerance,
            ambiguity_tolerance: config.rate_ambiguity_tolerance,
            min_confidence: config.min_rate_confidence,
            variation_reference: config.rate_variation_reference,
        }
    }

    /// Add one frame's bit period (in samples) and its drop-frame flag
    pub fn observe(&mut self, bit_period: f64, drop_frame: bool) {
        if !bit_period.is_finite() || bit_period <= 0.0 {
            return;
        }
        self.count += 1;
        let delta = bit_period - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (bit_period - self.mean);
        if drop_frame {
            self.drop_votes += 1;
        }
    }

    /// Frames observed so far
    pub fn frames_observed(&self) -> u64 {
        self.count
    }

    /// Snap a single bit-period measurement, for use before any frame was observed
    pub fn rate_for_period(&self, bit_period: f64, drop_frame: bool) -> FrameRate {
        snap_rate(self.fps_for(bit_period), drop_frame, self.ambiguity_tolerance).rate
    }

    /// Current estimate, or `None` before the first observation
    pub fn estimate(&self) -> Option<RateEstimate> {
        if self.count == 0 {
            return None;
        }
        let measured_fps = self.fps_for(self.mean);
        let drop_majority = self.drop_votes * 2 > self.count;
        let snapped = snap_rate(measured_fps, drop_majority, self.ambiguity_tolerance);

        let confidence = if self.count < 2 {
            0.5
        } else {
            let variance = self.m2 / (self.count - 1) as f64;
            let cv = variance.sqrt() / self.mean;
            let ratio = cv / self.variation_reference;
            (1.0 / (1.0 + ratio * ratio)) as f32
        };

        let ambiguous = snapped.ambiguous
            || snapped.relative_error > self.snap_tolerance
            || confidence < self.min_confidence;

        Some(RateEstimate {
            rate: snapped.rate,
            measured_fps,
            drop_frame: drop_majority && snapped.rate.supports_drop_frame(),
            confidence,
            ambiguous,
            frames_observed: self.count,
            bit_period_samples: self.mean,
        })
    }

    fn fps_for(&self, bit_period: f64) -> f64 {
        self.sample_rate / (bit_period * FRAME_BITS as f64)
    }
}
