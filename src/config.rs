//! Configuration parameters for timecode decoding

use crate::error::DecodeError;

/// Decoder configuration parameters
///
/// The tolerance bands and the resynchronization budget are policy choices; the defaults
/// work on clean and moderately worn recordings and can be tuned per capture chain.
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    // Signal conditioning
    /// Minimum peak level in dBFS after DC removal (default: -50.0)
    /// Quieter input fails with `InsufficientSignal` before any sync search
    pub min_amplitude_db: f32,

    /// Time constant of the running-mean DC remover in milliseconds (default: 20.0)
    pub dc_time_constant_ms: f32,

    /// Half-life of the normalization peak hold in milliseconds (default: 500.0)
    pub peak_hold_ms: f32,

    /// Release time of the envelope that scales the hysteresis band (default: 20.0)
    pub envelope_release_ms: f32,

    // Edge detection
    /// Hysteresis band as a fraction of the tracked envelope (default: 0.2)
    pub hysteresis_fraction: f32,

    /// Minimum spacing between edges as a fraction of the shortest plausible
    /// half bit cell (default: 0.4). Closer crossings are merged away as noise
    pub min_edge_fraction: f64,

    /// Lowest plausible frame rate, including varispeed (default: 18.0)
    pub min_fps: f64,

    /// Highest plausible frame rate, including varispeed (default: 36.0)
    pub max_fps: f64,

    // Biphase demodulation
    /// Tolerance around half a bit period for "short" intervals (default: 0.2)
    /// A short interval lies within `0.5 ± short_tolerance` bit periods
    pub short_tolerance: f64,

    /// Tolerance around one bit period for "long" intervals (default: 0.3)
    pub long_tolerance: f64,

    /// Exponential smoothing coefficient for the bit-period estimate (default: 0.1)
    pub period_smoothing: f64,

    /// Number of edge intervals collected before the clock is seeded (default: 192)
    pub warmup_intervals: usize,

    /// Consecutive classification failures before the clock is re-seeded (default: 16)
    pub max_consecutive_failures: u32,

    /// Intervals longer than this many bit periods are treated as dropouts (default: 2.5)
    pub dropout_ratio: f64,

    // Frame synchronization
    /// Maximum bit shift tried while resynchronizing (default: 8)
    /// Offsets in `-w..=w` around the expected sync position make up the retry budget
    pub resync_window_bits: usize,

    // Stream assembly
    /// Consecutive frames that must agree on a new timeline before it replaces the
    /// current one (default: 2)
    pub relock_frames: usize,

    /// Minimum length of a contiguous run for the representative value (default: 2)
    pub min_run_frames: usize,

    /// Early termination: stop once a run of this many validated frames exists
    /// (default: None, decode the whole input)
    pub stop_after_frames: Option<usize>,

    /// Give up if no frame has synchronized within this many seconds of input
    /// (default: None, search the whole input)
    pub max_search_seconds: Option<f32>,

    // Frame rate estimation
    /// Maximum relative error for snapping to a standard rate (default: 0.03)
    pub rate_snap_tolerance: f64,

    /// Relative error under which two neighboring rates are indistinguishable
    /// (default: 0.0008)
    pub rate_ambiguity_tolerance: f64,

    /// Rate confidence below which the result is flagged `RateAmbiguous` (default: 0.5)
    pub min_rate_confidence: f32,

    /// Coefficient of variation of the bit period that halves rate confidence
    /// (default: 0.01)
    pub rate_variation_reference: f64,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            min_amplitude_db: -50.0,
            dc_time_constant_ms: 20.0,
            peak_hold_ms: 500.0,
            envelope_release_ms: 20.0,
            hysteresis_fraction: 0.2,
            min_edge_fraction: 0.4,
            min_fps: 18.0,
            max_fps: 36.0,
            short_tolerance: 0.2,
            long_tolerance: 0.3,
            period_smoothing: 0.1,
            warmup_intervals: 192,
            max_consecutive_failures: 16,
            dropout_ratio: 2.5,
            resync_window_bits: 8,
            relock_frames: 2,
            min_run_frames: 2,
            stop_after_frames: None,
            max_search_seconds: None,
            rate_snap_tolerance: 0.03,
            rate_ambiguity_tolerance: 0.0008,
            min_rate_confidence: 0.5,
            rate_variation_reference: 0.01,
        }
    }
}

impl DecoderConfig {
    /// Check that every parameter lies in a usable range
    ///
    /// # Errors
    ///
    /// Returns `DecodeError::InvalidInput` naming the first offending field
    pub fn validate(&self) -> Result<(), DecodeError> {
        fn invalid(msg: String) -> Result<(), DecodeError> {
            Err(DecodeError::InvalidInput(msg))
        }

        if !(0.0..1.0).contains(&self.hysteresis_fraction) || self.hysteresis_fraction == 0.0 {
            return invalid(format!(
                "hysteresis_fraction must be in (0, 1), got {}",
                self.hysteresis_fraction
            ));
        }
        if self.dc_time_constant_ms <= 0.0
            || self.peak_hold_ms <= 0.0
            || self.envelope_release_ms <= 0.0
        {
            return invalid("conditioner time constants must be positive".to_string());
        }
        if self.min_fps <= 0.0 || self.max_fps <= self.min_fps {
            return invalid(format!(
                "frame rate range must satisfy 0 < min_fps < max_fps, got {}..{}",
                self.min_fps, self.max_fps
            ));
        }
        if !(0.0..0.25).contains(&self.short_tolerance) || self.short_tolerance == 0.0 {
            return invalid(format!(
                "short_tolerance must be in (0, 0.25), got {}",
                self.short_tolerance
            ));
        }
        if !(0.0..0.5).contains(&self.long_tolerance) || self.long_tolerance == 0.0 {
            return invalid(format!(
                "long_tolerance must be in (0, 0.5), got {}",
                self.long_tolerance
            ));
        }
        if !(0.0..=1.0).contains(&self.period_smoothing) || self.period_smoothing == 0.0 {
            return invalid(format!(
                "period_smoothing must be in (0, 1], got {}",
                self.period_smoothing
            ));
        }
        if self.warmup_intervals < 32 {
            return invalid(format!(
                "warmup_intervals must be at least 32, got {}",
                self.warmup_intervals
            ));
        }
        if self.dropout_ratio <= 1.0 + self.long_tolerance {
            return invalid("dropout_ratio must exceed the long interval band".to_string());
        }
        if self.relock_frames == 0 || self.min_run_frames == 0 {
            return invalid("relock_frames and min_run_frames must be at least 1".to_string());
        }
        if self.stop_after_frames == Some(0) {
            return invalid("stop_after_frames must be at least 1".to_string());
        }
        if matches!(self.max_search_seconds, Some(s) if !(s > 0.0)) {
            return invalid("max_search_seconds must be positive".to_string());
        }
        if self.rate_snap_tolerance <= 0.0 || self.rate_ambiguity_tolerance < 0.0 {
            return invalid("rate tolerances must be positive".to_string());
        }
        if self.rate_variation_reference <= 0.0 {
            return invalid("rate_variation_reference must be positive".to_string());
        }
        Ok(())
    }

    /// Amplitude floor as a linear value
    pub fn min_amplitude_linear(&self) -> f32 {
        10.0_f32.powf(self.min_amplitude_db / 20.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(DecoderConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_inverted_fps_range() {
        let config = DecoderConfig {
            min_fps: 30.0,
            max_fps: 20.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_overlapping_short_band() {
        let config = DecoderConfig {
            short_tolerance: 0.3,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_min_amplitude_linear() {
        let config = DecoderConfig {
            min_amplitude_db: -20.0,
            ..Default::default()
        };
        assert!((config.min_amplitude_linear() - 0.1).abs() < 1e-6);
    }
}
