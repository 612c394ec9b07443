//! Confidence scoring module
//!
//! Summarizes how far a decode result can be trusted. Individual scores come from the
//! stages that produced the result and are combined into an overall score.
//!
//! # Confidence Components
//!
//! 1. **Sync Confidence**: demodulation confidence of the accepted frames, weighted by
//!    how their alignment was established
//! 2. **Rate Confidence**: stability of the per-frame bit period
//! 3. **Continuity**: share of synchronized frames that made it into the timeline
//! 4. **Overall Confidence**: weighted combination of all components
//!
//! # Example
//!
//! ```no_run
//! use ltc_dsp::{decode_ltc, DecoderConfig};
//! use ltc_dsp::analysis::confidence::compute_confidence;
//!
//! let samples = vec![0.0f32; 48000 * 10];
//! let result = decode_ltc(&samples, 48000, DecoderConfig::default())?;
//! let confidence = compute_confidence(&result);
//!
//! println!("Overall confidence: {:.2}", confidence.overall_confidence);
//! # Ok::<(), ltc_dsp::DecodeError>(())
//! ```

use super::result::{DecodeFlag, DecodeResult};
use serde::{Deserialize, Serialize};

/// Decode confidence scores
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecodeConfidence {
    /// Sync confidence (0.0-1.0)
    ///
    /// Mean confidence of the accepted frames: bit classification confidence scaled
    /// down for frames aligned during resynchronization.
    pub sync_confidence: f32,

    /// Rate confidence (0.0-1.0)
    ///
    /// From the spread of per-frame bit periods; reduced when the rate is ambiguous.
    pub rate_confidence: f32,

    /// Continuity (0.0-1.0)
    ///
    /// Accepted frames over synchronized frames.
    pub continuity: f32,

    /// Overall confidence (weighted average)
    ///
    /// - Sync: 40% weight
    /// - Rate: 30% weight
    /// - Continuity: 30% weight
    pub overall_confidence: f32,

    /// Confidence flags indicating specific issues
    pub flags: Vec<DecodeFlag>,
}

/// Compute confidence scores for a decode result
///
/// # Arguments
///
/// * `result` - Decode result from `decode_ltc()` or `DecodeSession::finish()`
///
/// # Returns
///
/// `DecodeConfidence` with individual and overall confidence scores
pub fn compute_confidence(result: &DecodeResult) -> DecodeConfidence {
    let sync_confidence = compute_sync_confidence(result);

    let mut rate_confidence = result.frame_rate.confidence.clamp(0.0, 1.0);
    if result.frame_rate.ambiguous {
        rate_confidence *= 0.7;
    }

    let synced = result.metadata.frames_synced;
    let continuity = if synced > 0 {
        (result.metadata.frames_accepted as f32 / synced as f32).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let overall_confidence =
        (sync_confidence * 0.4 + rate_confidence * 0.3 + continuity * 0.3).clamp(0.0, 1.0);

    let mut flags = result.metadata.flags.clone();
    let mut raise = |flag: DecodeFlag| {
        if !flags.contains(&flag) {
            flags.push(flag);
        }
    };
    if sync_confidence < 0.5 {
        raise(DecodeFlag::LowSignalQuality);
    }
    if rate_confidence < 0.3 {
        raise(DecodeFlag::RateAmbiguous);
    }
    if continuity < 0.5 {
        raise(DecodeFlag::PartialDecode);
    }

    log::debug!(
        "Confidence scores: sync={:.3}, rate={:.3}, continuity={:.3}, overall={:.3}",
        sync_confidence,
        rate_confidence,
        continuity,
        overall_confidence
    );

    DecodeConfidence {
        sync_confidence,
        rate_confidence,
        continuity,
        overall_confidence,
        flags,
    }
}

impl DecodeConfidence {
    /// Check if overall confidence is high (>= 0.7)
    pub fn is_high_confidence(&self) -> bool {
        self.overall_confidence >= 0.7
    }

    /// Check if overall confidence is low (< 0.5)
    pub fn is_low_confidence(&self) -> bool {
        self.overall_confidence < 0.5
    }

    /// Human-readable confidence level: "High", "Medium", or "Low"
    pub fn confidence_level(&self) -> &'static str {
        if self.is_high_confidence() {
            "High"
        } else if self.is_low_confidence() {
            "Low"
        } else {
            "Medium"
        }
    }
}

fn compute_sync_confidence(result: &DecodeResult) -> f32 {
    let (sum, count) = result
        .accepted_frames()
        .fold((0.0f32, 0usize), |(s, n), f| (s + f.confidence, n + 1));
    if count == 0 {
        return 0.0;
    }
    (sum / count as f32).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::rate::RateEstimate;
    use crate::analysis::result::{DecodeMetadata, FrameRecord, FrameStatus};
    use crate::features::fields::LtcFlags;
    use crate::features::frame::PlaybackDirection;
    use crate::features::sync::FrameLock;
    use crate::preprocessing::conditioning::SignalStats;
    use crate::timecode::{FrameRate, TimecodeValue};

    fn record(status: FrameStatus, confidence: f32) -> FrameRecord {
        FrameRecord {
            timecode: TimecodeValue::new(1, 0, 0, 0),
            valid: status != FrameStatus::Invalid,
            status,
            confidence,
            lock: FrameLock::Confirmed,
            direction: PlaybackDirection::Forward,
            bit_offset: 0,
            start_sample: 0.0,
            end_sample: 1920.0,
            user_bits: [0; 8],
            flags: LtcFlags::default(),
            uncertain_bits: 0,
            issues: vec![],
        }
    }

    fn create_test_result(frames: Vec<FrameRecord>, rate_confidence: f32, ambiguous: bool) -> DecodeResult {
        let accepted = frames.iter().filter(|f| f.is_accepted()).count();
        DecodeResult {
            timecode: TimecodeValue::new(1, 0, 0, 0),
            run_length: accepted,
            representative_sample: 0.0,
            frame_rate: RateEstimate {
                rate: FrameRate::Fps25,
                measured_fps: 25.0,
                drop_frame: false,
                confidence: rate_confidence,
                ambiguous,
                frames_observed: frames.len() as u64,
                bit_period_samples: 24.0,
            },
            direction: PlaybackDirection::Forward,
            metadata: DecodeMetadata {
                duration_seconds: 10.0,
                sample_rate: 48000,
                processing_time_ms: 5.0,
                algorithm_version: "0.1.0".to_string(),
                signal: SignalStats {
                    peak_db: -6.0,
                    noise_floor_db: -6.0,
                    dc_offset: 0.0,
                },
                bit_period_samples: 24.0,
                bits_decoded: frames.len() as u64 * 80,
                uncertain_bits: 0,
                classification_failures: 0,
                clock_reseeds: 0,
                noise_edges_merged: 0,
                frames_synced: frames.len(),
                frames_accepted: accepted,
                frames_invalid: 0,
                continuity_violations: 0,
                stopped_early: false,
                flags: vec![],
                warnings: vec![],
            },
            frames,
            gaps: vec![],
            sync_losses: vec![],
        }
    }

    #[test]
    fn test_compute_confidence_all_good() {
        let frames = (0..10).map(|_| record(FrameStatus::Accepted, 0.9)).collect();
        let confidence = compute_confidence(&create_test_result(frames, 1.0, false));

        assert!((confidence.sync_confidence - 0.9).abs() < 1e-6);
        assert_eq!(confidence.continuity, 1.0);
        // 0.9*0.4 + 1.0*0.3 + 1.0*0.3 = 0.96
        assert!((confidence.overall_confidence - 0.96).abs() < 0.01);
        assert!(confidence.is_high_confidence());
        assert!(confidence.flags.is_empty());
    }

    #[test]
    fn test_ambiguous_rate_is_penalized() {
        let frames = (0..10).map(|_| record(FrameStatus::Accepted, 1.0)).collect();
        let confidence = compute_confidence(&create_test_result(frames, 0.4, true));
        assert!((confidence.rate_confidence - 0.28).abs() < 1e-6);
        assert!(confidence.flags.contains(&DecodeFlag::RateAmbiguous));
    }

    #[test]
    fn test_poor_continuity_flags_partial_decode() {
        let mut frames: Vec<FrameRecord> = (0..3).map(|_| record(FrameStatus::Accepted, 1.0)).collect();
        frames.extend((0..7).map(|_| record(FrameStatus::Invalid, 1.0)));
        let confidence = compute_confidence(&create_test_result(frames, 0.5, false));

        assert!((confidence.continuity - 0.3).abs() < 1e-6);
        assert!(confidence.flags.contains(&DecodeFlag::PartialDecode));
        assert_eq!(confidence.confidence_level(), "Medium");
    }
}
