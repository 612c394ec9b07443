//! Decode result types

use crate::analysis::rate::RateEstimate;
use crate::features::fields::LtcFlags;
use crate::features::frame::PlaybackDirection;
use crate::features::sync::{FrameLock, SyncLossEvent};
use crate::preprocessing::conditioning::SignalStats;
use crate::timecode::TimecodeValue;
use serde::{Deserialize, Serialize};

/// A BCD digit position in the frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BcdDigit {
    /// Bits 0-3
    FrameUnits,
    /// Bits 8-9
    FrameTens,
    /// Bits 16-19
    SecondsUnits,
    /// Bits 24-26
    SecondsTens,
    /// Bits 32-35
    MinutesUnits,
    /// Bits 40-42
    MinutesTens,
    /// Bits 48-51
    HoursUnits,
    /// Bits 56-57
    HoursTens,
}

/// A composed timecode field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeField {
    /// Hours, below 24
    Hours,
    /// Minutes, below 60
    Minutes,
    /// Seconds, below 60
    Seconds,
    /// Frames, below the nominal rate
    Frames,
}

/// Why a frame was kept out of the timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FrameIssue {
    /// A BCD digit above 9
    InvalidBcd {
        /// Digit position
        digit: BcdDigit,
        /// Value read
        value: u8,
    },
    /// A composed field outside its range for the frame rate
    OutOfRange {
        /// Offending field
        field: TimeField,
        /// Composed value
        value: u8,
    },
    /// A label the drop-frame rule skips
    DroppedLabel,
    /// Valid on its own but not the frame the timeline expected here
    ContinuityViolation {
        /// Label the timeline predicted
        expected: TimecodeValue,
    },
}

/// Outcome of a frame in the decode log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameStatus {
    /// Validated and part of the timeline
    Accepted,
    /// Failed field validation
    Invalid,
    /// Valid fields, rejected by the continuity check
    Rejected,
    /// Single sync word never confirmed; not used for the timeline
    Unconfirmed,
}

/// One synchronized frame in the decode log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameRecord {
    /// Timecode as decoded (meaningful when `valid`)
    pub timecode: TimecodeValue,

    /// True if every digit and field passed validation
    pub valid: bool,

    /// Timeline outcome
    pub status: FrameStatus,

    /// Frame confidence (0.0-1.0): bit confidence weighted by lock quality
    pub confidence: f32,

    /// How the frame was aligned
    pub lock: FrameLock,

    /// Sync word orientation
    pub direction: PlaybackDirection,

    /// Index of the frame's first bit in the demodulated bit stream
    pub bit_offset: u64,

    /// Sample position where the frame starts
    pub start_sample: f64,

    /// Sample position where the frame ends
    pub end_sample: f64,

    /// The eight user-bit groups, opaque
    pub user_bits: [u8; 8],

    /// Flag bits
    pub flags: LtcFlags,

    /// Bits the demodulator marked uncertain
    pub uncertain_bits: u32,

    /// Validation and continuity issues
    pub issues: Vec<FrameIssue>,
}

impl FrameRecord {
    /// True if the frame is part of the validated timeline
    pub fn is_accepted(&self) -> bool {
        self.status == FrameStatus::Accepted
    }
}

/// Kind of break in the validated timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GapKind {
    /// Timeline continues but frames in between were lost or rejected
    MissingFrames,
    /// A new timeline was adopted (edit point, tape restart)
    Discontinuity,
}

/// A break between two accepted frames
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GapEvent {
    /// Whether the timeline continued or changed
    pub kind: GapKind,

    /// Last accepted timecode before the gap
    pub after: TimecodeValue,

    /// First accepted timecode after the gap
    pub before: TimecodeValue,

    /// Frames missing between the two (0 for a discontinuity)
    pub missing_frames: u32,

    /// Sample position where the later frame starts
    pub sample_offset: f64,
}

/// Decode flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecodeFlag {
    /// Frame rate did not converge confidently on a standard rate
    RateAmbiguous,
    /// Frames validated but the stream has gaps, violations or sync losses
    PartialDecode,
    /// Signal was played backwards
    ReversedPlayback,
    /// Many bits were demodulated with low confidence
    LowSignalQuality,
}

/// Decode metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecodeMetadata {
    /// Duration of the processed input in seconds
    pub duration_seconds: f32,

    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Processing time in milliseconds
    pub processing_time_ms: f32,

    /// Algorithm version
    pub algorithm_version: String,

    /// Level statistics of the input
    pub signal: SignalStats,

    /// Final bit-period estimate in samples
    pub bit_period_samples: f64,

    /// Bits demodulated
    pub bits_decoded: u64,

    /// Bits marked uncertain
    pub uncertain_bits: u64,

    /// Intervals outside both classification bands
    pub classification_failures: u64,

    /// Times the bit clock was re-seeded
    pub clock_reseeds: u64,

    /// Edge pairs merged away as noise
    pub noise_edges_merged: u64,

    /// Frames emitted by the synchronizer
    pub frames_synced: usize,

    /// Frames accepted into the timeline
    pub frames_accepted: usize,

    /// Frames that failed field validation
    pub frames_invalid: usize,

    /// Valid frames rejected by the continuity check
    pub continuity_violations: usize,

    /// Decoding stopped once the early-termination run length was reached
    pub stopped_early: bool,

    /// Decode flags
    pub flags: Vec<DecodeFlag>,

    /// Human-readable warnings (ambiguous rate, low signal quality, etc.)
    pub warnings: Vec<String>,
}

/// Complete decode result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecodeResult {
    /// Representative timecode: first frame of the longest contiguous validated run
    pub timecode: TimecodeValue,

    /// Length of that run in frames
    pub run_length: usize,

    /// Sample position where the representative frame starts
    pub representative_sample: f64,

    /// Estimated frame rate
    pub frame_rate: RateEstimate,

    /// Playback direction of the representative run
    pub direction: PlaybackDirection,

    /// Per-frame decode log, in forward timecode order
    pub frames: Vec<FrameRecord>,

    /// Timeline breaks
    pub gaps: Vec<GapEvent>,

    /// Sync-loss events
    pub sync_losses: Vec<SyncLossEvent>,

    /// Decode metadata
    pub metadata: DecodeMetadata,
}

impl DecodeResult {
    /// Canonical timecode string (`HH:MM:SS:FF`, or `HH:MM:SS;FF` for drop-frame)
    pub fn timecode_string(&self) -> String {
        self.timecode.to_string()
    }

    /// True if the given flag was raised
    pub fn has_flag(&self, flag: DecodeFlag) -> bool {
        self.metadata.flags.contains(&flag)
    }

    /// Accepted frames in log order
    pub fn accepted_frames(&self) -> impl Iterator<Item = &FrameRecord> {
        self.frames.iter().filter(|f| f.is_accepted())
    }
}
