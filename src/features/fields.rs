//! BCD and flag field extraction
//!
//! Digits are read at fixed bit positions and validated one by one. A frame with a bad
//! digit is still decoded as far as possible and reported with its issues; it is the
//! assembler that keeps it out of the timeline.
//!
//! The flag bits move between the 30/24 fps layout and the 25 fps (EBU) layout, so the
//! layout is an explicit variant rather than a set of rate checks scattered through
//! extraction.

use crate::analysis::result::{BcdDigit, FrameIssue, TimeField};
use crate::features::frame::{LtcFrame, FRAME_BITS, PAYLOAD_BITS, SYNC_WORD, USER_GROUP_OFFSETS};
use crate::timecode::{FrameRate, TimecodeValue};
use serde::{Deserialize, Serialize};

/// Bit carrying the drop-frame flag in every layout
pub const DROP_FRAME_BIT: usize = 10;
const COLOR_FRAME_BIT: usize = 11;

/// Position and width of each BCD digit, least-significant bit first
const DIGITS: [(BcdDigit, usize, usize); 8] = [
    (BcdDigit::FrameUnits, 0, 4),
    (BcdDigit::FrameTens, 8, 2),
    (BcdDigit::SecondsUnits, 16, 4),
    (BcdDigit::SecondsTens, 24, 3),
    (BcdDigit::MinutesUnits, 32, 4),
    (BcdDigit::MinutesTens, 40, 3),
    (BcdDigit::HoursUnits, 48, 4),
    (BcdDigit::HoursTens, 56, 2),
];

/// Placement of the polarity-correction and binary-group flag bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldLayout {
    /// 24 and 30 fps family: polarity at 27, BGF0/1/2 at 43/58/59
    Smpte,
    /// 25 fps: polarity at 59, BGF0/1/2 at 27/58/43
    Ebu,
}

impl FieldLayout {
    /// Layout used at a frame rate
    pub fn for_rate(rate: FrameRate) -> Self {
        if rate.uses_ebu_layout() {
            FieldLayout::Ebu
        } else {
            FieldLayout::Smpte
        }
    }

    /// Bit carrying the biphase polarity correction
    pub fn polarity_bit(&self) -> usize {
        match self {
            FieldLayout::Smpte => 27,
            FieldLayout::Ebu => 59,
        }
    }

    /// Bits carrying binary group flags 0, 1 and 2
    pub fn group_flag_bits(&self) -> [usize; 3] {
        match self {
            FieldLayout::Smpte => [43, 58, 59],
            FieldLayout::Ebu => [27, 58, 43],
        }
    }
}

/// Flag bits of a frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LtcFlags {
    /// Raw drop-frame bit (bit 10), whatever the rate
    pub drop_frame: bool,
    /// Color-frame bit (bit 11)
    pub color_frame: bool,
    /// Biphase polarity correction bit (27 or 59, depending on the layout)
    pub polarity_correction: bool,
    /// Binary group flags 0-2, describing how the user bits are used
    pub binary_group: [bool; 3],
}

/// Everything extracted from one frame
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFields {
    /// Timecode as read; only meaningful when `issues` is empty
    pub timecode: TimecodeValue,
    /// The eight user-bit groups, opaque
    pub user_bits: [u8; 8],
    /// Flag bits as read
    pub flags: LtcFlags,
    /// Validation failures; empty for a valid frame
    pub issues: Vec<FrameIssue>,
}

impl DecodedFields {
    /// True if every digit and field passed validation
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Extracts and validates timecode fields from synchronized frames
#[derive(Debug, Clone, Copy)]
pub struct TimecodeDecoder {
    layout: FieldLayout,
    nominal_fps: u8,
}

impl TimecodeDecoder {
    /// Decoder for frames at the given rate
    pub fn new(rate: FrameRate) -> Self {
        Self {
            layout: FieldLayout::for_rate(rate),
            nominal_fps: rate.nominal_fps(),
        }
    }

    /// Flag layout in use
    pub fn layout(&self) -> FieldLayout {
        self.layout
    }

    /// Decode one frame
    pub fn decode(&self, frame: &LtcFrame) -> DecodedFields {
        let mut issues = Vec::new();

        let mut digits = [0u8; 8];
        for (slot, &(digit, start, len)) in digits.iter_mut().zip(DIGITS.iter()) {
            let value = frame.field(start, len);
            if value > 9 {
                issues.push(FrameIssue::InvalidBcd { digit, value });
            }
            *slot = value;
        }

        let flags = LtcFlags {
            drop_frame: frame.bit(DROP_FRAME_BIT),
            color_frame: frame.bit(COLOR_FRAME_BIT),
            polarity_correction: frame.bit(self.layout.polarity_bit()),
            binary_group: self.layout.group_flag_bits().map(|b| frame.bit(b)),
        };

        let timecode = TimecodeValue {
            frames: digits[1] * 10 + digits[0],
            seconds: digits[3] * 10 + digits[2],
            minutes: digits[5] * 10 + digits[4],
            hours: digits[7] * 10 + digits[6],
            // Drop-frame numbering only exists in the 30-label family
            drop_frame: flags.drop_frame && self.nominal_fps == 30,
            color_frame: flags.color_frame,
        };

        if issues.is_empty() {
            let ranges = [
                (TimeField::Hours, timecode.hours, 24),
                (TimeField::Minutes, timecode.minutes, 60),
                (TimeField::Seconds, timecode.seconds, 60),
                (TimeField::Frames, timecode.frames, self.nominal_fps),
            ];
            for (field, value, bound) in ranges {
                if value >= bound {
                    issues.push(FrameIssue::OutOfRange { field, value });
                }
            }
            if timecode.is_dropped_label() {
                issues.push(FrameIssue::DroppedLabel);
            }
        }

        DecodedFields {
            timecode,
            user_bits: frame.user_groups(),
            flags,
            issues,
        }
    }
}

/// Encode a timecode into 80 frame bits in wire order
///
/// The polarity-correction bit is set so the frame holds an even number of zeros,
/// which keeps the biphase waveform's polarity the same at every frame start.
pub fn encode_frame(
    timecode: &TimecodeValue,
    user_bits: &[u8; 8],
    binary_group: [bool; 3],
    layout: FieldLayout,
) -> [bool; FRAME_BITS] {
    let mut bits = [false; FRAME_BITS];
    let mut put = |start: usize, len: usize, value: u8| {
        for i in 0..len {
            bits[start + i] = (value >> i) & 1 == 1;
        }
    };

    put(0, 4, timecode.frames % 10);
    put(8, 2, timecode.frames / 10);
    put(16, 4, timecode.seconds % 10);
    put(24, 3, timecode.seconds / 10);
    put(32, 4, timecode.minutes % 10);
    put(40, 3, timecode.minutes / 10);
    put(48, 4, timecode.hours % 10);
    put(56, 2, timecode.hours / 10);
    for (&offset, &group) in USER_GROUP_OFFSETS.iter().zip(user_bits.iter()) {
        put(offset, 4, group);
    }

    bits[DROP_FRAME_BIT] = timecode.drop_frame;
    bits[COLOR_FRAME_BIT] = timecode.color_frame;
    for (&bit, &flag) in layout.group_flag_bits().iter().zip(binary_group.iter()) {
        bits[bit] = flag;
    }
    bits[PAYLOAD_BITS..].copy_from_slice(&SYNC_WORD);

    let polarity = layout.polarity_bit();
    bits[polarity] = false;
    let zeros = bits.iter().filter(|b| !**b).count();
    bits[polarity] = zeros % 2 == 1;
    bits
}
