//! SMPTE timecode values and standard frame rates

use crate::error::DecodeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Frame numbers skipped at the start of each drop-frame minute
const DROP_FRAMES_PER_MINUTE: u32 = 2;

/// Standard LTC frame rates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameRate {
    /// 24000/1001 fps (film pulled down for NTSC video)
    Fps23_976,
    /// 24 fps (film)
    Fps24,
    /// 25 fps (PAL / EBU)
    Fps25,
    /// 30000/1001 fps (NTSC color), the only rate where drop-frame is meaningful
    Fps29_97,
    /// 30 fps
    Fps30,
}

impl FrameRate {
    /// All standard rates, slowest first
    pub const ALL: [FrameRate; 5] = [
        FrameRate::Fps23_976,
        FrameRate::Fps24,
        FrameRate::Fps25,
        FrameRate::Fps29_97,
        FrameRate::Fps30,
    ];

    /// Exact frames per second
    pub fn fps(&self) -> f64 {
        match self {
            FrameRate::Fps23_976 => 24000.0 / 1001.0,
            FrameRate::Fps24 => 24.0,
            FrameRate::Fps25 => 25.0,
            FrameRate::Fps29_97 => 30000.0 / 1001.0,
            FrameRate::Fps30 => 30.0,
        }
    }

    /// Frame labels per timecode second (24, 25 or 30)
    pub fn nominal_fps(&self) -> u8 {
        match self {
            FrameRate::Fps23_976 | FrameRate::Fps24 => 24,
            FrameRate::Fps25 => 25,
            FrameRate::Fps29_97 | FrameRate::Fps30 => 30,
        }
    }

    /// Whether the drop-frame convention applies at this rate
    pub fn supports_drop_frame(&self) -> bool {
        matches!(self, FrameRate::Fps29_97)
    }

    /// Whether the 25 fps (EBU) flag-bit layout applies
    pub fn uses_ebu_layout(&self) -> bool {
        matches!(self, FrameRate::Fps25)
    }

    /// Look up a rate by its conventional decimal value (e.g. 29.97)
    pub fn from_fps(fps: f64) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|rate| (rate.fps() - fps).abs() < 0.01)
    }

    /// Short label, e.g. "29.97"
    pub fn label(&self) -> &'static str {
        match self {
            FrameRate::Fps23_976 => "23.976",
            FrameRate::Fps24 => "24",
            FrameRate::Fps25 => "25",
            FrameRate::Fps29_97 => "29.97",
            FrameRate::Fps30 => "30",
        }
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} fps", self.label())
    }
}

/// A decoded SMPTE timecode
///
/// Hours, minutes, seconds and frames are stored as decimal values; every BCD digit they
/// were decoded from lies in `0..=9`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimecodeValue {
    /// Hours (0-23)
    pub hours: u8,
    /// Minutes (0-59)
    pub minutes: u8,
    /// Seconds (0-59)
    pub seconds: u8,
    /// Frames (0 to fps - 1)
    pub frames: u8,
    /// Drop-frame flag
    pub drop_frame: bool,
    /// Color-frame flag
    pub color_frame: bool,
}

impl TimecodeValue {
    /// Create a non-drop timecode
    pub fn new(hours: u8, minutes: u8, seconds: u8, frames: u8) -> Self {
        Self {
            hours,
            minutes,
            seconds,
            frames,
            drop_frame: false,
            color_frame: false,
        }
    }

    /// Same timecode with the drop-frame flag set
    pub fn with_drop_frame(mut self, drop_frame: bool) -> Self {
        self.drop_frame = drop_frame;
        self
    }

    /// True if this label is skipped under the drop-frame rule
    ///
    /// Frames 0 and 1 do not exist at second 0 of every minute not divisible by ten.
    pub fn is_dropped_label(&self) -> bool {
        self.drop_frame
            && self.seconds == 0
            && (self.frames as u32) < DROP_FRAMES_PER_MINUTE
            && self.minutes % 10 != 0
    }

    /// Check field ranges against a frame rate
    pub fn is_valid_for(&self, nominal_fps: u8) -> bool {
        self.hours < 24
            && self.minutes < 60
            && self.seconds < 60
            && self.frames < nominal_fps
            && !self.is_dropped_label()
    }

    /// The following frame label, carrying into seconds, minutes and hours
    ///
    /// Out-of-range fields carry instead of overflowing.
    pub fn next(&self, nominal_fps: u8) -> Self {
        let mut tc = *self;
        tc.frames = tc.frames.saturating_add(1);
        if tc.frames >= labels_per_second(nominal_fps) {
            tc.frames = 0;
            tc.seconds = tc.seconds.saturating_add(1);
            if tc.seconds >= 60 {
                tc.seconds = 0;
                tc.minutes = tc.minutes.saturating_add(1);
                if tc.minutes >= 60 {
                    tc.minutes = 0;
                    tc.hours = (tc.hours % 24 + 1) % 24;
                }
            }
        }
        if tc.is_dropped_label() {
            tc.frames = DROP_FRAMES_PER_MINUTE as u8;
        }
        tc
    }

    /// The preceding frame label (used for reversed playback)
    pub fn previous(&self, nominal_fps: u8) -> Self {
        let mut tc = *self;
        let borrow_frames = |tc: &mut TimecodeValue| {
            if tc.frames > 0 {
                tc.frames -= 1;
                return;
            }
            tc.frames = labels_per_second(nominal_fps) - 1;
            if tc.seconds > 0 {
                tc.seconds -= 1;
                return;
            }
            tc.seconds = 59;
            if tc.minutes > 0 {
                tc.minutes -= 1;
                return;
            }
            tc.minutes = 59;
            tc.hours = if tc.hours == 0 { 23 } else { tc.hours - 1 };
        };
        borrow_frames(&mut tc);
        while tc.is_dropped_label() {
            borrow_frames(&mut tc);
        }
        tc
    }

    /// Advance by `count` frames (negative goes backwards)
    pub fn offset(&self, count: i64, nominal_fps: u8) -> Self {
        let total = frames_per_day(nominal_fps, self.drop_frame) as i64;
        let n = (self.to_frame_number(nominal_fps) as i64 + count).rem_euclid(total);
        let mut tc = Self::from_frame_number(n as u32, nominal_fps, self.drop_frame);
        tc.color_frame = self.color_frame;
        tc
    }

    /// Frame count since midnight
    pub fn to_frame_number(&self, nominal_fps: u8) -> u32 {
        let fps = labels_per_second(nominal_fps) as u32;
        let total_minutes = self.hours as u32 * 60 + self.minutes as u32;
        let mut n = (total_minutes * 60 + self.seconds as u32) * fps + self.frames as u32;
        if self.drop_frame {
            n = n.saturating_sub(DROP_FRAMES_PER_MINUTE * (total_minutes - total_minutes / 10));
        }
        n
    }

    /// Build a timecode from a frame count since midnight
    pub fn from_frame_number(frame_number: u32, nominal_fps: u8, drop_frame: bool) -> Self {
        let fps = labels_per_second(nominal_fps) as u32;
        let mut n = frame_number % frames_per_day(nominal_fps, drop_frame);
        if drop_frame {
            let per_minute = fps * 60 - DROP_FRAMES_PER_MINUTE;
            let per_ten_minutes = fps * 600 - 9 * DROP_FRAMES_PER_MINUTE;
            let tens = n / per_ten_minutes;
            let rem = n % per_ten_minutes;
            n += 9 * DROP_FRAMES_PER_MINUTE * tens;
            if rem > DROP_FRAMES_PER_MINUTE {
                n += DROP_FRAMES_PER_MINUTE * ((rem - DROP_FRAMES_PER_MINUTE) / per_minute);
            }
        }
        Self {
            hours: (n / (fps * 3600) % 24) as u8,
            minutes: (n / (fps * 60) % 60) as u8,
            seconds: (n / fps % 60) as u8,
            frames: (n % fps) as u8,
            drop_frame,
            color_frame: false,
        }
    }
}

/// Frame labels per second, never zero so the arithmetic below cannot divide by it
fn labels_per_second(nominal_fps: u8) -> u8 {
    nominal_fps.max(1)
}

/// Frame labels in a 24-hour day
fn frames_per_day(nominal_fps: u8, drop_frame: bool) -> u32 {
    let fps = labels_per_second(nominal_fps) as u32;
    if drop_frame {
        144 * (fps * 600 - 9 * DROP_FRAMES_PER_MINUTE)
    } else {
        fps * 86_400
    }
}

impl fmt::Display for TimecodeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let separator = if self.drop_frame { ';' } else { ':' };
        write!(
            f,
            "{:02}:{:02}:{:02}{}{:02}",
            self.hours, self.minutes, self.seconds, separator, self.frames
        )
    }
}

impl FromStr for TimecodeValue {
    type Err = DecodeError;

    /// Parse `HH:MM:SS:FF`; a `;` or `.` before the frames marks drop-frame
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let bad = || DecodeError::InvalidTimecode(format!("expected HH:MM:SS:FF, got {:?}", s));

        let split = s.rfind(&[':', ';', '.'][..]).ok_or_else(bad)?;
        let drop_frame = !s[split..].starts_with(':');
        let fields: Vec<&str> = s[..split].split(':').collect();
        if fields.len() != 3 {
            return Err(bad());
        }

        let parse = |field: &str| -> Result<u8, DecodeError> {
            if field.is_empty() || field.len() > 2 || !field.bytes().all(|b| b.is_ascii_digit()) {
                return Err(bad());
            }
            field.parse::<u8>().map_err(|_| bad())
        };

        let tc = TimecodeValue {
            hours: parse(fields[0])?,
            minutes: parse(fields[1])?,
            seconds: parse(fields[2])?,
            frames: parse(&s[split + 1..])?,
            drop_frame,
            color_frame: false,
        };

        if tc.hours > 23 || tc.minutes > 59 || tc.seconds > 59 || tc.frames > 29 {
            return Err(DecodeError::InvalidTimecode(format!(
                "field out of range in {:?}",
                s
            )));
        }
        if tc.is_dropped_label() {
            return Err(DecodeError::InvalidTimecode(format!(
                "{} does not exist in drop-frame timecode",
                s
            )));
        }
        Ok(tc)
    }
}
