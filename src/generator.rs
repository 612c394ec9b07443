//! LTC signal synthesis
//!
//! Renders biphase-mark LTC audio for a run of consecutive timecodes. Used by the tests,
//! the benchmark and the `generate_ltc` demo to produce known-good input.
//!
//! The waveform toggles at the start of every bit cell and again mid-cell for a `1`. The
//! first transition sits at t = 0 and sample `n` holds the mean level over `[n, n + 1)`,
//! so cells that do not line up with the sample grid get a fractional transition sample
//! instead of jitter.
//!
//! # Example
//!
//! ```
//! use ltc_dsp::{FrameRate, LtcGenerator, TimecodeValue};
//!
//! let generator = LtcGenerator::new(48000, FrameRate::Fps25).with_amplitude(0.5);
//! let samples = generator.generate(TimecodeValue::new(1, 0, 0, 0), 25);
//! assert_eq!(samples.len(), 48000);
//! ```

use crate::features::fields::{encode_frame, FieldLayout};
use crate::features::frame::FRAME_BITS;
use crate::timecode::{FrameRate, TimecodeValue};

/// A forced bit value in one generated frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BitOverride {
    frame: usize,
    bit: usize,
    value: bool,
}

/// LTC audio generator
#[derive(Debug, Clone)]
pub struct LtcGenerator {
    sample_rate: u32,
    rate: FrameRate,
    amplitude: f32,
    speed: f64,
    user_bits: [u8; 8],
    binary_group: [bool; 3],
    reversed: bool,
    overrides: Vec<BitOverride>,
}

impl LtcGenerator {
    /// Generator at unity speed and 0.5 amplitude
    pub fn new(sample_rate: u32, rate: FrameRate) -> Self {
        Self {
            sample_rate,
            rate,
            amplitude: 0.5,
            speed: 1.0,
            user_bits: [0; 8],
            binary_group: [false; 3],
            reversed: false,
            overrides: Vec::new(),
        }
    }

    /// Peak amplitude, clamped to [0.0, 1.0]
    pub fn with_amplitude(mut self, amplitude: f32) -> Self {
        self.amplitude = amplitude.clamp(0.0, 1.0);
        self
    }

    /// Playback speed factor (1.02 plays 2% fast); non-positive values are ignored
    pub fn with_speed(mut self, speed: f64) -> Self {
        if speed.is_finite() && speed > 0.0 {
            self.speed = speed;
        } else {
            log::warn!("Ignoring invalid speed factor {}", speed);
        }
        self
    }

    /// User-bit groups written into every frame (low nibble of each byte)
    pub fn with_user_bits(mut self, user_bits: [u8; 8]) -> Self {
        self.user_bits = user_bits.map(|g| g & 0x0F);
        self
    }

    /// Binary group flags BGF0..BGF2
    pub fn with_binary_group(mut self, flags: [bool; 3]) -> Self {
        self.binary_group = flags;
        self
    }

    /// Render the signal as if the tape were played backwards
    pub fn reversed(mut self, reversed: bool) -> Self {
        self.reversed = reversed;
        self
    }

    /// Force bit `bit` of the `frame`-th generated frame to `value`
    ///
    /// Applied after encoding, so the polarity bit is not recomputed.
    pub fn with_bit_override(mut self, frame: usize, bit: usize, value: bool) -> Self {
        if bit < FRAME_BITS {
            self.overrides.push(BitOverride { frame, bit, value });
        }
        self
    }

    /// Rate the generator renders at
    pub fn frame_rate(&self) -> FrameRate {
        self.rate
    }

    /// Bit period in output samples, including the speed factor
    pub fn bit_period(&self) -> f64 {
        self.sample_rate as f64 / (self.rate.fps() * FRAME_BITS as f64 * self.speed)
    }

    /// Encode one timecode as 80 bits for this generator's rate
    ///
    /// The drop-frame flag is set exactly when the rate is 29.97.
    pub fn frame_bits(&self, timecode: &TimecodeValue) -> [bool; FRAME_BITS] {
        let timecode = timecode.with_drop_frame(self.rate == FrameRate::Fps29_97);
        encode_frame(
            &timecode,
            &self.user_bits,
            self.binary_group,
            FieldLayout::for_rate(self.rate),
        )
    }

    /// Bits of `count` consecutive frames starting at `start`, overrides applied
    ///
    /// A drop-frame start that lands on a skipped label moves forward to the next label
    /// that exists.
    pub fn timecode_bits(&self, start: TimecodeValue, count: usize) -> Vec<bool> {
        let nominal = self.rate.nominal_fps();
        let mut timecode = start.with_drop_frame(self.rate == FrameRate::Fps29_97);
        while timecode.is_dropped_label() {
            timecode.frames += 1;
        }

        let mut bits = Vec::with_capacity(count * FRAME_BITS);
        for index in 0..count {
            let mut frame = self.frame_bits(&timecode);
            for o in self.overrides.iter().filter(|o| o.frame == index) {
                frame[o.bit] = o.value;
            }
            bits.extend_from_slice(&frame);
            timecode = timecode.next(nominal);
        }
        bits
    }

    /// Render a bit stream as biphase-mark audio
    pub fn render_bits(&self, bits: &[bool]) -> Vec<f32> {
        let period = self.bit_period();
        if !period.is_finite() || period <= 0.0 || bits.is_empty() {
            return Vec::new();
        }

        let mut transitions = Vec::with_capacity(bits.len() * 2);
        for (i, &bit) in bits.iter().enumerate() {
            let start = i as f64 * period;
            transitions.push(start);
            if bit {
                transitions.push(start + period / 2.0);
            }
        }

        let len = (bits.len() as f64 * period).ceil() as usize;
        let amplitude = self.amplitude as f64;
        let mut samples = Vec::with_capacity(len);
        let mut level = -1.0f64;
        let mut next = 0;
        for n in 0..len {
            let end = (n + 1) as f64;
            let mut t = n as f64;
            let mut area = 0.0;
            while next < transitions.len() && transitions[next] < end {
                let at = transitions[next].max(t);
                area += level * (at - t);
                t = at;
                level = -level;
                next += 1;
            }
            area += level * (end - t);
            samples.push((area * amplitude) as f32);
        }

        if self.reversed {
            samples.reverse();
        }
        samples
    }

    /// Audio for `count` consecutive frames starting at `start`
    pub fn generate(&self, start: TimecodeValue, count: usize) -> Vec<f32> {
        self.render_bits(&self.timecode_bits(start, count))
    }

    /// Audio for `seconds` of output starting at `start`
    pub fn generate_seconds(&self, start: TimecodeValue, seconds: f64) -> Vec<f32> {
        let count = (seconds * self.rate.fps() * self.speed).round().max(0.0) as usize;
        self.generate(start, count)
    }
}
