//! The 80-bit LTC frame
//!
//! Bit `i` of the frame is the `i`-th bit on the wire in forward playback. Fields are
//! stored least-significant bit first, as in SMPTE 12M:
//!
//! ```text
//! [0..4]   frame units        [4..8]   user group 1
//! [8..10]  frame tens         [10]     drop-frame flag     [11] color-frame flag
//! [12..16] user group 2       [16..20] seconds units       [20..24] user group 3
//! [24..27] seconds tens       [27]     flag (polarity / BGF0)
//! [28..32] user group 4       [32..36] minutes units       [36..40] user group 5
//! [40..43] minutes tens       [43]     flag (BGF0 / BGF2)
//! [44..48] user group 6       [48..52] hours units         [52..56] user group 7
//! [56..58] hours tens         [58]     BGF1                [59] flag (BGF2 / polarity)
//! [60..64] user group 8       [64..80] sync word
//! ```

use serde::{Deserialize, Serialize};

/// Bits per LTC frame
pub const FRAME_BITS: usize = 80;

/// Bits in the sync word
pub const SYNC_BITS: usize = 16;

/// Payload bits preceding the sync word
pub const PAYLOAD_BITS: usize = FRAME_BITS - SYNC_BITS;

/// Sync word in wire order: `0011 1111 1111 1101`
pub const SYNC_WORD: [bool; SYNC_BITS] = [
    false, false, true, true, true, true, true, true, true, true, true, true, true, true,
    false, true,
];

/// Start bits of the eight 4-bit user groups
pub const USER_GROUP_OFFSETS: [usize; 8] = [4, 12, 20, 28, 36, 44, 52, 60];

/// Playback direction implied by the sync word orientation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlaybackDirection {
    /// Sync word seen in wire order
    Forward,
    /// Sync word seen bit-reversed (tape or file played backwards)
    Reverse,
}

/// Check a 16-bit slice against the sync word
///
/// Returns the playback direction when the slice matches the sync word or its reversal.
pub fn match_sync(bits: &[bool]) -> Option<PlaybackDirection> {
    if bits.len() != SYNC_BITS {
        return None;
    }
    if bits.iter().eq(SYNC_WORD.iter()) {
        Some(PlaybackDirection::Forward)
    } else if bits.iter().eq(SYNC_WORD.iter().rev()) {
        Some(PlaybackDirection::Reverse)
    } else {
        None
    }
}

/// An 80-bit frame with its position in the stream
#[derive(Debug, Clone, PartialEq)]
pub struct LtcFrame {
    /// Frame bits, bit `i` at position `i`
    bits: u128,

    /// Index of the first bit of this frame in the demodulated bit stream
    pub bit_offset: u64,

    /// Sample position where the frame starts (sub-sample precision)
    pub start_sample: f64,

    /// Sample position where the frame ends
    pub end_sample: f64,

    /// Orientation of the sync word this frame was aligned on
    pub direction: PlaybackDirection,

    /// Mean demodulation confidence of the frame's bits (0.0-1.0)
    pub bit_confidence: f32,

    /// Number of bits the demodulator marked uncertain
    pub uncertain_bits: u32,
}

impl LtcFrame {
    /// Build a frame from 80 bits in forward wire order
    ///
    /// Returns `None` unless exactly 80 bits are supplied.
    pub fn from_bits(bits: &[bool]) -> Option<Self> {
        if bits.len() != FRAME_BITS {
            return None;
        }
        let packed = bits
            .iter()
            .enumerate()
            .fold(0u128, |acc, (i, &b)| if b { acc | (1u128 << i) } else { acc });
        Some(Self {
            bits: packed,
            bit_offset: 0,
            start_sample: 0.0,
            end_sample: 0.0,
            direction: PlaybackDirection::Forward,
            bit_confidence: 1.0,
            uncertain_bits: 0,
        })
    }

    /// Value of bit `index`
    pub fn bit(&self, index: usize) -> bool {
        index < FRAME_BITS && (self.bits >> index) & 1 == 1
    }

    /// Read `len` bits starting at `start`, least-significant bit first
    pub fn field(&self, start: usize, len: usize) -> u8 {
        debug_assert!(len <= 8 && start + len <= FRAME_BITS);
        ((self.bits >> start) & ((1u128 << len) - 1)) as u8
    }

    /// All 80 bits in wire order
    pub fn to_bits(&self) -> Vec<bool> {
        (0..FRAME_BITS).map(|i| self.bit(i)).collect()
    }

    /// True if the final 16 bits hold the forward sync word
    pub fn has_sync_word(&self) -> bool {
        (PAYLOAD_BITS..FRAME_BITS)
            .map(|i| self.bit(i))
            .eq(SYNC_WORD.iter().copied())
    }

    /// Number of zero bits in the frame
    pub fn zero_count(&self) -> u32 {
        FRAME_BITS as u32 - self.bits.count_ones()
    }

    /// Measured bit period in samples, from the frame's span
    pub fn bit_period_samples(&self) -> f64 {
        (self.end_sample - self.start_sample) / FRAME_BITS as f64
    }

    /// The eight user-bit groups, group 1 first
    pub fn user_groups(&self) -> [u8; 8] {
        let mut groups = [0u8; 8];
        for (group, &offset) in groups.iter_mut().zip(USER_GROUP_OFFSETS.iter()) {
            *group = self.field(offset, 4);
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_with_sync() -> Vec<bool> {
        let mut bits = vec![false; PAYLOAD_BITS];
        bits.extend_from_slice(&SYNC_WORD);
        bits
    }

    #[test]
    fn test_from_bits_requires_80() {
        assert!(LtcFrame::from_bits(&[true; 79]).is_none());
        assert!(LtcFrame::from_bits(&frame_with_sync()).is_some());
    }

    #[test]
    fn test_sync_word_detection() {
        assert_eq!(match_sync(&SYNC_WORD), Some(PlaybackDirection::Forward));

        let reversed: Vec<bool> = SYNC_WORD.iter().rev().copied().collect();
        assert_eq!(match_sync(&reversed), Some(PlaybackDirection::Reverse));

        assert_eq!(match_sync(&[true; SYNC_BITS]), None);
        assert_eq!(match_sync(&SYNC_WORD[..8]), None);
    }

    #[test]
    fn test_field_is_lsb_first() {
        let mut bits = frame_with_sync();
        // frame units = 5 (0b0101): bits 0 and 2
        bits[0] = true;
        bits[2] = true;
        let frame = LtcFrame::from_bits(&bits).unwrap();
        assert_eq!(frame.field(0, 4), 5);
        assert!(frame.has_sync_word());
    }

    #[test]
    fn test_user_groups() {
        let mut bits = frame_with_sync();
        // group 1 = 0xF, group 8 = 0x1
        for b in &mut bits[4..8] {
            *b = true;
        }
        bits[60] = true;
        let frame = LtcFrame::from_bits(&bits).unwrap();
        let groups = frame.user_groups();
        assert_eq!(groups[0], 0xF);
        assert_eq!(groups[7], 0x1);
        assert_eq!(groups[3], 0);
    }

    #[test]
    fn test_zero_count() {
        let frame = LtcFrame::from_bits(&frame_with_sync()).unwrap();
        // Sync word carries 13 ones
        assert_eq!(frame.zero_count(), 80 - 13);
    }
}
