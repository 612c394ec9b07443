//! Frame synchronization on the LTC sync word
//!
//! The synchronizer keeps the last 80 bits in a ring buffer and looks for the 16-bit
//! sync word at its end, or the bit-reversed sync word at its front.
//!
//! - **Searching**: any match aligns a provisional frame. It is only trusted once the
//!   next sync word turns up where it should, 80 bits later.
//! - **Synced**: a match is expected exactly every 80 bits.
//! - **Resyncing**: the expected sync was missing. Matches seen up to `w` bits early
//!   (remembered while synced) or up to `w` bits late re-establish alignment. Past the
//!   window the synchronizer falls back to searching and records a sync-loss event.
//!
//! In reverse playback every frame arrives as `rev(sync K), rev(payload K)`, so a frame is
//! aligned when the reversed sync word sits at the front of the window, and reversing the
//! whole window recovers it in wire order. The last frame of a reversed stream is then
//! complete the moment its final bit arrives, just like the last frame played forward.

use crate::features::biphase::Bit;
use crate::features::frame::{
    match_sync, LtcFrame, PlaybackDirection, FRAME_BITS, PAYLOAD_BITS, SYNC_BITS,
};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Synchronizer state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncState {
    /// No alignment; scanning every bit position
    Searching,
    /// Sync word arriving every 80 bits
    Synced,
    /// Expected sync missed; trying nearby offsets
    Resyncing,
}

/// How a frame's alignment was established
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameLock {
    /// Preceded and followed by sync words exactly 80 bits apart
    Confirmed,
    /// Aligned on a sync word found at a shifted offset during resynchronization
    Reacquired,
    /// A single sync word never confirmed by a following one
    Unconfirmed,
}

/// Loss of synchronization after the retry budget was exhausted
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SyncLossEvent {
    /// Index in the demodulated bit stream where sync was abandoned
    pub bit_offset: u64,
    /// Sample position where sync was abandoned
    pub sample_offset: f64,
}

/// A frame together with its lock quality
#[derive(Debug, Clone, PartialEq)]
pub struct SyncedFrame {
    /// The frame in wire order
    pub frame: LtcFrame,
    /// How its alignment was established
    pub lock: FrameLock,
}

/// Output of the synchronizer
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// A frame was aligned
    Frame(SyncedFrame),
    /// Alignment was abandoned
    Lost(SyncLossEvent),
}

/// Synchronizer counters
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SyncStats {
    /// Times alignment was found from the searching state
    pub acquisitions: u64,
    /// Times alignment was restored at a shifted offset
    pub reacquisitions: u64,
    /// Sync-loss events
    pub losses: u64,
    /// Frames emitted, any lock
    pub frames: u64,
}

/// Streaming frame synchronizer
#[derive(Debug, Clone)]
pub struct FrameSynchronizer {
    window: VecDeque<Bit>,
    bits_seen: u64,
    state: SyncState,
    direction: PlaybackDirection,
    bits_since_sync: usize,
    provisional: Option<LtcFrame>,
    /// Bit counts at which sync words were seen while synced, newest last
    recent_matches: VecDeque<(u64, PlaybackDirection)>,
    resync_window: usize,
    stats: SyncStats,
}

impl FrameSynchronizer {
    /// Create a synchronizer with a resync budget of `±resync_window` bits
    pub fn new(resync_window: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(FRAME_BITS + 1),
            bits_seen: 0,
            state: SyncState::Searching,
            direction: PlaybackDirection::Forward,
            bits_since_sync: 0,
            provisional: None,
            recent_matches: VecDeque::new(),
            resync_window: resync_window.min(FRAME_BITS / 2),
            stats: SyncStats::default(),
        }
    }

    /// Current state
    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Direction of the current alignment
    pub fn direction(&self) -> PlaybackDirection {
        self.direction
    }

    /// Synchronizer counters
    pub fn stats(&self) -> SyncStats {
        self.stats
    }

    /// Feed one bit, appending frames and sync-loss events to `events`
    pub fn push(&mut self, bit: Bit, events: &mut Vec<SyncEvent>) {
        self.window.push_back(bit);
        if self.window.len() > FRAME_BITS {
            self.window.pop_front();
        }
        self.bits_seen += 1;

        let matched = self.match_window();

        match self.state {
            SyncState::Searching => {
                if let Some(direction) = matched {
                    self.acquire(direction);
                }
            }
            SyncState::Synced => {
                self.bits_since_sync += 1;
                if self.bits_since_sync == FRAME_BITS {
                    if matched == Some(self.direction) {
                        self.complete_frame(FrameLock::Confirmed, events);
                    } else {
                        self.begin_resync();
                    }
                } else if let Some(direction) = matched {
                    self.remember_match(direction);
                }
            }
            SyncState::Resyncing => {
                self.bits_since_sync += 1;
                let lower = FRAME_BITS - self.resync_window;
                let upper = FRAME_BITS + self.resync_window;
                if matched == Some(self.direction) && (lower..=upper).contains(&self.bits_since_sync) {
                    self.stats.reacquisitions += 1;
                    log::debug!(
                        "Reacquired sync at offset {:+} bits (bit {})",
                        self.bits_since_sync as i64 - FRAME_BITS as i64,
                        self.bits_seen
                    );
                    self.complete_frame(FrameLock::Reacquired, events);
                } else if self.bits_since_sync > upper {
                    self.lose_sync(bit, events);
                    if let Some(direction) = matched {
                        self.acquire(direction);
                    }
                }
            }
        }
    }

    /// Release a provisional frame that never got confirmed
    ///
    /// Call once after the last bit.
    pub fn flush(&mut self, events: &mut Vec<SyncEvent>) {
        self.release_provisional(FrameLock::Unconfirmed, events);
    }

    /// Forward sync ending the window, or reversed sync opening it
    fn match_window(&self) -> Option<PlaybackDirection> {
        if self.window.len() < FRAME_BITS {
            return None;
        }
        let tail: Vec<bool> = self
            .window
            .iter()
            .skip(PAYLOAD_BITS)
            .map(|b| b.value)
            .collect();
        if match_sync(&tail) == Some(PlaybackDirection::Forward) {
            return Some(PlaybackDirection::Forward);
        }
        let head: Vec<bool> = self.window.iter().take(SYNC_BITS).map(|b| b.value).collect();
        match_sync(&head).filter(|direction| *direction == PlaybackDirection::Reverse)
    }

    fn acquire(&mut self, direction: PlaybackDirection) {
        self.stats.acquisitions += 1;
        self.direction = direction;
        self.state = SyncState::Synced;
        self.bits_since_sync = 0;
        self.recent_matches.clear();
        self.provisional = self.build_frame();
        log::debug!("Found {:?} sync word at bit {}", direction, self.bits_seen);
    }

    /// Expected sync missing; look back for a match that arrived early
    fn begin_resync(&mut self) {
        self.state = SyncState::Resyncing;
        let earliest = self.bits_seen.saturating_sub(self.resync_window as u64);
        let early = self
            .recent_matches
            .iter()
            .rev()
            .find(|(at, direction)| *at >= earliest && *direction == self.direction)
            .map(|(at, _)| *at);
        self.recent_matches.clear();

        if let Some(at) = early {
            // Realign on the early sync; the next one is due 80 bits after it
            self.bits_since_sync = (self.bits_seen - at) as usize;
            log::debug!(
                "Realigned on sync word {} bits early (bit {})",
                self.bits_since_sync,
                at
            );
        }
    }

    fn remember_match(&mut self, direction: PlaybackDirection) {
        self.recent_matches.push_back((self.bits_seen, direction));
        while self.recent_matches.len() > self.resync_window + 1 {
            self.recent_matches.pop_front();
        }
    }

    fn complete_frame(&mut self, lock: FrameLock, events: &mut Vec<SyncEvent>) {
        self.release_provisional(lock, events);
        if let Some(frame) = self.build_frame() {
            self.stats.frames += 1;
            events.push(SyncEvent::Frame(SyncedFrame { frame, lock }));
        }
        self.bits_since_sync = 0;
        self.state = SyncState::Synced;
    }

    fn release_provisional(&mut self, lock: FrameLock, events: &mut Vec<SyncEvent>) {
        if let Some(frame) = self.provisional.take() {
            self.stats.frames += 1;
            events.push(SyncEvent::Frame(SyncedFrame { frame, lock }));
        }
    }

    fn lose_sync(&mut self, bit: Bit, events: &mut Vec<SyncEvent>) {
        self.release_provisional(FrameLock::Unconfirmed, events);
        self.stats.losses += 1;
        self.state = SyncState::Searching;
        self.bits_since_sync = 0;
        log::debug!(
            "Lost sync at bit {} (sample {:.0})",
            self.bits_seen,
            bit.end
        );
        events.push(SyncEvent::Lost(SyncLossEvent {
            bit_offset: self.bits_seen,
            sample_offset: bit.end,
        }));
    }

    /// Frame occupying the current window
    fn build_frame(&self) -> Option<LtcFrame> {
        if self.window.len() < FRAME_BITS {
            return None;
        }
        let bits: Vec<bool> = match self.direction {
            PlaybackDirection::Forward => self.window.iter().map(|b| b.value).collect(),
            PlaybackDirection::Reverse => self.window.iter().rev().map(|b| b.value).collect(),
        };

        let mut frame = LtcFrame::from_bits(&bits)?;
        let first = self.window.front()?;
        let last = self.window.back()?;
        frame.bit_offset = self.bits_seen - FRAME_BITS as u64;
        frame.start_sample = first.start;
        frame.end_sample = last.end;
        frame.direction = self.direction;
        frame.bit_confidence =
            self.window.iter().map(|b| b.confidence).sum::<f32>() / FRAME_BITS as f32;
        frame.uncertain_bits = self.window.iter().filter(|b| b.uncertain).count() as u32;
        Some(frame)
    }
}
