//! # LTC DSP
//!
//! A decoding engine for SMPTE Linear Timecode (LTC) carried as an audio signal. It
//! recovers the timecode sequence from a mono sample stream, validates it frame by
//! frame, and reports one representative start timecode with per-frame diagnostics.
//!
//! ## Features
//!
//! - **Adaptive conditioning**: DC removal, peak normalization and an envelope-tracking
//!   hysteresis band, so level changes and tape dropouts do not break edge detection
//! - **Self-clocking demodulation**: the bit period is learned from the signal and
//!   tracked continuously, covering 23.976 to 30 fps and varispeed playback
//! - **Frame sync in both directions**: forward and reversed playback, with bounded
//!   resynchronization after dropped or inserted bits
//! - **Continuity checking**: drop-frame aware timeline assembly with gap reporting
//!
//! ## Quick Start
//!
//! ```no_run
//! use ltc_dsp::{decode_ltc, DecoderConfig};
//!
//! // Mono samples from the channel carrying LTC
//! let samples: Vec<f32> = vec![];
//! let sample_rate = 48000;
//!
//! let result = decode_ltc(&samples, sample_rate, DecoderConfig::default())?;
//!
//! println!("Timecode: {} at {}", result.timecode, result.frame_rate.rate);
//! # Ok::<(), ltc_dsp::DecodeError>(())
//! ```
//!
//! ## Architecture
//!
//! The decode pipeline follows this flow:
//!
//! ```text
//! Samples → Conditioning → Edges → Biphase Bits → Frame Sync → Fields → Timeline → Result
//! ```
//!
//! Every stage is a streaming state machine owned by a [`DecodeSession`], so inputs of
//! any length are decoded in bounded memory.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod analysis;
pub mod config;
pub mod error;
pub mod features;
pub mod generator;
pub mod io;
pub mod preprocessing;
pub mod session;
pub mod timecode;

// Re-export main types
pub use analysis::confidence::{compute_confidence, DecodeConfidence};
pub use analysis::rate::RateEstimate;
pub use analysis::result::{DecodeFlag, DecodeMetadata, DecodeResult, FrameRecord, FrameStatus, GapEvent};
pub use config::DecoderConfig;
pub use error::DecodeError;
pub use generator::LtcGenerator;
pub use io::external::decode_with_fallback;
pub use session::DecodeSession;
pub use timecode::{FrameRate, TimecodeValue};

/// Samples handed to the session per step
const CHUNK_SIZE: usize = 4096;

/// Main decode function
///
/// Decodes a complete buffer of mono samples and returns the representative timecode
/// together with the per-frame decode log.
///
/// # Arguments
///
/// * `samples` - Mono samples of the channel carrying LTC, any level and DC offset
/// * `sample_rate` - Sample rate in Hz (typically 44100 or 48000)
/// * `config` - Decoder configuration
///
/// # Returns
///
/// `DecodeResult` with the representative timecode, frame rate estimate, frame log,
/// gaps and sync-loss events
///
/// # Errors
///
/// - `DecodeError::InvalidInput` for empty input, a zero sample rate or a bad config
/// - `DecodeError::InsufficientSignal` if the signal is too quiet for edge detection
/// - `DecodeError::SyncNotFound` if no run of validated frames could be decoded
///
/// A failed decode is always an error; no default timecode is returned.
///
/// # Example
///
/// ```no_run
/// use ltc_dsp::{decode_ltc, DecoderConfig};
///
/// let samples = vec![0.0f32; 48000 * 10]; // 10 seconds of silence
/// let result = decode_ltc(&samples, 48000, DecoderConfig::default());
/// assert!(result.is_err());
/// ```
pub fn decode_ltc(
    samples: &[f32],
    sample_rate: u32,
    config: DecoderConfig,
) -> Result<DecodeResult, DecodeError> {
    log::debug!("Starting LTC decode: {} samples at {} Hz", samples.len(), sample_rate);

    if samples.is_empty() {
        return Err(DecodeError::InvalidInput("Empty audio samples".to_string()));
    }
    if sample_rate == 0 {
        return Err(DecodeError::InvalidInput("Invalid sample rate".to_string()));
    }
    config.validate()?;

    // Reject silent input before any edge or sync work
    preprocessing::conditioning::measure(samples, sample_rate, &config).check_sufficient()?;

    let mut session = DecodeSession::new(sample_rate, config)?;
    for chunk in samples.chunks(CHUNK_SIZE) {
        session.push_samples(chunk);
        if session.is_finished() {
            break;
        }
    }
    session.finish()
}
