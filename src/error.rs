//! Error types for the timecode decoding engine

use std::fmt;

/// Errors that abort a decode session
///
/// Per-frame problems (bad BCD digits, out-of-range fields) never surface here; they are
/// recorded on the frame log instead. A `DecodeError` means no timecode can be reported.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// Invalid input parameters or configuration
    InvalidInput(String),

    /// Signal amplitude too low to detect reliable edges
    InsufficientSignal(String),

    /// No frame synchronized successfully across the input
    SyncNotFound(String),

    /// A timecode string could not be parsed
    InvalidTimecode(String),

    /// The external decoder failed or produced unusable output
    ExternalDecoder(String),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            DecodeError::InsufficientSignal(msg) => write!(f, "Insufficient signal: {}", msg),
            DecodeError::SyncNotFound(msg) => write!(f, "Sync not found: {}", msg),
            DecodeError::InvalidTimecode(msg) => write!(f, "Invalid timecode: {}", msg),
            DecodeError::ExternalDecoder(msg) => write!(f, "External decoder error: {}", msg),
        }
    }
}

impl std::error::Error for DecodeError {}
