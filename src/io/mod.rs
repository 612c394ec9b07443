//! External decoder integration
//!
//! Runs a dedicated LTC decoding tool when one is installed and falls back to the
//! built-in engine otherwise.

pub mod external;

pub use external::{decode_with_fallback, DecodePath, ExternalDecoder, LtcDump, TimecodeOutput};
