//! Feature extraction modules
//!
//! The bit-level half of the decoder:
//! - Edge detection with hysteresis and glitch suppression
//! - Biphase-mark demodulation with an adaptive bit clock
//! - Frame synchronization on the 16-bit sync word
//! - BCD and flag field extraction

pub mod biphase;
pub mod edges;
pub mod fields;
pub mod frame;
pub mod sync;
