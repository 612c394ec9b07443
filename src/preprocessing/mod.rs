//! Signal preprocessing
//!
//! DC removal, normalization and the adaptive hysteresis band.

pub mod conditioning;
