//! Analysis and result aggregation modules
//!
//! Turns decoded frames into a result:
//! - Frame rate estimation
//! - Timeline assembly and continuity checking
//! - Result types
//! - Confidence scoring

pub mod assembler;
pub mod confidence;
pub mod rate;
pub mod result;
