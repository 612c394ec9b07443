//! Zero-crossing edge detection with hysteresis
//!
//! A crossing is reported only after the signal has travelled from one side of the
//! hysteresis band to the other, so noise hovering around zero cannot produce chatter.
//! The reported time is the linearly interpolated zero crossing between the two samples
//! that bracket it, giving sub-sample precision.
//!
//! Edges are emitted one step late: the detector holds the newest edge until the next
//! one arrives, and if the two are closer than the minimum plausible spacing both are
//! discarded as a noise glitch. Dropping the pair keeps edge directions alternating.
//!
//! The start and end of the active signal also count as edges. A biphase-mark frame
//! begins with a cell-boundary transition, and a recording that starts exactly on a
//! frame boundary would otherwise lose its first bit.

use crate::config::DecoderConfig;
use crate::features::frame::FRAME_BITS;
use crate::preprocessing::conditioning::HysteresisThresholds;

/// Direction of a polarity transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeDirection {
    /// Negative to positive
    Rising,
    /// Positive to negative
    Falling,
}

/// A polarity transition at a sub-sample position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    /// Interpolated sample position of the transition
    pub position: f64,
    /// Transition direction
    pub direction: EdgeDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Polarity {
    Unknown,
    High,
    Low,
}

/// Streaming hysteresis edge detector
#[derive(Debug, Clone)]
pub struct EdgeDetector {
    polarity: Polarity,
    previous: Option<(u64, f32)>,
    rise_candidate: Option<f64>,
    fall_candidate: Option<f64>,
    held: Option<Edge>,
    last_active: Option<u64>,
    min_spacing: f64,
    edges_emitted: u64,
    noise_merges: u64,
}

impl EdgeDetector {
    /// Create a detector for the given sample rate
    ///
    /// The minimum edge spacing is `min_edge_fraction` of the shortest half bit cell the
    /// configured frame-rate range allows.
    pub fn new(sample_rate: u32, config: &DecoderConfig) -> Self {
        let shortest_half_cell = sample_rate as f64 / (config.max_fps * FRAME_BITS as f64) / 2.0;
        Self {
            polarity: Polarity::Unknown,
            previous: None,
            rise_candidate: None,
            fall_candidate: None,
            held: None,
            last_active: None,
            min_spacing: config.min_edge_fraction * shortest_half_cell,
            edges_emitted: 0,
            noise_merges: 0,
        }
    }

    /// Feed one conditioned sample
    ///
    /// Returns an edge when one is released from the one-edge hold.
    pub fn push(&mut self, index: u64, value: f32, thresholds: HysteresisThresholds) -> Option<Edge> {
        if let Some((prev_index, prev)) = self.previous {
            if prev <= 0.0 && value > 0.0 {
                self.rise_candidate = Some(interpolate(prev_index, prev, value));
            } else if prev >= 0.0 && value < 0.0 {
                self.fall_candidate = Some(interpolate(prev_index, prev, value));
            }
        }
        self.previous = Some((index, value));

        let crossed = if value > thresholds.upper && self.polarity != Polarity::High {
            Some((Polarity::High, EdgeDirection::Rising, self.rise_candidate))
        } else if value < thresholds.lower && self.polarity != Polarity::Low {
            Some((Polarity::Low, EdgeDirection::Falling, self.fall_candidate))
        } else {
            None
        };

        if value > thresholds.upper || value < thresholds.lower {
            self.last_active = Some(index);
        }

        let (polarity, direction, candidate) = crossed?;
        let was_unknown = self.polarity == Polarity::Unknown;
        self.polarity = polarity;

        let position = if was_unknown {
            // Signal onset: the sample straddles the first cell boundary
            index as f64 - 0.5
        } else {
            candidate?
        };
        self.offer(Edge {
            position,
            direction,
        })
    }

    /// Release the held edge and the end-of-signal edge
    ///
    /// Call once after the last sample.
    pub fn flush(&mut self) -> Vec<Edge> {
        let mut out = Vec::with_capacity(2);
        let end = match (self.polarity, self.last_active) {
            (Polarity::High, Some(last)) => Some(Edge {
                position: last as f64 + 0.5,
                direction: EdgeDirection::Falling,
            }),
            (Polarity::Low, Some(last)) => Some(Edge {
                position: last as f64 + 0.5,
                direction: EdgeDirection::Rising,
            }),
            _ => None,
        };
        if let Some(edge) = end {
            if let Some(released) = self.offer(edge) {
                out.push(released);
            }
        }
        if let Some(held) = self.held.take() {
            self.edges_emitted += 1;
            out.push(held);
        }
        self.polarity = Polarity::Unknown;
        out
    }

    /// Edges released so far
    pub fn edges_emitted(&self) -> u64 {
        self.edges_emitted
    }

    /// Edge pairs discarded as noise glitches
    pub fn noise_merges(&self) -> u64 {
        self.noise_merges
    }

    fn offer(&mut self, edge: Edge) -> Option<Edge> {
        match self.held.take() {
            Some(held) if edge.position - held.position < self.min_spacing => {
                self.noise_merges += 1;
                log::trace!(
                    "Merged noise edges at {:.2} and {:.2}",
                    held.position,
                    edge.position
                );
                None
            }
            Some(held) => {
                self.held = Some(edge);
                self.edges_emitted += 1;
                Some(held)
            }
            None => {
                self.held = Some(edge);
                None
            }
        }
    }
}

/// Linear interpolation of the zero crossing between samples `i` and `i + 1`
fn interpolate(prev_index: u64, prev: f32, value: f32) -> f64 {
    let span = (prev - value) as f64;
    let fraction = if span.abs() > f64::EPSILON {
        prev as f64 / span
    } else {
        0.0
    };
    prev_index as f64 + fraction.clamp(0.0, 1.0)
}
