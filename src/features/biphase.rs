//! Biphase-mark demodulation
//!
//! Every bit cell starts with a transition; a `1` has a second transition in mid-cell.
//! Edge intervals therefore come in two classes relative to the bit period `P`:
//! long (≈ P, a `0`) and short (≈ P/2, two of them make a `1`).
//!
//! The clock is not assumed: the first `warmup_intervals` intervals are buffered, the
//! bit period is seeded from their distribution, and the buffered intervals are then
//! replayed so no bits are lost. After seeding, `P` tracks varispeed through
//! exponential smoothing over successfully classified intervals.

use crate::config::DecoderConfig;
use crate::features::edges::Edge;
use crate::features::frame::FRAME_BITS;
use std::collections::VecDeque;

/// Intervals added to a full warm-up buffer between seed attempts
const RESEED_STRIDE: usize = 32;

/// Minimum share of warm-up intervals that must classify cleanly for a seed to stand
const MIN_SEED_AGREEMENT: f64 = 0.8;

/// Confidence assigned to a forced (out-of-band) classification
const GUESS_CONFIDENCE: f32 = 0.25;

/// A demodulated bit with its span in the sample stream
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bit {
    /// Bit value
    pub value: bool,
    /// Sample position where the bit cell starts
    pub start: f64,
    /// Sample position where the bit cell ends
    pub end: f64,
    /// Classification confidence (0.0-1.0)
    pub confidence: f32,
    /// Set after two classification failures in a row
    pub uncertain: bool,
}

/// Counters describing demodulation quality
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DemodStats {
    /// Bits emitted
    pub bits: u64,
    /// Bits marked uncertain
    pub uncertain_bits: u64,
    /// Intervals outside both tolerance bands
    pub classification_failures: u64,
    /// Short intervals left without a partner
    pub orphan_halves: u64,
    /// Intervals long enough to count as signal dropouts
    pub dropouts: u64,
    /// Times the clock was discarded and re-seeded
    pub reseeds: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IntervalClass {
    Short,
    Long,
}

#[derive(Debug, Clone, Copy)]
struct Classification {
    class: IntervalClass,
    in_band: bool,
    confidence: f32,
}

#[derive(Debug, Clone, Copy)]
struct HalfCell {
    start: f64,
    confidence: f32,
    uncertain: bool,
}

/// Streaming biphase-mark demodulator
#[derive(Debug, Clone)]
pub struct BiphaseDemodulator {
    short_tolerance: f64,
    long_tolerance: f64,
    smoothing: f64,
    warmup_len: usize,
    max_failures: u32,
    dropout_ratio: f64,
    min_period: f64,
    max_period: f64,

    period: Option<f64>,
    last_edge: Option<f64>,
    warmup: VecDeque<(f64, f64)>,
    since_seed_attempt: usize,
    pending: Option<HalfCell>,
    consecutive_failures: u32,
    stats: DemodStats,
}

impl BiphaseDemodulator {
    /// Create a demodulator for the given sample rate
    ///
    /// Plausible bit periods follow from the configured frame-rate range.
    pub fn new(sample_rate: u32, config: &DecoderConfig) -> Self {
        let sr = sample_rate as f64;
        Self {
            short_tolerance: config.short_tolerance,
            long_tolerance: config.long_tolerance,
            smoothing: config.period_smoothing,
            warmup_len: config.warmup_intervals,
            max_failures: config.max_consecutive_failures,
            dropout_ratio: config.dropout_ratio,
            min_period: sr / (config.max_fps * FRAME_BITS as f64),
            max_period: sr / (config.min_fps * FRAME_BITS as f64),
            period: None,
            last_edge: None,
            warmup: VecDeque::with_capacity(config.warmup_intervals),
            since_seed_attempt: 0,
            pending: None,
            consecutive_failures: 0,
            stats: DemodStats::default(),
        }
    }

    /// Feed one edge, appending any completed bits to `out`
    pub fn push(&mut self, edge: &Edge, out: &mut Vec<Bit>) {
        if let Some(last) = self.last_edge {
            self.process_interval(last, edge.position, out);
        }
        self.last_edge = Some(edge.position);
    }

    /// Force a seed attempt on whatever is buffered
    ///
    /// Inputs shorter than the warm-up length would otherwise never produce bits.
    pub fn flush(&mut self, out: &mut Vec<Bit>) {
        if self.period.is_none() && self.warmup.len() >= RESEED_STRIDE {
            self.try_seed(out);
        }
    }

    /// Current bit-period estimate in samples
    pub fn bit_period(&self) -> Option<f64> {
        self.period
    }

    /// Demodulation counters
    pub fn stats(&self) -> DemodStats {
        self.stats
    }

    fn process_interval(&mut self, start: f64, end: f64, out: &mut Vec<Bit>) {
        let Some(period) = self.period else {
            self.buffer_interval(start, end, out);
            return;
        };

        let duration = end - start;
        if duration / period > self.dropout_ratio {
            self.stats.dropouts += 1;
            if self.pending.take().is_some() {
                self.stats.orphan_halves += 1;
            }
            log::debug!(
                "Dropout of {:.1} bit periods at sample {:.0}",
                duration / period,
                start
            );
            return;
        }

        let classification = self.classify(duration, period);
        let mut uncertain = false;
        if classification.in_band {
            self.consecutive_failures = 0;
            let observed = match classification.class {
                IntervalClass::Short => duration * 2.0,
                IntervalClass::Long => duration,
            };
            let updated = period + self.smoothing * (observed - period);
            self.period = Some(updated.clamp(self.min_period, self.max_period));
        } else {
            self.stats.classification_failures += 1;
            self.consecutive_failures += 1;
            if self.consecutive_failures >= self.max_failures {
                self.reseed(start, end);
                return;
            }
            uncertain = self.consecutive_failures >= 2;
        }

        match classification.class {
            IntervalClass::Short => match self.pending.take() {
                Some(first) => self.emit(
                    out,
                    Bit {
                        value: true,
                        start: first.start,
                        end,
                        confidence: first.confidence.min(classification.confidence),
                        uncertain: first.uncertain || uncertain,
                    },
                ),
                None => {
                    self.pending = Some(HalfCell {
                        start,
                        confidence: classification.confidence,
                        uncertain,
                    })
                }
            },
            IntervalClass::Long => {
                let orphaned = self.pending.take().is_some();
                if orphaned {
                    self.stats.orphan_halves += 1;
                }
                self.emit(
                    out,
                    Bit {
                        value: false,
                        start,
                        end,
                        confidence: if orphaned {
                            classification.confidence.min(GUESS_CONFIDENCE)
                        } else {
                            classification.confidence
                        },
                        uncertain: uncertain || orphaned,
                    },
                );
            }
        }
    }

    fn classify(&self, duration: f64, period: f64) -> Classification {
        let ratio = duration / period;
        let short_dev = (ratio - 0.5).abs();
        let long_dev = (ratio - 1.0).abs();

        if short_dev <= self.short_tolerance {
            Classification {
                class: IntervalClass::Short,
                in_band: true,
                confidence: (1.0 - 0.5 * short_dev / self.short_tolerance) as f32,
            }
        } else if long_dev <= self.long_tolerance {
            Classification {
                class: IntervalClass::Long,
                in_band: true,
                confidence: (1.0 - 0.5 * long_dev / self.long_tolerance) as f32,
            }
        } else {
            // Nearest class, flagged as a guess
            let class = if short_dev < long_dev {
                IntervalClass::Short
            } else {
                IntervalClass::Long
            };
            Classification {
                class,
                in_band: false,
                confidence: GUESS_CONFIDENCE,
            }
        }
    }

    fn emit(&mut self, out: &mut Vec<Bit>, bit: Bit) {
        self.stats.bits += 1;
        if bit.uncertain {
            self.stats.uncertain_bits += 1;
        }
        out.push(bit);
    }

    fn reseed(&mut self, start: f64, end: f64) {
        log::debug!(
            "Lost bit clock after {} failed intervals at sample {:.0}, re-seeding",
            self.consecutive_failures,
            start
        );
        self.stats.reseeds += 1;
        self.period = None;
        self.pending = None;
        self.consecutive_failures = 0;
        self.warmup.clear();
        self.since_seed_attempt = 0;
        self.warmup.push_back((start, end));
    }

    fn buffer_interval(&mut self, start: f64, end: f64, out: &mut Vec<Bit>) {
        self.warmup.push_back((start, end));
        if self.warmup.len() > self.warmup_len {
            self.warmup.pop_front();
        }
        self.since_seed_attempt += 1;
        if self.warmup.len() >= self.warmup_len && self.since_seed_attempt >= RESEED_STRIDE {
            self.try_seed(out);
        }
    }

    /// Seed the clock from the buffered intervals and replay them
    fn try_seed(&mut self, out: &mut Vec<Bit>) {
        self.since_seed_attempt = 0;
        let Some(period) = self.estimate_period() else {
            return;
        };

        log::debug!(
            "Seeded bit clock at {:.3} samples/bit ({:.2} fps equivalent period)",
            period,
            period * FRAME_BITS as f64
        );
        self.period = Some(period);
        self.pending = None;
        self.consecutive_failures = 0;

        let buffered: Vec<(f64, f64)> = self.warmup.drain(..).collect();
        for (start, end) in buffered {
            self.process_interval(start, end, out);
        }
    }

    /// Bit-period estimate from the warm-up distribution
    ///
    /// Two clusters a factor of about two apart give the period directly. A single
    /// cluster (all zeros or all ones) is resolved by plausibility against the
    /// configured frame-rate range; if both readings are plausible no seed is made.
    fn estimate_period(&self) -> Option<f64> {
        let mut durations: Vec<f64> = self
            .warmup
            .iter()
            .map(|(s, e)| e - s)
            .filter(|d| *d > 0.0)
            .collect();
        if durations.len() < RESEED_STRIDE {
            return None;
        }
        durations.sort_by(|a, b| a.total_cmp(b));

        let n = durations.len();
        let low = durations[n / 10];
        let high = durations[(n * 9) / 10];
        let spread = high / low;

        let candidate = if (1.5..=2.7).contains(&spread) {
            let threshold = (low + high) / 2.0;
            let (long_sum, long_count, short_sum, short_count) = durations.iter().fold(
                (0.0, 0usize, 0.0, 0usize),
                |(ls, lc, ss, sc), &d| {
                    if d >= threshold {
                        (ls + d, lc + 1, ss, sc)
                    } else {
                        (ls, lc, ss + d, sc + 1)
                    }
                },
            );
            (long_sum + 2.0 * short_sum) / (long_count + short_count) as f64
        } else if spread < 1.3 {
            let median = durations[n / 2];
            let as_long = self.is_plausible(median);
            let as_short = self.is_plausible(median * 2.0);
            match (as_long, as_short) {
                (true, false) => median,
                (false, true) => median * 2.0,
                _ => return None,
            }
        } else {
            return None;
        };

        if !self.is_plausible(candidate) {
            return None;
        }

        let agreeing = durations
            .iter()
            .filter(|&&d| self.classify(d, candidate).in_band)
            .count();
        if (agreeing as f64) < MIN_SEED_AGREEMENT * n as f64 {
            return None;
        }
        Some(candidate)
    }

    fn is_plausible(&self, period: f64) -> bool {
        (self.min_period..=self.max_period).contains(&period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::edges::EdgeDirection;

    /// Edge positions of a biphase-mark rendering of `bits`
    fn edges_for(bits: &[bool], period: f64) -> Vec<Edge> {
        let mut positions = Vec::new();
        for (i, &b) in bits.iter().enumerate() {
            let start = i as f64 * period;
            positions.push(start);
            if b {
                positions.push(start + period / 2.0);
            }
        }
        positions.push(bits.len() as f64 * period);
        positions
            .into_iter()
            .enumerate()
            .map(|(i, position)| Edge {
                position,
                direction: if i % 2 == 0 {
                    EdgeDirection::Rising
                } else {
                    EdgeDirection::Falling
                },
            })
            .collect()
    }

    fn pattern(len: usize) -> Vec<bool> {
        (0..len).map(|i| (i * 7 + i / 3) % 5 < 2).collect()
    }

    fn demodulate(edges: &[Edge]) -> (Vec<Bit>, BiphaseDemodulator) {
        let mut demod = BiphaseDemodulator::new(48000, &DecoderConfig::default());
        let mut bits = Vec::new();
        for edge in edges {
            demod.push(edge, &mut bits);
        }
        demod.flush(&mut bits);
        (bits, demod)
    }

    #[test]
    fn test_recovers_bits_with_warmup_replay() {
        let sent = pattern(800);
        let (bits, demod) = demodulate(&edges_for(&sent, 24.0));

        let values: Vec<bool> = bits.iter().map(|b| b.value).collect();
        assert_eq!(values, sent);
        assert!((demod.bit_period().unwrap() - 24.0).abs() < 0.1);
        assert_eq!(demod.stats().uncertain_bits, 0);
    }

    #[test]
    fn test_bit_spans_are_contiguous() {
        let sent = pattern(400);
        let (bits, _) = demodulate(&edges_for(&sent, 20.02));
        for pair in bits.windows(2) {
            assert!((pair[0].end - pair[1].start).abs() < 1e-9);
        }
    }

    #[test]
    fn test_all_zero_stream_seeds_by_plausibility() {
        // 48000 / (25 * 80) = 24 samples per bit; halved, the rate would exceed max_fps
        let sent = vec![false; 400];
        let (bits, demod) = demodulate(&edges_for(&sent, 24.0));
        assert_eq!(bits.len(), 400);
        assert!(bits.iter().all(|b| !b.value));
        assert!((demod.bit_period().unwrap() - 24.0).abs() < 0.1);
    }

    #[test]
    fn test_tracks_varispeed() {
        // Bit period drifts 5% over the stream
        let sent = pattern(2000);
        let mut position = 0.0;
        let mut edges = Vec::new();
        for (i, &b) in sent.iter().enumerate() {
            let period = 24.0 * (1.0 + 0.05 * i as f64 / sent.len() as f64);
            edges.push(position);
            if b {
                edges.push(position + period / 2.0);
            }
            position += period;
        }
        edges.push(position);
        let edges: Vec<Edge> = edges
            .into_iter()
            .map(|position| Edge {
                position,
                direction: EdgeDirection::Rising,
            })
            .collect();

        let (bits, demod) = demodulate(&edges);
        let values: Vec<bool> = bits.iter().map(|b| b.value).collect();
        assert_eq!(values, sent);
        assert!(demod.bit_period().unwrap() > 24.8);
    }

    #[test]
    fn test_irregular_intervals_never_seed() {
        // Geometric spread of intervals has no two-cluster structure
        let mut position = 0.0;
        let edges: Vec<Edge> = (0..600)
            .map(|i| {
                position += 3.0 + ((i * 37) % 41) as f64;
                Edge {
                    position,
                    direction: EdgeDirection::Rising,
                }
            })
            .collect();
        let (bits, demod) = demodulate(&edges);
        assert!(bits.is_empty());
        assert!(demod.bit_period().is_none());
    }

    #[test]
    fn test_repeated_failures_mark_uncertain() {
        let sent = pattern(400);
        let mut edges = edges_for(&sent, 24.0);
        // Stretch two consecutive intervals past the long band but short of a dropout
        let shift = 28.0;
        for edge in edges.iter_mut().skip(300) {
            edge.position += shift;
        }
        for edge in edges.iter_mut().skip(301) {
            edge.position += shift;
        }
        let (_, demod) = demodulate(&edges);
        assert!(demod.stats().classification_failures >= 2);
        assert!(demod.stats().uncertain_bits >= 1);
    }
}
