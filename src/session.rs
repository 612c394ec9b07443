//! Per-session decode context
//!
//! A `DecodeSession` owns every piece of decoder state for one input: conditioner levels,
//! the edge hold, the bit-period estimate, the 80-bit window, rate statistics, the
//! assembled timeline and the error counters. Nothing is shared between sessions, so
//! decoding many files concurrently needs one session per file and no locking.
//!
//! Samples can be pushed in chunks of any size as they become available. Edge positions
//! are absolute sample indices, so chunk boundaries have no effect on the result.
//!
//! # Example
//!
//! ```no_run
//! use ltc_dsp::{DecodeSession, DecoderConfig};
//!
//! let config = DecoderConfig {
//!     stop_after_frames: Some(25),
//!     ..Default::default()
//! };
//! let mut session = DecodeSession::new(48000, config)?;
//! # let chunks: Vec<Vec<f32>> = vec![];
//! for chunk in chunks {
//!     session.push_samples(&chunk);
//!     if session.is_finished() {
//!         break;
//!     }
//! }
//! let result = session.finish()?;
//! println!("{}", result.timecode);
//! # Ok::<(), ltc_dsp::DecodeError>(())
//! ```

use crate::analysis::assembler::TimecodeStreamAssembler;
use crate::analysis::rate::{FrameRateEstimator, RateEstimate};
use crate::analysis::result::{DecodeFlag, DecodeMetadata, DecodeResult};
use crate::config::DecoderConfig;
use crate::error::DecodeError;
use crate::features::biphase::{BiphaseDemodulator, Bit};
use crate::features::edges::{Edge, EdgeDetector};
use crate::features::fields::{TimecodeDecoder, DROP_FRAME_BIT};
use crate::features::frame::{PlaybackDirection, FRAME_BITS};
use crate::features::sync::{FrameLock, FrameSynchronizer, SyncEvent, SyncLossEvent, SyncedFrame};
use crate::preprocessing::conditioning::SignalConditioner;
use crate::timecode::TimecodeValue;
use std::time::{Duration, Instant};

/// Share of uncertain bits above which the result is flagged `LowSignalQuality`
const LOW_QUALITY_UNCERTAIN_RATIO: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Running,
    /// Early-termination run length reached
    Satisfied,
    /// Nothing synchronized within the initial search window
    SearchExhausted,
}

/// Streaming LTC decode session
#[derive(Debug)]
pub struct DecodeSession {
    sample_rate: u32,
    config: DecoderConfig,
    conditioner: SignalConditioner,
    edges: EdgeDetector,
    demodulator: BiphaseDemodulator,
    synchronizer: FrameSynchronizer,
    rate: FrameRateEstimator,
    assembler: TimecodeStreamAssembler,
    sample_index: u64,
    bits: Vec<Bit>,
    events: Vec<SyncEvent>,
    sync_losses: Vec<SyncLossEvent>,
    frames_synced: usize,
    search_limit: Option<u64>,
    state: SessionState,
    processing: Duration,
}

impl DecodeSession {
    /// Start a session
    ///
    /// # Errors
    ///
    /// Returns `DecodeError::InvalidInput` for a zero sample rate or an invalid config
    pub fn new(sample_rate: u32, config: DecoderConfig) -> Result<Self, DecodeError> {
        if sample_rate == 0 {
            return Err(DecodeError::InvalidInput("Invalid sample rate".to_string()));
        }
        config.validate()?;

        Ok(Self {
            sample_rate,
            conditioner: SignalConditioner::new(sample_rate, &config),
            edges: EdgeDetector::new(sample_rate, &config),
            demodulator: BiphaseDemodulator::new(sample_rate, &config),
            synchronizer: FrameSynchronizer::new(config.resync_window_bits),
            rate: FrameRateEstimator::new(sample_rate, &config),
            assembler: TimecodeStreamAssembler::new(&config),
            sample_index: 0,
            bits: Vec::new(),
            events: Vec::new(),
            sync_losses: Vec::new(),
            frames_synced: 0,
            search_limit: config
                .max_search_seconds
                .map(|s| (s as f64 * sample_rate as f64) as u64),
            state: SessionState::Running,
            processing: Duration::ZERO,
            config,
        })
    }

    /// Feed the next chunk of mono samples
    ///
    /// Ignored once the session is finished (see [`DecodeSession::is_finished`]).
    pub fn push_samples(&mut self, samples: &[f32]) {
        if self.state != SessionState::Running {
            return;
        }
        let started = Instant::now();

        for &sample in samples {
            let conditioned = self.conditioner.process(sample);
            let thresholds = self.conditioner.thresholds();
            if let Some(edge) = self.edges.push(self.sample_index, conditioned, thresholds) {
                self.handle_edge(edge);
            }
            self.sample_index += 1;

            if self.is_satisfied() {
                log::debug!(
                    "Early termination after {} samples: run of {} frames",
                    self.sample_index,
                    self.assembler.current_run_length()
                );
                self.state = SessionState::Satisfied;
                break;
            }
            if matches!(self.search_limit, Some(limit) if self.frames_synced == 0 && self.sample_index >= limit)
            {
                log::debug!("No sync within the first {} samples, giving up", self.sample_index);
                self.state = SessionState::SearchExhausted;
                break;
            }
        }

        self.processing += started.elapsed();
    }

    /// True once a run of `stop_after_frames` validated frames exists
    pub fn is_satisfied(&self) -> bool {
        self.config
            .stop_after_frames
            .map_or(false, |n| self.assembler.current_run_length() >= n)
    }

    /// True once further samples would be ignored
    pub fn is_finished(&self) -> bool {
        self.state != SessionState::Running
    }

    /// Representative timecode so far, if any run is long enough
    pub fn representative(&self) -> Option<TimecodeValue> {
        self.assembler.representative()
    }

    /// Current frame rate estimate
    pub fn rate_estimate(&self) -> Option<RateEstimate> {
        self.rate.estimate()
    }

    /// Frames emitted by the synchronizer so far
    pub fn frames_synced(&self) -> usize {
        self.frames_synced
    }

    /// Samples consumed so far
    pub fn samples_processed(&self) -> u64 {
        self.sample_index
    }

    /// Close the session and build the result
    ///
    /// # Errors
    ///
    /// - `DecodeError::InsufficientSignal` if the signal never rose above the amplitude floor
    /// - `DecodeError::SyncNotFound` if no run of validated frames was decoded
    pub fn finish(mut self) -> Result<DecodeResult, DecodeError> {
        let started = Instant::now();
        if self.state == SessionState::Running {
            for edge in self.edges.flush() {
                self.handle_edge(edge);
            }
            self.demodulator.flush(&mut self.bits);
            self.drain_bits();
            self.synchronizer.flush(&mut self.events);
            self.drain_events();
        }

        let signal = self.conditioner.stats();
        log::debug!(
            "Signal: peak {:.1} dBFS, noise floor {:.1} dBFS, DC {:.4}",
            signal.peak_db,
            signal.noise_floor_db,
            signal.dc_offset
        );
        self.conditioner.check_sufficient()?;

        let duration_seconds = self.sample_index as f32 / self.sample_rate as f32;
        let demod = self.demodulator.stats();
        let estimate = self.rate.estimate();
        let frames_synced = self.frames_synced;
        let assembly = self.assembler.finish();

        let Some(representative) = assembly.representative else {
            let msg = if frames_synced == 0 {
                match self.state {
                    SessionState::SearchExhausted => format!(
                        "no LTC sync word within the first {:.1} s",
                        duration_seconds
                    ),
                    _ => format!("no LTC sync word in {:.1} s of signal", duration_seconds),
                }
            } else {
                format!(
                    "{} frames synchronized but none formed a run of {} consecutive valid frames",
                    frames_synced, self.config.min_run_frames
                )
            };
            log::warn!("Decode failed: {}", msg);
            return Err(DecodeError::SyncNotFound(msg));
        };

        let frame_rate = estimate.unwrap_or_else(|| {
            // Only resynchronized frames were seen; fall back on the representative frame
            let record = &representative.record;
            let bit_period = (record.end_sample - record.start_sample) / FRAME_BITS as f64;
            let rate = self.rate.rate_for_period(bit_period, record.flags.drop_frame);
            RateEstimate {
                rate,
                measured_fps: self.sample_rate as f64 / (bit_period * FRAME_BITS as f64),
                drop_frame: record.timecode.drop_frame,
                confidence: 0.0,
                ambiguous: true,
                frames_observed: 0,
                bit_period_samples: bit_period,
            }
        });

        let mut flags = Vec::new();
        let mut warnings = Vec::new();
        if frame_rate.ambiguous {
            flags.push(DecodeFlag::RateAmbiguous);
            warnings.push(format!(
                "Frame rate {:.3} fps snapped to {} with confidence {:.2}",
                frame_rate.measured_fps, frame_rate.rate, frame_rate.confidence
            ));
        }
        let discontinuous = !assembly.gaps.is_empty()
            || !self.sync_losses.is_empty()
            || assembly.continuity_violations > 0
            || assembly.invalid_frames > 0;
        if discontinuous {
            flags.push(DecodeFlag::PartialDecode);
            warnings.push(format!(
                "Stream is discontinuous: {} gaps, {} sync losses, {} invalid frames, {} continuity violations",
                assembly.gaps.len(),
                self.sync_losses.len(),
                assembly.invalid_frames,
                assembly.continuity_violations
            ));
        }
        if assembly.direction == PlaybackDirection::Reverse {
            flags.push(DecodeFlag::ReversedPlayback);
        }
        if demod.bits > 0
            && demod.uncertain_bits as f64 > LOW_QUALITY_UNCERTAIN_RATIO * demod.bits as f64
        {
            flags.push(DecodeFlag::LowSignalQuality);
            warnings.push(format!(
                "{} of {} bits demodulated with low confidence",
                demod.uncertain_bits, demod.bits
            ));
        }

        let frames_accepted = assembly.records.iter().filter(|r| r.is_accepted()).count();
        self.processing += started.elapsed();

        log::info!(
            "Decoded {} at {} ({} of {} frames accepted, run of {})",
            representative.record.timecode,
            frame_rate.rate,
            frames_accepted,
            frames_synced,
            representative.run_length
        );

        Ok(DecodeResult {
            timecode: representative.record.timecode,
            run_length: representative.run_length,
            representative_sample: representative.record.start_sample,
            frame_rate,
            direction: assembly.direction,
            metadata: DecodeMetadata {
                duration_seconds,
                sample_rate: self.sample_rate,
                processing_time_ms: self.processing.as_secs_f32() * 1000.0,
                algorithm_version: env!("CARGO_PKG_VERSION").to_string(),
                signal,
                bit_period_samples: self
                    .demodulator
                    .bit_period()
                    .unwrap_or(frame_rate.bit_period_samples),
                bits_decoded: demod.bits,
                uncertain_bits: demod.uncertain_bits,
                classification_failures: demod.classification_failures,
                clock_reseeds: demod.reseeds,
                noise_edges_merged: self.edges.noise_merges(),
                frames_synced,
                frames_accepted,
                frames_invalid: assembly.invalid_frames,
                continuity_violations: assembly.continuity_violations,
                stopped_early: self.state == SessionState::Satisfied,
                flags,
                warnings,
            },
            frames: assembly.records,
            gaps: assembly.gaps,
            sync_losses: self.sync_losses,
        })
    }

    fn handle_edge(&mut self, edge: Edge) {
        self.demodulator.push(&edge, &mut self.bits);
        self.drain_bits();
    }

    fn drain_bits(&mut self) {
        if self.bits.is_empty() {
            return;
        }
        for &bit in &self.bits {
            self.synchronizer.push(bit, &mut self.events);
        }
        self.bits.clear();
        self.drain_events();
    }

    fn drain_events(&mut self) {
        let mut events = std::mem::take(&mut self.events);
        for event in events.drain(..) {
            match event {
                SyncEvent::Frame(synced) => self.handle_frame(synced),
                SyncEvent::Lost(loss) => {
                    self.sync_losses.push(loss);
                    self.assembler.note_sync_loss();
                }
            }
        }
        self.events = events;
    }

    fn handle_frame(&mut self, synced: SyncedFrame) {
        let SyncedFrame { frame, lock } = synced;
        self.frames_synced += 1;

        let bit_period = frame.bit_period_samples();
        let drop_flag = frame.bit(DROP_FRAME_BIT);
        if lock == FrameLock::Confirmed {
            self.rate.observe(bit_period, drop_flag);
        }
        let rate = self
            .rate
            .estimate()
            .map(|e| e.rate)
            .unwrap_or_else(|| self.rate.rate_for_period(bit_period, drop_flag));

        let fields = TimecodeDecoder::new(rate).decode(&frame);
        self.assembler.push(&frame, lock, fields, rate.nominal_fps());
    }
}
