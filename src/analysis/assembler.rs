//! Timeline assembly from decoded frames
//!
//! Each valid, synchronized frame is checked against the timecode the timeline
//! predicts for its position: the last accepted timecode advanced by the number of
//! frame periods elapsed since it (backwards for reversed playback). This keeps the check
//! exact across frames that were lost in between, and across drop-frame minute
//! boundaries, since the arithmetic skips dropped labels.
//!
//! A frame that disagrees is rejected and the timeline is kept. Only when
//! `relock_frames` consecutive frames agree on a different timeline (an edit point or a
//! restarted tape) is that timeline adopted.
//!
//! A run is a maximal stretch of accepted frames one frame period apart. The
//! representative timecode is the earliest frame of the longest run.

use crate::analysis::result::{FrameIssue, FrameRecord, FrameStatus, GapEvent, GapKind};
use crate::config::DecoderConfig;
use crate::features::fields::DecodedFields;
use crate::features::frame::{LtcFrame, PlaybackDirection};
use crate::features::sync::FrameLock;
use crate::timecode::TimecodeValue;

/// Where the timeline stands: the last accepted frame
#[derive(Debug, Clone, Copy)]
struct Anchor {
    timecode: TimecodeValue,
    end_sample: f64,
    frame_span: f64,
    direction: PlaybackDirection,
    record: usize,
}

impl Anchor {
    fn new(timecode: TimecodeValue, frame: &LtcFrame, record: usize) -> Self {
        Self {
            timecode,
            end_sample: frame.end_sample,
            frame_span: frame.end_sample - frame.start_sample,
            direction: frame.direction,
            record,
        }
    }

    /// Frame periods between this anchor and `frame`, at least one
    fn elapsed_frames(&self, frame: &LtcFrame) -> u32 {
        if self.frame_span <= 0.0 {
            return 1;
        }
        let periods = ((frame.end_sample - self.end_sample) / self.frame_span).round();
        periods.max(1.0) as u32
    }

    /// Timecode expected for `frame`, with the frame-period count it spans
    fn predict(&self, frame: &LtcFrame, nominal_fps: u8) -> (TimecodeValue, u32) {
        let elapsed = self.elapsed_frames(frame);
        let step = match self.direction {
            PlaybackDirection::Forward => elapsed as i64,
            PlaybackDirection::Reverse => -(elapsed as i64),
        };
        (self.timecode.offset(step, nominal_fps), elapsed)
    }
}

#[derive(Debug, Clone, Copy)]
struct Run {
    first_record: usize,
    last_record: usize,
    length: usize,
    direction: PlaybackDirection,
}

impl Run {
    /// Record holding the earliest timecode of the run
    fn earliest_record(&self) -> usize {
        match self.direction {
            PlaybackDirection::Forward => self.first_record,
            PlaybackDirection::Reverse => self.last_record,
        }
    }
}

/// A competing timeline seen while the current one is kept
#[derive(Debug, Clone)]
struct Candidate {
    anchor: Anchor,
    records: Vec<usize>,
}

/// The representative frame of a decode
#[derive(Debug, Clone)]
pub struct Representative {
    /// First record of the run
    pub record: FrameRecord,
    /// Accepted frames in the run
    pub run_length: usize,
}

/// Final output of the assembler
#[derive(Debug, Clone)]
pub struct Assembly {
    /// Decode log, in forward timecode order
    pub records: Vec<FrameRecord>,
    /// Gaps between accepted frames, in forward order
    pub gaps: Vec<GapEvent>,
    /// Start of the longest qualifying run, if any
    pub representative: Option<Representative>,
    /// Direction of the best run
    pub direction: PlaybackDirection,
    /// Valid frames rejected by the continuity check
    pub continuity_violations: usize,
    /// Frames that failed field validation
    pub invalid_frames: usize,
}

/// Streaming timeline assembler
#[derive(Debug, Clone)]
pub struct TimecodeStreamAssembler {
    relock_frames: usize,
    min_run_frames: usize,
    records: Vec<FrameRecord>,
    anchor: Option<Anchor>,
    current: Option<Run>,
    best: Option<Run>,
    candidate: Option<Candidate>,
    gaps: Vec<GapEvent>,
    violations: usize,
    invalid: usize,
}

impl TimecodeStreamAssembler {
    /// Empty assembler using the run and tolerance settings of `config`
    pub fn new(config: &DecoderConfig) -> Self {
        Self {
            relock_frames: config.relock_frames,
            min_run_frames: config.min_run_frames,
            records: Vec::new(),
            anchor: None,
            current: None,
            best: None,
            candidate: None,
            gaps: Vec::new(),
            violations: 0,
            invalid: 0,
        }
    }

    /// Add a synchronized frame and its decoded fields
    ///
    /// `nominal_fps` is the label count per second of the current rate estimate.
    pub fn push(
        &mut self,
        frame: &LtcFrame,
        lock: FrameLock,
        fields: DecodedFields,
        nominal_fps: u8,
    ) -> FrameStatus {
        let index = self.records.len();
        let tc = fields.timecode;
        let valid = fields.is_valid();
        let mut issues = fields.issues;

        let status = if lock == FrameLock::Unconfirmed {
            self.close_run();
            FrameStatus::Unconfirmed
        } else if !issues.is_empty() {
            self.invalid += 1;
            self.close_run();
            log::debug!("Frame {} invalid: {:?}", index, issues);
            FrameStatus::Invalid
        } else {
            match self.anchor {
                None => {
                    self.start_run(index, frame.direction, 1);
                    self.anchor = Some(Anchor::new(tc, frame, index));
                    FrameStatus::Accepted
                }
                Some(anchor) => {
                    let (expected, elapsed) = anchor.predict(frame, nominal_fps);
                    if frame.direction == anchor.direction && same_label(&expected, &tc) {
                        self.accept(anchor, tc, frame, index, elapsed);
                        FrameStatus::Accepted
                    } else {
                        self.violations += 1;
                        self.close_run();
                        log::debug!(
                            "Continuity violation at frame {}: expected {}, decoded {}",
                            index,
                            expected,
                            tc
                        );
                        issues.push(FrameIssue::ContinuityViolation { expected });
                        self.track_candidate(tc, frame, index, nominal_fps);
                        FrameStatus::Rejected
                    }
                }
            }
        };

        let lock_weight = match lock {
            FrameLock::Confirmed => 1.0,
            FrameLock::Reacquired => 0.7,
            FrameLock::Unconfirmed => 0.3,
        };
        self.records.push(FrameRecord {
            timecode: tc,
            valid,
            status,
            confidence: frame.bit_confidence * lock_weight,
            lock,
            direction: frame.direction,
            bit_offset: frame.bit_offset,
            start_sample: frame.start_sample,
            end_sample: frame.end_sample,
            user_bits: fields.user_bits,
            flags: fields.flags,
            uncertain_bits: frame.uncertain_bits,
            issues,
        });

        if status == FrameStatus::Rejected {
            self.maybe_relock();
        }
        status
    }

    /// A sync loss ends the current run
    pub fn note_sync_loss(&mut self) {
        self.close_run();
    }

    /// Length of the run still being extended
    pub fn current_run_length(&self) -> usize {
        self.current.map_or(0, |r| r.length)
    }

    /// Frames logged so far
    pub fn frames_logged(&self) -> usize {
        self.records.len()
    }

    /// Representative timecode so far, if a long enough run exists
    pub fn representative(&self) -> Option<TimecodeValue> {
        self.best_run()
            .and_then(|run| self.records.get(run.earliest_record()))
            .map(|r| r.timecode)
    }

    /// Close the log and pick the representative frame
    pub fn finish(mut self) -> Assembly {
        self.close_run();
        let best = self.best_run();
        let representative = best.and_then(|run| {
            self.records.get(run.earliest_record()).map(|record| Representative {
                record: record.clone(),
                run_length: run.length,
            })
        });
        let direction = best.map_or(PlaybackDirection::Forward, |r| r.direction);

        let mut records = self.records;
        let mut gaps = self.gaps;
        if direction == PlaybackDirection::Reverse {
            records.reverse();
            gaps.reverse();
            for gap in &mut gaps {
                std::mem::swap(&mut gap.after, &mut gap.before);
            }
        }

        Assembly {
            records,
            gaps,
            representative,
            direction,
            continuity_violations: self.violations,
            invalid_frames: self.invalid,
        }
    }

    fn best_run(&self) -> Option<Run> {
        let longest = match (self.best, self.current) {
            (Some(best), Some(current)) if current.length > best.length => Some(current),
            (Some(best), _) => Some(best),
            (None, current) => current,
        };
        longest.filter(|run| run.length >= self.min_run_frames)
    }

    fn accept(
        &mut self,
        anchor: Anchor,
        tc: TimecodeValue,
        frame: &LtcFrame,
        index: usize,
        elapsed: u32,
    ) {
        self.candidate = None;
        let contiguous = elapsed == 1
            && self
                .current
                .map_or(false, |run| run.last_record == anchor.record);
        if contiguous {
            if let Some(run) = self.current.as_mut() {
                run.last_record = index;
                run.length += 1;
            }
        } else {
            if elapsed > 1 {
                self.gaps.push(GapEvent {
                    kind: GapKind::MissingFrames,
                    after: anchor.timecode,
                    before: tc,
                    missing_frames: elapsed - 1,
                    sample_offset: frame.start_sample,
                });
            }
            self.close_run();
            self.start_run(index, frame.direction, 1);
        }
        self.anchor = Some(Anchor::new(tc, frame, index));
    }

    fn track_candidate(&mut self, tc: TimecodeValue, frame: &LtcFrame, index: usize, nominal_fps: u8) {
        let continues = self.candidate.as_ref().map_or(false, |c| {
            let (expected, _) = c.anchor.predict(frame, nominal_fps);
            frame.direction == c.anchor.direction && same_label(&expected, &tc)
        });
        let anchor = Anchor::new(tc, frame, index);
        if continues {
            if let Some(candidate) = self.candidate.as_mut() {
                candidate.anchor = anchor;
                candidate.records.push(index);
            }
        } else {
            self.candidate = Some(Candidate {
                anchor,
                records: vec![index],
            });
        }
    }

    /// Adopt the competing timeline once enough frames agree on it
    fn maybe_relock(&mut self) {
        let ready = self
            .candidate
            .as_ref()
            .map_or(false, |c| c.records.len() >= self.relock_frames);
        if !ready {
            return;
        }
        let Some(candidate) = self.candidate.take() else {
            return;
        };
        let (Some(&first), Some(&last)) = (candidate.records.first(), candidate.records.last()) else {
            return;
        };

        for &i in &candidate.records {
            if let Some(record) = self.records.get_mut(i) {
                record.status = FrameStatus::Accepted;
                record
                    .issues
                    .retain(|issue| !matches!(issue, FrameIssue::ContinuityViolation { .. }));
            }
        }
        self.violations = self.violations.saturating_sub(candidate.records.len());

        if let (Some(previous), Some(adopted)) = (self.anchor, self.records.get(first)) {
            log::info!(
                "Timecode jumps from {} to {}, adopting new timeline",
                previous.timecode,
                adopted.timecode
            );
            self.gaps.push(GapEvent {
                kind: GapKind::Discontinuity,
                after: previous.timecode,
                before: adopted.timecode,
                missing_frames: 0,
                sample_offset: adopted.start_sample,
            });
        }

        self.close_run();
        self.current = Some(Run {
            first_record: first,
            last_record: last,
            length: candidate.records.len(),
            direction: candidate.anchor.direction,
        });
        self.anchor = Some(candidate.anchor);
    }

    fn start_run(&mut self, index: usize, direction: PlaybackDirection, length: usize) {
        self.current = Some(Run {
            first_record: index,
            last_record: index,
            length,
            direction,
        });
    }

    fn close_run(&mut self) {
        if let Some(run) = self.current.take() {
            if self.best.map_or(true, |best| run.length > best.length) {
                self.best = Some(run);
            }
        }
    }
}

/// Same label, ignoring the color-frame flag
fn same_label(a: &TimecodeValue, b: &TimecodeValue) -> bool {
    a.hours == b.hours
        && a.minutes == b.minutes
        && a.seconds == b.seconds
        && a.frames == b.frames
        && a.drop_frame == b.drop_frame
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::fields::{encode_frame, FieldLayout, TimecodeDecoder};
    use crate::timecode::FrameRate;

    const SPAN: f64 = 1920.0;

    struct Feed {
        assembler: TimecodeStreamAssembler,
        decoder: TimecodeDecoder,
        rate: FrameRate,
    }

    impl Feed {
        fn new(rate: FrameRate) -> Self {
            Self {
                assembler: TimecodeStreamAssembler::new(&DecoderConfig::default()),
                decoder: TimecodeDecoder::new(rate),
                rate,
            }
        }

        /// Push the frame that occupies slot `slot` of the stream
        fn push(&mut self, tc: TimecodeValue, slot: usize, direction: PlaybackDirection) -> FrameStatus {
            let bits = encode_frame(&tc, &[0; 8], [false; 3], FieldLayout::for_rate(self.rate));
            let mut frame = LtcFrame::from_bits(&bits).unwrap();
            frame.start_sample = slot as f64 * SPAN;
            frame.end_sample = frame.start_sample + SPAN;
            frame.direction = direction;
            let fields = self.decoder.decode(&frame);
            self.assembler
                .push(&frame, FrameLock::Confirmed, fields, self.rate.nominal_fps())
        }
    }

    #[test]
    fn test_contiguous_stream_forms_one_run() {
        let mut feed = Feed::new(FrameRate::Fps25);
        let mut tc = TimecodeValue::new(1, 0, 0, 0);
        for slot in 0..50 {
            assert_eq!(feed.push(tc, slot, PlaybackDirection::Forward), FrameStatus::Accepted);
            tc = tc.next(25);
        }
        assert_eq!(feed.assembler.current_run_length(), 50);
        let assembly = feed.assembler.finish();
        let rep = assembly.representative.unwrap();
        assert_eq!(rep.record.timecode, TimecodeValue::new(1, 0, 0, 0));
        assert_eq!(rep.run_length, 50);
        assert!(assembly.gaps.is_empty());
    }

    #[test]
    fn test_single_bad_frame_does_not_redirect_timeline() {
        let mut feed = Feed::new(FrameRate::Fps25);
        let start = TimecodeValue::new(1, 0, 0, 0);
        for slot in 0..10 {
            feed.push(start.offset(slot as i64, 25), slot, PlaybackDirection::Forward);
        }
        // Valid-looking but wrong label at slot 10
        let status = feed.push(TimecodeValue::new(7, 7, 7, 7), 10, PlaybackDirection::Forward);
        assert_eq!(status, FrameStatus::Rejected);
        for slot in 11..20 {
            let status = feed.push(start.offset(slot as i64, 25), slot, PlaybackDirection::Forward);
            assert_eq!(status, FrameStatus::Accepted);
        }

        let assembly = feed.assembler.finish();
        assert_eq!(assembly.continuity_violations, 1);
        assert_eq!(assembly.gaps.len(), 1);
        assert_eq!(assembly.gaps[0].kind, GapKind::MissingFrames);
        assert_eq!(assembly.gaps[0].missing_frames, 1);
        assert_eq!(assembly.representative.unwrap().record.timecode, start);
    }

    #[test]
    fn test_relocks_on_new_timeline() {
        let mut feed = Feed::new(FrameRate::Fps25);
        let first = TimecodeValue::new(1, 0, 0, 0);
        let second = TimecodeValue::new(2, 30, 0, 0);
        for slot in 0..5 {
            feed.push(first.offset(slot as i64, 25), slot, PlaybackDirection::Forward);
        }
        for slot in 5..40 {
            feed.push(second.offset(slot as i64 - 5, 25), slot, PlaybackDirection::Forward);
        }

        let assembly = feed.assembler.finish();
        assert_eq!(assembly.gaps.len(), 1);
        assert_eq!(assembly.gaps[0].kind, GapKind::Discontinuity);
        assert_eq!(assembly.continuity_violations, 0);
        let rep = assembly.representative.unwrap();
        assert_eq!(rep.record.timecode, second);
        assert_eq!(rep.run_length, 35);
        assert!(assembly.records.iter().all(|r| r.is_accepted()));
    }

    #[test]
    fn test_drop_frame_boundary_is_continuous() {
        let mut feed = Feed::new(FrameRate::Fps29_97);
        let mut tc = TimecodeValue::new(0, 0, 59, 20).with_drop_frame(true);
        for slot in 0..30 {
            assert_eq!(feed.push(tc, slot, PlaybackDirection::Forward), FrameStatus::Accepted);
            tc = tc.next(30);
        }
        let assembly = feed.assembler.finish();
        assert_eq!(assembly.continuity_violations, 0);
        assert!(assembly
            .records
            .iter()
            .any(|r| r.timecode == TimecodeValue::new(0, 1, 0, 2).with_drop_frame(true)));
    }

    #[test]
    fn test_reverse_run_reports_earliest_timecode() {
        let mut feed = Feed::new(FrameRate::Fps25);
        let last = TimecodeValue::new(1, 0, 9, 24);
        for slot in 0..20 {
            feed.push(last.offset(-(slot as i64), 25), slot, PlaybackDirection::Reverse);
        }
        let assembly = feed.assembler.finish();
        assert_eq!(assembly.direction, PlaybackDirection::Reverse);
        let rep = assembly.representative.unwrap();
        assert_eq!(rep.record.timecode, last.offset(-19, 25));
        // Log is returned in forward order
        assert_eq!(assembly.records[0].timecode, last.offset(-19, 25));
        assert_eq!(assembly.records[19].timecode, last);
    }

    #[test]
    fn test_no_representative_from_single_frame() {
        let mut feed = Feed::new(FrameRate::Fps25);
        feed.push(TimecodeValue::new(1, 0, 0, 0), 0, PlaybackDirection::Forward);
        assert!(feed.assembler.representative().is_none());
        assert!(feed.assembler.finish().representative.is_none());
    }
}
