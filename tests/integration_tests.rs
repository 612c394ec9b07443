//! Integration tests for the LTC decoding engine

use ltc_dsp::analysis::result::{BcdDigit, FrameIssue, GapKind};
use ltc_dsp::features::frame::PlaybackDirection;
use ltc_dsp::{
    compute_confidence, decode_ltc, DecodeError, DecodeFlag, DecodeResult, DecodeSession,
    DecoderConfig, FrameRate, FrameStatus, LtcGenerator, TimecodeValue,
};
use std::path::Path;

/// Load a WAV file and return (channel samples, sample_rate)
fn load_wav_channel(path: &Path, channel: usize) -> Result<(Vec<f32>, u32), Box<dyn std::error::Error>> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<Vec<_>, _>>()?,
        hound::SampleFormat::Int => {
            let max_value = (1 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|s| s as f32 / max_value))
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    let channels = spec.channels as usize;
    let channel = channel.min(channels - 1);
    let mono = samples.chunks(channels).map(|frame| frame[channel]).collect();
    Ok((mono, spec.sample_rate))
}

/// Deterministic uniform noise in [-amplitude, amplitude]
fn noise(len: usize, amplitude: f32, seed: u64) -> Vec<f32> {
    let mut state = seed.max(1);
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            let unit = (state >> 11) as f32 / (1u64 << 53) as f32;
            (unit * 2.0 - 1.0) * amplitude
        })
        .collect()
}

fn start_for(rate: FrameRate) -> TimecodeValue {
    TimecodeValue::new(10, 20, 30, 0).with_drop_frame(rate == FrameRate::Fps29_97)
}

/// Assert the accepted frames form one unbroken forward sequence
fn assert_consecutive(result: &DecodeResult, nominal_fps: u8) {
    let accepted: Vec<TimecodeValue> = result.accepted_frames().map(|f| f.timecode).collect();
    for pair in accepted.windows(2) {
        assert_eq!(pair[1], pair[0].next(nominal_fps), "sequence breaks after {}", pair[0]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_all_standard_rates() {
        for rate in FrameRate::ALL {
            let start = start_for(rate);
            let frames = 75;
            let samples = LtcGenerator::new(48000, rate).generate(start, frames);

            let result = decode_ltc(&samples, 48000, DecoderConfig::default())
                .unwrap_or_else(|e| panic!("{} failed: {}", rate, e));

            assert_eq!(result.timecode, start, "{}", rate);
            assert_eq!(result.frame_rate.rate, rate);
            assert_eq!(result.frame_rate.drop_frame, rate == FrameRate::Fps29_97);
            assert_eq!(result.frames.len(), frames, "{}", rate);
            assert!(result.frames.iter().all(|f| f.is_accepted()), "{}", rate);
            assert_eq!(result.run_length, frames);
            assert_consecutive(&result, rate.nominal_fps());
            assert!(result.sync_losses.is_empty());
            assert!(!result.has_flag(DecodeFlag::RateAmbiguous), "{}", rate);
        }
    }

    #[test]
    fn test_rate_estimate_is_sample_rate_invariant() {
        for rate in [FrameRate::Fps23_976, FrameRate::Fps25, FrameRate::Fps29_97] {
            let start = start_for(rate);
            for sample_rate in [44100u32, 48000, 96000] {
                let samples = LtcGenerator::new(sample_rate, rate).generate(start, 50);
                let result = decode_ltc(&samples, sample_rate, DecoderConfig::default())
                    .unwrap_or_else(|e| panic!("{} at {} Hz failed: {}", rate, sample_rate, e));

                assert_eq!(result.frame_rate.rate, rate, "{} Hz", sample_rate);
                assert_eq!(result.timecode, start, "{} Hz", sample_rate);
                assert!(
                    (result.frame_rate.measured_fps - rate.fps()).abs() < 0.01,
                    "{} at {} Hz measured {:.4}",
                    rate,
                    sample_rate,
                    result.frame_rate.measured_fps
                );
            }
        }
    }

    #[test]
    fn test_single_corrupted_bit_is_contained() {
        let start = TimecodeValue::new(1, 0, 0, 0);
        // Frame 40 is 01:00:01:15; forcing frame-units bit 3 turns the 5 into 13
        let samples = LtcGenerator::new(48000, FrameRate::Fps25)
            .with_bit_override(40, 3, true)
            .generate(start, 100);

        let result = decode_ltc(&samples, 48000, DecoderConfig::default()).unwrap();

        assert_eq!(result.frames.len(), 100);
        let bad = &result.frames[40];
        assert_eq!(bad.status, FrameStatus::Invalid);
        assert!(!bad.valid);
        assert!(bad.issues.contains(&FrameIssue::InvalidBcd {
            digit: BcdDigit::FrameUnits,
            value: 13
        }));

        assert!(result.frames[39].is_accepted());
        assert!(result.frames[41].is_accepted());
        assert_eq!(result.frames[39].timecode, TimecodeValue::new(1, 0, 1, 14));
        assert_eq!(result.frames[41].timecode, TimecodeValue::new(1, 0, 1, 16));
        assert_eq!(result.accepted_frames().count(), 99);

        assert!(result.sync_losses.is_empty());
        assert_eq!(result.gaps.len(), 1);
        assert_eq!(result.gaps[0].kind, GapKind::MissingFrames);
        assert_eq!(result.gaps[0].missing_frames, 1);
        assert_eq!(result.metadata.frames_invalid, 1);
        assert!(result.has_flag(DecodeFlag::PartialDecode));
        // Longest run is the 59 frames after the corruption
        assert_eq!(result.run_length, 59);
        assert_eq!(result.timecode, TimecodeValue::new(1, 0, 1, 16));
    }

    #[test]
    fn test_silence_is_insufficient_signal() {
        let samples = vec![0.0f32; 48000 * 2];
        let err = decode_ltc(&samples, 48000, DecoderConfig::default()).unwrap_err();
        assert!(matches!(err, DecodeError::InsufficientSignal(_)), "got {:?}", err);
    }

    #[test]
    fn test_white_noise_never_yields_timecode() {
        for seed in [1u64, 7, 42, 1234] {
            let samples = noise(48000 * 3, 0.5, seed);
            match decode_ltc(&samples, 48000, DecoderConfig::default()) {
                Err(DecodeError::SyncNotFound(_)) | Err(DecodeError::InsufficientSignal(_)) => {}
                Ok(result) => panic!("noise decoded as {}", result.timecode),
                Err(e) => panic!("unexpected error {:?}", e),
            }
        }
    }

    #[test]
    fn test_reversed_playback_is_detected() {
        let start = TimecodeValue::new(1, 0, 0, 0);
        let samples = LtcGenerator::new(48000, FrameRate::Fps25)
            .reversed(true)
            .generate(start, 100);

        let result = decode_ltc(&samples, 48000, DecoderConfig::default()).unwrap();

        assert_eq!(result.direction, PlaybackDirection::Reverse);
        assert!(result.has_flag(DecodeFlag::ReversedPlayback));
        assert_eq!(result.frame_rate.rate, FrameRate::Fps25);
        // The log comes back in forward order
        assert_consecutive(&result, 25);
        assert_eq!(result.frames.len(), 100);
        assert_eq!(result.timecode, start);
        assert_eq!(result.run_length, 100);
        assert_eq!(result.frames[0].timecode, start);
        assert_eq!(result.frames.last().unwrap().timecode, start.offset(99, 25));
    }

    #[test]
    fn test_reversed_playback_keeps_every_frame() {
        for rate in FrameRate::ALL {
            let start = start_for(rate);
            let generator = LtcGenerator::new(48000, rate);
            let forward = decode_ltc(&generator.generate(start, 60), 48000, DecoderConfig::default())
                .unwrap_or_else(|e| panic!("{} forward failed: {}", rate, e));
            let reverse = decode_ltc(
                &generator.clone().reversed(true).generate(start, 60),
                48000,
                DecoderConfig::default(),
            )
            .unwrap_or_else(|e| panic!("{} reversed failed: {}", rate, e));

            assert_eq!(reverse.direction, PlaybackDirection::Reverse, "{}", rate);
            assert_eq!(reverse.timecode, start, "{}", rate);
            assert_eq!(reverse.timecode, forward.timecode, "{}", rate);
            assert_eq!(reverse.frames.len(), 60, "{}", rate);
            assert_eq!(reverse.frames.len(), forward.frames.len(), "{}", rate);
            assert_eq!(reverse.run_length, 60, "{}", rate);
            assert_consecutive(&reverse, rate.nominal_fps());
        }
    }

    #[test]
    fn test_ten_seconds_at_25_fps() {
        let start = TimecodeValue::new(1, 0, 0, 0);
        let samples = LtcGenerator::new(48000, FrameRate::Fps25).generate_seconds(start, 10.0);
        assert_eq!(samples.len(), 480000);

        let result = decode_ltc(&samples, 48000, DecoderConfig::default()).unwrap();

        assert_eq!(result.timecode_string(), "01:00:00:00");
        assert_eq!(result.frames.len(), 250);
        assert_eq!(result.frames[0].timecode.to_string(), "01:00:00:00");
        assert_eq!(result.frames[249].timecode.to_string(), "01:00:09:24");
        assert!(result.sync_losses.is_empty());
        assert!(result.gaps.is_empty());
        assert_consecutive(&result, 25);
        assert!(result.metadata.flags.is_empty(), "flags: {:?}", result.metadata.flags);
    }

    #[test]
    fn test_drop_frame_minute_boundary() {
        let start: TimecodeValue = "01:00:55;00".parse().unwrap();
        let samples = LtcGenerator::new(48000, FrameRate::Fps29_97).generate_seconds(start, 10.0);

        let result = decode_ltc(&samples, 48000, DecoderConfig::default()).unwrap();

        assert_eq!(result.timecode_string(), "01:00:55;00");
        assert_eq!(result.frame_rate.rate, FrameRate::Fps29_97);
        assert_eq!(result.metadata.continuity_violations, 0);
        assert!(result.gaps.is_empty());

        let labels: Vec<String> = result.frames.iter().map(|f| f.timecode.to_string()).collect();
        assert!(!labels.contains(&"01:01:00;00".to_string()));
        assert!(!labels.contains(&"01:01:00;01".to_string()));
        let after_59 = labels.iter().position(|l| l == "01:00:59;29").unwrap();
        assert_eq!(labels[after_59 + 1], "01:01:00;02");
    }

    #[test]
    fn test_varispeed_and_level_changes() {
        let start = TimecodeValue::new(5, 6, 7, 8);
        let samples: Vec<f32> = LtcGenerator::new(48000, FrameRate::Fps25)
            .with_speed(1.02)
            .with_amplitude(0.05)
            .generate(start, 100)
            .into_iter()
            .zip(noise(200_000, 0.002, 9))
            .map(|(s, n)| s + n + 0.2)
            .collect();

        let result = decode_ltc(&samples, 48000, DecoderConfig::default()).unwrap();

        // The DC remover needs a few milliseconds before the first edges come through
        let skipped = result.timecode.to_frame_number(25) - start.to_frame_number(25);
        assert!(skipped <= 2, "representative {} is {} frames late", result.timecode, skipped);
        assert_eq!(result.frame_rate.rate, FrameRate::Fps25);
        assert!((result.frame_rate.measured_fps - 25.5).abs() < 0.05);
        assert!(result.accepted_frames().count() >= 97);
        assert_consecutive(&result, 25);
    }

    #[test]
    fn test_streaming_matches_batch() {
        let start = TimecodeValue::new(23, 59, 58, 0);
        let samples = LtcGenerator::new(44100, FrameRate::Fps24).generate(start, 96);
        let batch = decode_ltc(&samples, 44100, DecoderConfig::default()).unwrap();

        let mut session = DecodeSession::new(44100, DecoderConfig::default()).unwrap();
        for chunk in samples.chunks(777) {
            session.push_samples(chunk);
        }
        let streamed = session.finish().unwrap();

        assert_eq!(streamed.timecode, batch.timecode);
        assert_eq!(streamed.frames.len(), batch.frames.len());
        // Wraps past midnight
        assert!(streamed
            .accepted_frames()
            .any(|f| f.timecode == TimecodeValue::new(0, 0, 0, 0)));
    }

    #[test]
    fn test_early_termination() {
        let start = TimecodeValue::new(2, 0, 0, 0);
        let samples = LtcGenerator::new(48000, FrameRate::Fps30).generate(start, 300);
        let config = DecoderConfig {
            stop_after_frames: Some(10),
            ..Default::default()
        };

        let result = decode_ltc(&samples, 48000, config).unwrap();

        assert!(result.metadata.stopped_early);
        assert_eq!(result.timecode, start);
        assert!((10..15).contains(&result.run_length), "run of {}", result.run_length);
        assert!(result.metadata.duration_seconds < 1.0);
    }

    #[test]
    fn test_bounded_search_window() {
        // Three seconds of a steady 1 kHz tone: clean edges but never a sync word
        let mut samples: Vec<f32> = (0..48000 * 3)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * 1000.0 * i as f32 / 48000.0).sin())
            .collect();
        samples.extend(LtcGenerator::new(48000, FrameRate::Fps25).generate(TimecodeValue::new(3, 0, 0, 0), 50));

        let bounded = DecoderConfig {
            max_search_seconds: Some(1.0),
            ..Default::default()
        };
        let err = decode_ltc(&samples, 48000, bounded).unwrap_err();
        assert!(matches!(err, DecodeError::SyncNotFound(_)), "got {:?}", err);

        let unbounded = decode_ltc(&samples, 48000, DecoderConfig::default()).unwrap();
        let found = unbounded.timecode;
        assert!(
            found == TimecodeValue::new(3, 0, 0, 0) || found == TimecodeValue::new(3, 0, 0, 1),
            "got {}",
            found
        );
    }

    #[test]
    fn test_sessions_are_independent() {
        let a = LtcGenerator::new(48000, FrameRate::Fps25).generate(TimecodeValue::new(1, 0, 0, 0), 50);
        let b = LtcGenerator::new(48000, FrameRate::Fps30).generate(TimecodeValue::new(2, 0, 0, 0), 60);

        let mut first = DecodeSession::new(48000, DecoderConfig::default()).unwrap();
        let mut second = DecodeSession::new(48000, DecoderConfig::default()).unwrap();
        for (ca, cb) in a.chunks(1000).zip(b.chunks(1000)) {
            first.push_samples(ca);
            second.push_samples(cb);
        }
        // `b` is longer than `a`
        second.push_samples(&b[a.len()..]);

        let first = first.finish().unwrap();
        let second = second.finish().unwrap();
        assert_eq!(first.timecode_string(), "01:00:00:00");
        assert_eq!(first.frame_rate.rate, FrameRate::Fps25);
        assert_eq!(second.timecode_string(), "02:00:00:00");
        assert_eq!(second.frame_rate.rate, FrameRate::Fps30);
    }

    #[test]
    fn test_user_bits_survive() {
        let samples = LtcGenerator::new(48000, FrameRate::Fps25)
            .with_user_bits([0xA, 0xB, 0xC, 0xD, 1, 2, 3, 4])
            .generate(TimecodeValue::new(0, 0, 10, 0), 25);
        let result = decode_ltc(&samples, 48000, DecoderConfig::default()).unwrap();
        assert!(result
            .accepted_frames()
            .all(|f| f.user_bits == [0xA, 0xB, 0xC, 0xD, 1, 2, 3, 4]));
    }

    #[test]
    fn test_invalid_input() {
        assert!(matches!(
            decode_ltc(&[], 48000, DecoderConfig::default()),
            Err(DecodeError::InvalidInput(_))
        ));
        assert!(matches!(
            decode_ltc(&[0.1, -0.1], 0, DecoderConfig::default()),
            Err(DecodeError::InvalidInput(_))
        ));
        let config = DecoderConfig {
            hysteresis_fraction: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            decode_ltc(&[0.1, -0.1], 48000, config),
            Err(DecodeError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_wav_round_trip_second_channel() {
        let start = TimecodeValue::new(12, 34, 56, 0);
        let ltc = LtcGenerator::new(48000, FrameRate::Fps25)
            .with_amplitude(0.7)
            .generate(start, 50);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ltc.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 48000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for &s in &ltc {
            writer.write_sample(0i16).unwrap();
            writer.write_sample((s * i16::MAX as f32) as i16).unwrap();
        }
        writer.finalize().unwrap();

        let (samples, sample_rate) = load_wav_channel(&path, 1).unwrap();
        let result = decode_ltc(&samples, sample_rate, DecoderConfig::default()).unwrap();
        assert_eq!(result.timecode, start);

        // The first channel holds nothing
        let (silent, _) = load_wav_channel(&path, 0).unwrap();
        assert!(decode_ltc(&silent, sample_rate, DecoderConfig::default()).is_err());
    }

    #[test]
    fn test_result_serializes_to_json() {
        let samples = LtcGenerator::new(48000, FrameRate::Fps29_97).generate("00:09:59;20".parse().unwrap(), 30);
        let result = decode_ltc(&samples, 48000, DecoderConfig::default()).unwrap();

        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"timecode\""));
        assert!(json.contains("Fps29_97"));

        let back: DecodeResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.timecode, result.timecode);
        assert_eq!(back.frames.len(), result.frames.len());
    }

    #[test]
    fn test_clean_decode_is_high_confidence() {
        let samples = LtcGenerator::new(48000, FrameRate::Fps24).generate(TimecodeValue::new(1, 1, 1, 1), 48);
        let result = decode_ltc(&samples, 48000, DecoderConfig::default()).unwrap();
        let confidence = compute_confidence(&result);
        assert!(confidence.is_high_confidence(), "{:?}", confidence);
        assert_eq!(confidence.confidence_level(), "High");
    }
}
