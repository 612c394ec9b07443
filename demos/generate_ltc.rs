//! Example: Write a synthetic LTC WAV file
//!
//! Usage:
//!   cargo run --example generate_ltc -- [--start HH:MM:SS:FF] [--rate FPS] [--seconds S]
//!       [--sample-rate HZ] [--speed X] [--reverse] [--stereo] <out.wav>
//!
//! With `--stereo` the LTC goes on the second channel and the first stays silent, the
//! layout `decode_file` expects by default.

use ltc_dsp::{FrameRate, LtcGenerator, TimecodeValue};
use std::env;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut args: Vec<String> = env::args().skip(1).collect();
    let mut start: TimecodeValue = "01:00:00:00".parse()?;
    let mut rate = FrameRate::Fps25;
    let mut seconds = 10.0f64;
    let mut sample_rate = 48000u32;
    let mut speed = 1.0f64;
    let mut reverse = false;
    let mut stereo = false;
    let mut out: Option<String> = None;

    while let Some(a) = args.first().cloned() {
        args.remove(0);
        let mut value = || -> Result<String, Box<dyn std::error::Error>> {
            if args.is_empty() {
                return Err(format!("{} requires a value", a).into());
            }
            Ok(args.remove(0))
        };
        match a.as_str() {
            "--start" => start = value()?.parse()?,
            "--rate" => {
                let fps: f64 = value()?.parse()?;
                rate = FrameRate::from_fps(fps).ok_or(format!("unsupported frame rate {}", fps))?;
            }
            "--seconds" => seconds = value()?.parse()?,
            "--sample-rate" => sample_rate = value()?.parse()?,
            "--speed" => speed = value()?.parse()?,
            "--reverse" => reverse = true,
            "--stereo" => stereo = true,
            "--help" | "-h" => {
                eprintln!(
                    "Usage: generate_ltc [options] <out.wav>\n\
                     \n\
                     --start TC        First timecode (default: 01:00:00:00)\n\
                     --rate FPS        23.976, 24, 25, 29.97 or 30 (default: 25)\n\
                     --seconds S       Duration (default: 10)\n\
                     --sample-rate HZ  Output sample rate (default: 48000)\n\
                     --speed X         Playback speed factor (default: 1.0)\n\
                     --reverse         Render as reversed playback\n\
                     --stereo          LTC on channel 2, silence on channel 1\n"
                );
                return Ok(());
            }
            _ => out = Some(a),
        }
    }

    let out = out.ok_or("Provide an output path. Use --help for usage.")?;
    let samples = LtcGenerator::new(sample_rate, rate)
        .with_speed(speed)
        .reversed(reverse)
        .generate_seconds(start, seconds);

    let spec = hound::WavSpec {
        channels: if stereo { 2 } else { 1 },
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&out, spec)?;
    for &s in &samples {
        if stereo {
            writer.write_sample(0i16)?;
        }
        writer.write_sample((s * i16::MAX as f32) as i16)?;
    }
    writer.finalize()?;

    eprintln!(
        "Wrote {} ({} samples, {} from {}{})",
        out,
        samples.len(),
        rate,
        start.with_drop_frame(rate == FrameRate::Fps29_97),
        if reverse { ", reversed" } else { "" }
    );
    Ok(())
}
