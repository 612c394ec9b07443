//! Example: Decode LTC from a single media file
//!
//! Usage:
//!   cargo run --release --example decode_file -- [--channel N] [--stop-after N] [--json] [--ltcdump] <file>
//!
//! Notes:
//! - Channel numbers are 0-based; the default is channel 1 (the second channel), the usual
//!   place for timecode on camera and recorder audio. Mono files use channel 0.
//! - Samples are streamed into a `DecodeSession` packet by packet, so `--stop-after`
//!   stops reading the file as soon as enough consecutive frames have validated.
//! - `--ltcdump` tries the external `ltcdump` tool first and falls back to the engine.

use ltc_dsp::io::{decode_with_fallback, DecodePath, LtcDump};
use ltc_dsp::{compute_confidence, DecodeResult, DecodeSession, DecoderConfig};
use std::env;
use std::fs::File;
use symphonia::core::audio::{AudioBuffer, Signal};
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::get_probe;

struct Options {
    path: String,
    channel: usize,
    stop_after: Option<usize>,
    json: bool,
    ltcdump: bool,
}

fn parse_args() -> Result<Option<Options>, Box<dyn std::error::Error>> {
    let mut args: Vec<String> = env::args().skip(1).collect();
    let mut options = Options {
        path: String::new(),
        channel: 1,
        stop_after: None,
        json: false,
        ltcdump: false,
    };

    while let Some(a) = args.first().cloned() {
        args.remove(0);
        match a.as_str() {
            "--json" => options.json = true,
            "--ltcdump" => options.ltcdump = true,
            "--channel" => {
                options.channel = args.first().ok_or("--channel requires a value")?.parse()?;
                args.remove(0);
            }
            "--stop-after" => {
                options.stop_after = Some(args.first().ok_or("--stop-after requires a value")?.parse()?);
                args.remove(0);
            }
            "--help" | "-h" => {
                eprintln!(
                    "Usage: decode_file [--channel N] [--stop-after N] [--json] [--ltcdump] <file>\n\
                     \n\
                     --channel N     Channel carrying LTC, 0-based (default: 1)\n\
                     --stop-after N  Stop after N consecutive validated frames\n\
                     --json          Print the full decode result as JSON\n\
                     --ltcdump       Prefer the external ltcdump decoder\n"
                );
                return Ok(None);
            }
            _ => options.path = a,
        }
    }

    if options.path.is_empty() {
        return Err("Provide a media file path. Use --help for usage.".into());
    }
    Ok(Some(options))
}

/// Stream one channel of a media file through `sink`; stops early when `sink` returns false
fn stream_channel(
    path: &str,
    channel: usize,
    mut sink: impl FnMut(&[f32], u32) -> bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let src = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(src), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = std::path::Path::new(path).extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let meta_opts: MetadataOptions = Default::default();
    let fmt_opts: FormatOptions = Default::default();

    let probed = get_probe().format(&hint, mss, &fmt_opts, &meta_opts)?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .ok_or("No supported audio tracks found")?;

    let track_id = track.id;
    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;
    let sample_rate = track.codec_params.sample_rate.ok_or("Unknown sample rate")?;

    let mut buffer: Option<AudioBuffer<f32>> = None;
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(_) => break,
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let channels = decoded.spec().channels.count();
                let buf = buffer.get_or_insert_with(|| decoded.make_equivalent::<f32>());
                if buf.capacity() < decoded.capacity() {
                    *buf = decoded.make_equivalent::<f32>();
                }
                decoded.convert(buf);
                if !sink(buf.chan(channel.min(channels - 1)), sample_rate) {
                    break;
                }
            }
            Err(symphonia::core::errors::Error::DecodeError(_)) => {
                // Skip decode errors (can happen with corrupted packets).
                continue;
            }
            Err(e) => return Err(Box::new(e)),
        }
    }

    Ok(())
}

fn print_result(result: &DecodeResult) {
    let confidence = compute_confidence(result);
    println!("Timecode: {}", result.timecode);
    println!(
        "  Rate: {} (measured {:.3} fps, {})",
        result.frame_rate.rate,
        result.frame_rate.measured_fps,
        if result.frame_rate.ambiguous { "ambiguous" } else { "confident" }
    );
    println!("  Direction: {:?}", result.direction);
    println!(
        "  Frames: {} synced, {} accepted, best run {}",
        result.metadata.frames_synced, result.metadata.frames_accepted, result.run_length
    );
    println!("  Gaps: {}, sync losses: {}", result.gaps.len(), result.sync_losses.len());
    println!(
        "  Confidence: {:.2} ({})",
        confidence.overall_confidence,
        confidence.confidence_level()
    );
    println!("  Processing time: {:.2} ms", result.metadata.processing_time_ms);
    for warning in &result.metadata.warnings {
        println!("  Warning: {}", warning);
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let Some(options) = parse_args()? else {
        return Ok(());
    };
    let config = DecoderConfig {
        stop_after_frames: options.stop_after,
        ..Default::default()
    };

    if options.ltcdump {
        // The external tool reads a file, so the channel is extracted to a mono WAV first
        let mut samples = Vec::new();
        let mut rate = 0;
        stream_channel(&options.path, options.channel, |chunk, sr| {
            samples.extend_from_slice(chunk);
            rate = sr;
            true
        })?;

        let dir = tempfile::tempdir()?;
        let wav = dir.path().join("ltc.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(&wav, spec)?;
        for &s in &samples {
            writer.write_sample(s)?;
        }
        writer.finalize()?;

        let dump = LtcDump::new();
        let external = dump.is_available().then_some(&dump as &dyn ltc_dsp::io::ExternalDecoder);
        let output = decode_with_fallback(external, Some(wav.as_path()), &samples, rate, config)?;

        match (&output.path, &output.details) {
            (_, Some(result)) if options.json => println!("{}", serde_json::to_string_pretty(result)?),
            (_, Some(result)) => print_result(result),
            (DecodePath::External { tool }, None) => println!("Timecode: {} (via {})", output.timecode, tool),
            (DecodePath::Engine, None) => println!("Timecode: {}", output.timecode),
        }
        return Ok(());
    }

    let mut session: Option<DecodeSession> = None;
    let mut setup_error = None;
    stream_channel(&options.path, options.channel, |chunk, sr| {
        if session.is_none() {
            match DecodeSession::new(sr, config.clone()) {
                Ok(s) => session = Some(s),
                Err(e) => {
                    setup_error = Some(e);
                    return false;
                }
            }
        }
        match session.as_mut() {
            Some(s) => {
                s.push_samples(chunk);
                !s.is_finished()
            }
            None => false,
        }
    })?;

    if let Some(e) = setup_error {
        return Err(Box::new(e));
    }
    let session = session.ok_or("No audio decoded")?;
    let result = session.finish()?;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }

    Ok(())
}
