//! Example: Decode LTC from many files in parallel
//!
//! Usage:
//!   cargo run --release --example decode_batch -- [--jobs N] [--channel N] [--json] <file1> <file2> ...
//!
//! Notes:
//! - Parallelism is across files. Each file gets its own `DecodeSession`, so nothing is
//!   shared between workers.
//! - Default workers: (available CPU threads - 1), keeping one core free for the system.

use ltc_dsp::{compute_confidence, decode_ltc, DecoderConfig};
use rayon::prelude::*;
use std::env;
use std::fs::File;
use std::time::Instant;
use symphonia::core::audio::{AudioBuffer, Signal};
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::get_probe;

fn decode_channel(path: &str, channel: usize) -> Result<(Vec<f32>, u32), Box<dyn std::error::Error + Send + Sync>> {
    let src = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(src), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = std::path::Path::new(path).extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = get_probe().format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())?;
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

    let mut samples = Vec::new();
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
                samples.extend_from_slice(buf.chan(channel.min(channels - 1)));
            }
            Err(symphonia::core::errors::Error::DecodeError(_)) => continue,
            Err(e) => return Err(Box::new(e)),
        }
    }

    Ok((samples, sample_rate))
}

fn default_jobs() -> usize {
    let n = std::thread::available_parallelism().map(|v| v.get()).unwrap_or(1);
    std::cmp::max(1, n.saturating_sub(1))
}

struct ItemOut {
    path: String,
    timecode: Option<String>,
    rate: String,
    confidence: f32,
    processing_ms: f32,
    flags: Vec<String>,
    error: Option<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut args: Vec<String> = env::args().skip(1).collect();
    let mut json = false;
    let mut jobs: Option<usize> = None;
    let mut channel = 1usize;
    let mut paths: Vec<String> = Vec::new();

    while let Some(a) = args.first().cloned() {
        args.remove(0);
        match a.as_str() {
            "--json" => json = true,
            "--jobs" => {
                let v = args.first().ok_or("--jobs requires a value")?.parse::<usize>()?;
                args.remove(0);
                jobs = Some(std::cmp::max(1, v));
            }
            "--channel" => {
                channel = args.first().ok_or("--channel requires a value")?.parse()?;
                args.remove(0);
            }
            "--help" | "-h" => {
                eprintln!(
                    "Usage: decode_batch [--jobs N] [--channel N] [--json] <file1> <file2> ...\n\
                     \n\
                     --jobs N     Parallel workers (default: CPU-1)\n\
                     --channel N  Channel carrying LTC, 0-based (default: 1)\n\
                     --json       Emit one JSON object per line (JSONL)\n"
                );
                return Ok(());
            }
            _ => paths.push(a),
        }
    }

    if paths.is_empty() {
        eprintln!("ERROR: Provide at least one media file path. Use --help for usage.");
        std::process::exit(2);
    }

    let jobs = jobs.unwrap_or_else(default_jobs);
    eprintln!("Batch: {} files, jobs={}", paths.len(), jobs);

    // One validated second is plenty to name the start timecode
    let config = DecoderConfig {
        stop_after_frames: Some(25),
        ..Default::default()
    };

    let t0 = Instant::now();
    let pool = rayon::ThreadPoolBuilder::new().num_threads(jobs).build()?;

    let outs: Vec<ItemOut> = pool.install(|| {
        paths
            .par_iter()
            .map(|path| {
                let failed = |error: String| ItemOut {
                    path: path.clone(),
                    timecode: None,
                    rate: String::new(),
                    confidence: 0.0,
                    processing_ms: 0.0,
                    flags: vec![],
                    error: Some(error),
                };
                let (samples, sr) = match decode_channel(path, channel) {
                    Ok(decoded) => decoded,
                    Err(e) => return failed(format!("media decode failed: {e}")),
                };
                match decode_ltc(&samples, sr, config.clone()) {
                    Ok(res) => ItemOut {
                        path: path.clone(),
                        timecode: Some(res.timecode_string()),
                        rate: res.frame_rate.rate.to_string(),
                        confidence: compute_confidence(&res).overall_confidence,
                        processing_ms: res.metadata.processing_time_ms,
                        flags: res.metadata.flags.iter().map(|f| format!("{:?}", f)).collect(),
                        error: None,
                    },
                    Err(e) => failed(e.to_string()),
                }
            })
            .collect()
    });

    for (idx, o) in outs.iter().enumerate() {
        match (&o.timecode, json) {
            (Some(tc), true) => println!(
                "{}",
                serde_json::json!({
                    "file": o.path,
                    "timecode": tc,
                    "rate": o.rate,
                    "confidence": o.confidence,
                    "flags": o.flags,
                    "processing_time_ms": o.processing_ms,
                })
            ),
            (Some(tc), false) => println!(
                "[{}/{}] {}: {} @ {} (conf={:.3}) time={:.2}ms {}",
                idx + 1,
                outs.len(),
                o.path,
                tc,
                o.rate,
                o.confidence,
                o.processing_ms,
                o.flags.join(",")
            ),
            (None, true) => println!(
                "{}",
                serde_json::json!({
                    "file": o.path,
                    "error": o.error.as_deref().unwrap_or("unknown error"),
                })
            ),
            (None, false) => println!(
                "[{}/{}] {}: ERROR: {}",
                idx + 1,
                outs.len(),
                o.path,
                o.error.as_deref().unwrap_or("unknown error")
            ),
        }
    }

    let ok = outs.iter().filter(|o| o.timecode.is_some()).count();
    eprintln!(
        "Done: ok={}/{} wall={:.0}ms",
        ok,
        outs.len(),
        t0.elapsed().as_secs_f64() * 1000.0
    );

    Ok(())
}
