//! Performance benchmarks for LTC decoding

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ltc_dsp::{decode_ltc, DecoderConfig, FrameRate, LtcGenerator, TimecodeValue};

fn bench_decode_ltc(c: &mut Criterion) {
    // 30 seconds of 25 fps LTC at 48 kHz
    let samples = LtcGenerator::new(48000, FrameRate::Fps25)
        .generate_seconds(TimecodeValue::new(1, 0, 0, 0), 30.0);

    let config = DecoderConfig::default();

    c.bench_function("decode_ltc_30s", |b| {
        b.iter(|| {
            let _ = decode_ltc(black_box(&samples), black_box(48000), black_box(config.clone()));
        });
    });

    let early = DecoderConfig {
        stop_after_frames: Some(25),
        ..Default::default()
    };
    c.bench_function("decode_ltc_first_second", |b| {
        b.iter(|| {
            let _ = decode_ltc(black_box(&samples), black_box(48000), black_box(early.clone()));
        });
    });
}

fn bench_generate(c: &mut Criterion) {
    let generator = LtcGenerator::new(48000, FrameRate::Fps29_97);
    c.bench_function("generate_ltc_10s", |b| {
        b.iter(|| generator.generate_seconds(black_box(TimecodeValue::new(1, 0, 0, 0)), 10.0));
    });
}

criterion_group!(benches, bench_decode_ltc, bench_generate);
criterion_main!(benches);
