//! Benchmarks for the per-frame link-control hot paths
//!
//! Run with: cargo bench -p ofdm-link-core --bench link_bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ofdm_link_core::fec::{FecCodeConfig, FecCodebook};
use ofdm_link_core::feedback::{FeedbackDemodulator, FeedbackModemConfig, FeedbackModulator};
use ofdm_link_core::header::{FecHeaderFields, FrameHeader, HeaderCodec};
use ofdm_link_core::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

// ============================================================================
// LDPC
// ============================================================================

fn bench_ldpc(c: &mut Criterion) {
    let mut group = c.benchmark_group("ldpc");
    group.measurement_time(Duration::from_secs(5));

    let book = FecCodebook::from_configs(&[
        FecCodeConfig::builtin(1, "ldpc_n96_r12"),
        FecCodeConfig::builtin(2, "ldpc_n192_r34"),
    ])
    .unwrap();
    let mut rng = StdRng::seed_from_u64(7);

    for id in [1u8, 2] {
        let code = book.get(id).unwrap();
        let info: Vec<u8> = (0..code.k()).map(|_| rng.gen_range(0..2)).collect();
        let codeword = code.encode(&info);
        // Noisy channel: a few flipped LLRs for the decoder to correct
        let llrs: Vec<f64> = codeword
            .iter()
            .enumerate()
            .map(|(i, &b)| {
                let llr = if b == 0 { 2.0 } else { -2.0 };
                if i % 17 == 3 {
                    -0.5 * llr
                } else {
                    llr
                }
            })
            .collect();

        group.throughput(Throughput::Elements(code.n() as u64));
        group.bench_with_input(BenchmarkId::new("encode", code.n()), &info, |b, info| {
            b.iter(|| code.encode(black_box(info)))
        });
        group.bench_with_input(BenchmarkId::new("decode", code.n()), &llrs, |b, llrs| {
            b.iter(|| code.decode(black_box(llrs), 0))
        });
    }

    group.finish();
}

// ============================================================================
// Header
// ============================================================================

fn bench_header(c: &mut Criterion) {
    let mut group = c.benchmark_group("header");

    for fec in [false, true] {
        let codec = HeaderCodec::new(48, fec, true).unwrap();
        let mut header = FrameHeader::new(1234, 96, ModulationScheme::Qpsk, 4);
        if fec {
            header = header.with_fec(FecHeaderFields {
                fec_id: 2,
                codeword_id: 17,
                offset: 40,
                shortening: 12,
                echo: Some(FeedbackMessage::new(3, 2)),
            });
        }
        let symbols = codec.format_symbols(&header).unwrap();
        let label = if fec { "fec" } else { "plain" };

        group.bench_function(BenchmarkId::new("format", label), |b| {
            b.iter(|| codec.format_symbols(black_box(&header)))
        });
        group.bench_function(BenchmarkId::new("parse", label), |b| {
            b.iter(|| codec.parse_symbols(black_box(&symbols)))
        });
    }

    group.finish();
}

// ============================================================================
// Frame building
// ============================================================================

fn bench_frames(c: &mut Criterion) {
    let mut group = c.benchmark_group("frames");
    let link = LinkConfig::default().validate().unwrap();
    let payload = vec![0xA5u8; 4096];

    for scheme in ModulationScheme::ALL {
        let mut buffer = link.frame_buffer().unwrap();
        let selection = McsSelection::uncoded(scheme);
        group.bench_function(BenchmarkId::new("plain_next_frame", scheme), |b| {
            b.iter(|| {
                if buffer.pending_bits() == 0 {
                    buffer.push_bytes(&payload);
                }
                buffer.next_frame(black_box(selection))
            })
        });
    }

    group.finish();
}

// ============================================================================
// Feedback modem
// ============================================================================

fn bench_feedback(c: &mut Criterion) {
    let mut group = c.benchmark_group("feedback");
    let config = FeedbackModemConfig::default();
    let modem = FeedbackModulator::new(&config).unwrap();
    let demod = FeedbackDemodulator::new(&config).unwrap();
    let msg = FeedbackMessage::new(2, 1);
    let burst = modem.modulate(&msg);

    group.throughput(Throughput::Elements(burst.len() as u64));
    group.bench_function("modulate", |b| b.iter(|| modem.modulate(black_box(&msg))));
    group.bench_function("demodulate", |b| b.iter(|| demod.demodulate(black_box(&burst))));

    group.finish();
}

criterion_group!(benches, bench_ldpc, bench_header, bench_frames, bench_feedback);
criterion_main!(benches);
