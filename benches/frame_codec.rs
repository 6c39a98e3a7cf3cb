//! Frame codec benchmark suite.
//!
//! Benchmarks packet encoding and the byte-at-a-time decoder at payload
//! sizes spanning control replies to relayed output chunks.
//!
//! Run with: cargo bench --bench frame_codec
//! Results saved to: target/criterion/

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use device_bridge::protocol::frame::{FrameParser, FrameProgress, decode, encode};

// ============================================================================
// Benchmark Parameters
// ============================================================================

const PAYLOAD_SIZES: &[usize] = &[8, 64, 512, 4096];

fn payload(size: usize) -> Vec<u8> {
    // Printable bytes, no frame markers: the shape real payloads have.
    (0..size).map(|i| b'a' + (i % 26) as u8).collect()
}

// ============================================================================
// Benchmark: Encode
// ============================================================================

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    for &size in PAYLOAD_SIZES {
        let data = payload(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &data, |b, data| {
            b.iter(|| encode(data));
        });
    }
    group.finish();
}

// ============================================================================
// Benchmark: Decode
// ============================================================================

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    for &size in PAYLOAD_SIZES {
        let frame = encode(&payload(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &frame, |b, frame| {
            b.iter(|| decode(frame).expect("well-formed"));
        });
    }
    group.finish();
}

// ============================================================================
// Benchmark: Parser with garbage prefix
// ============================================================================

fn bench_decode_with_garbage_prefix(c: &mut Criterion) {
    let mut bytes = vec![b'+'; 8];
    bytes.extend_from_slice(&encode(&payload(64)));

    c.bench_function("decode_with_garbage_prefix", |b| {
        b.iter(|| {
            let mut parser = FrameParser::new();
            for byte in &bytes {
                if let FrameProgress::Complete(p) = parser.feed(*byte) {
                    return p;
                }
            }
            unreachable!("frame always completes");
        });
    });
}

criterion_group!(
    benches,
    bench_encode,
    bench_decode,
    bench_decode_with_garbage_prefix
);
criterion_main!(benches);
