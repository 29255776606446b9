//! Codec benchmarks for chanrelay-protocol.

use chanrelay_protocol::{codec, Event};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

fn bench_decode_message(c: &mut Criterion) {
    let frame = r#"{"type":"message","channel":"C024BE91L","user":"U2147483697","text":"deploy finished on prod-3, all checks green","ts":"1355517523.000005"}"#;

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(frame.len() as u64));
    group.bench_function("message", |b| b.iter(|| codec::decode(black_box(frame))));
    group.finish();
}

fn bench_encode_outbound(c: &mut Criterion) {
    let mut event = Event::message("C024BE91L", "deploy finished on prod-3, all checks green");
    event.id = Some(42);
    event.ts = Some(codec::timestamp_now());

    c.bench_function("encode_outbound", |b| {
        b.iter(|| codec::encode(black_box(&event)))
    });
}

criterion_group!(benches, bench_decode_message, bench_encode_outbound);
criterion_main!(benches);
