//! Benchmarks for MQTT protocol encoding/decoding.
//!
//! Run with: cargo bench -p mqttlite

use bytes::{Bytes, BytesMut};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use mqttlite::protocol::{read_remaining_length, write_remaining_length};
use mqttlite::{Message, Publish};

fn bench_remaining_length(c: &mut Criterion) {
    let mut group = c.benchmark_group("remaining_length");

    for (name, value) in [
        ("1 byte", 127usize),
        ("2 bytes", 16_383),
        ("3 bytes", 2_097_151),
        ("4 bytes", 268_435_455),
    ] {
        group.bench_function(format!("encode {}", name), |b| {
            let mut buf = BytesMut::with_capacity(4);
            b.iter(|| {
                buf.clear();
                write_remaining_length(&mut buf, black_box(value)).unwrap()
            })
        });

        let mut encoded = BytesMut::new();
        write_remaining_length(&mut encoded, value).unwrap();
        group.bench_function(format!("decode {}", name), |b| {
            b.iter(|| read_remaining_length(black_box(&encoded)).unwrap())
        });
    }

    group.finish();
}

fn bench_publish_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("publish_decode");

    for size in [64usize, 1024, 16 * 1024] {
        let encoded = Message::Publish(Publish::new("tele/bme280/SENSOR", vec![b'x'; size]))
            .encode()
            .unwrap();
        let (_, consumed) = read_remaining_length(&encoded[1..]).unwrap().unwrap();
        let body: Bytes = encoded.slice(1 + consumed..);

        group.throughput(Throughput::Bytes(body.len() as u64));
        group.bench_function(format!("{} bytes", size), |b| {
            b.iter(|| Message::decode(0x30, black_box(body.clone())).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_remaining_length, bench_publish_decode);
criterion_main!(benches);
