//! Protocol encoding/decoding benchmarks.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use futures::executor::block_on;
use futures::TryStreamExt;
use respipe_protocol::{
    command, utf8_len, Argument, BytesBlob, Command, CommandEncoderQueue, Composed, Decoder,
    FrameComposer,
};

fn ping_batch(count: usize) -> Vec<Command> {
    (0..count).map(|i| command!("PING", i)).collect()
}

fn drain(frame: Composed) -> usize {
    match frame {
        Composed::Buffer(b) => b.len(),
        Composed::Stream(s) => block_on(s.try_fold(0, |n, chunk| async move {
            Ok::<_, std::io::Error>(n + chunk.len())
        }))
        .unwrap(),
    }
}

fn bench_utf8_len(c: &mut Criterion) {
    let mut group = c.benchmark_group("utf8_len");

    for (name, text) in [
        ("ascii", "x".repeat(1000)),
        ("mixed", "aé€😀".repeat(100)),
    ] {
        let units: Vec<u16> = text.encode_utf16().collect();

        group.throughput(Throughput::Elements(units.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(name), &units, |b, units| {
            b.iter(|| black_box(utf8_len(units)));
        });
    }

    group.finish();
}

fn bench_encode_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_batch");

    for count in [1, 100, 10000] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter_batched(
                || {
                    let mut queue = CommandEncoderQueue::new();
                    for cmd in ping_batch(count) {
                        queue.add(cmd);
                    }
                    queue
                },
                |mut queue| black_box(queue.flush(count).map(drain)),
                criterion::BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn bench_encode_payload(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_payload");

    for size in [100, 10000, 1000000] {
        let text = "x".repeat(size);
        let bytes = Bytes::from(text.clone());

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("text", size), &text, |b, text| {
            b.iter(|| {
                let mut queue = CommandEncoderQueue::new();
                queue.add(command!("SET", "key", text.as_str()));
                black_box(queue.flush(1).map(drain))
            });
        });
        group.bench_with_input(BenchmarkId::new("bytes", size), &bytes, |b, bytes| {
            b.iter(|| {
                let mut queue = CommandEncoderQueue::new();
                queue.add(command!("SET", "key", bytes.clone()));
                black_box(queue.flush(1).map(drain))
            });
        });
        group.bench_with_input(BenchmarkId::new("blob", size), &bytes, |b, bytes| {
            b.iter(|| {
                let mut queue = CommandEncoderQueue::new();
                let blob = Argument::blob(BytesBlob::new(bytes.clone()));
                queue.add(Command::new("SET").arg("key").arg(blob));
                black_box(queue.flush(1).map(drain))
            });
        });
    }

    group.finish();
}

fn bench_compose(c: &mut Criterion) {
    let mut group = c.benchmark_group("compose_chunks");

    for parts in [2, 16, 256] {
        let chunk = Bytes::from_static(b"*1\r\n$4\r\nPING\r\n");

        group.throughput(Throughput::Elements(parts as u64));
        group.bench_with_input(BenchmarkId::from_parameter(parts), &parts, |b, &parts| {
            b.iter(|| {
                let mut composer = FrameComposer::new();
                for _ in 0..parts {
                    composer.add_chunk(chunk.clone());
                }
                black_box(composer.compose())
            });
        });
    }

    group.finish();
}

fn bench_decode_bulk(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_bulk");

    for size in [100, 10000, 1000000] {
        let encoded = format!("${}\r\n{}\r\n", size, "x".repeat(size)).into_bytes();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &encoded, |b, encoded| {
            b.iter(|| {
                let mut decoder = Decoder::new();
                decoder.extend(encoded);
                black_box(decoder.decode_reply().unwrap())
            });
        });
    }

    group.finish();
}

fn bench_decode_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_pipeline");

    for count in [100, 10000] {
        let encoded: Vec<u8> = (0..count)
            .flat_map(|i| format!("+{}\r\n", i).into_bytes())
            .collect();

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &encoded, |b, encoded| {
            b.iter(|| {
                let mut decoder = Decoder::new();
                decoder.extend(encoded);
                let mut n = 0;
                while let Some(reply) = decoder.decode_reply().unwrap() {
                    black_box(reply);
                    n += 1;
                }
                n
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_utf8_len,
    bench_encode_batch,
    bench_encode_payload,
    bench_compose,
    bench_decode_bulk,
    bench_decode_pipeline,
);

criterion_main!(benches);
