//! End-to-end client-server benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use respipe_client::{connect, ConnectionConfig, TcpClient};
use respipe_protocol::{command, Argument, BytesBlob, Command, Decoder};
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Runtime;

/// Minimal RESP server: `PING` -> `+PONG`, `PING x` -> `+x`, anything else
/// -> `+OK`.
async fn serve(mut socket: TcpStream) {
    let mut decoder = Decoder::new();
    let mut buf = vec![0u8; 64 * 1024];
    let mut out = Vec::with_capacity(64 * 1024);

    loop {
        let n = match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        decoder.extend(&buf[..n]);

        out.clear();
        while let Ok(Some(request)) = decoder.decode_reply() {
            let items = request.into_items().unwrap_or_default();
            let is_ping = items.first().and_then(|r| r.as_str()) == Some("PING");
            match items.get(1).and_then(|r| r.as_str()) {
                Some(msg) if is_ping => {
                    out.push(b'+');
                    out.extend_from_slice(msg.as_bytes());
                    out.extend_from_slice(b"\r\n");
                }
                None if is_ping => out.extend_from_slice(b"+PONG\r\n"),
                _ => out.extend_from_slice(b"+OK\r\n"),
            }
        }
        if socket.write_all(&out).await.is_err() {
            return;
        }
    }
}

fn setup_server_and_client(rt: &Runtime) -> TcpClient {
    rt.block_on(async {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(serve(socket));
            }
        });

        connect(ConnectionConfig::new(addr.to_string())).await.unwrap()
    })
}

fn bench_ping_latency(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let client = setup_server_and_client(&rt);

    let mut group = c.benchmark_group("e2e_ping");
    group.throughput(Throughput::Elements(1));

    group.bench_function("ping", |b| {
        b.to_async(&rt).iter(|| async {
            client.send(command!("PING"));
            black_box(client.read().await.unwrap())
        });
    });

    group.finish();
}

fn bench_pipeline(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let client = setup_server_and_client(&rt);

    let mut group = c.benchmark_group("e2e_pipeline");
    group.sample_size(20);

    for count in [10, 1000, 10000] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("pings", count), &count, |b, &count| {
            b.to_async(&rt).iter(|| {
                let client = &client;
                async move {
                    client.send_batch((0..count).map(|i| command!("PING", i)));
                    black_box(client.read_many(count).await.unwrap())
                }
            });
        });
    }

    group.finish();
}

fn bench_blob_upload(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let client = setup_server_and_client(&rt);

    let mut group = c.benchmark_group("e2e_blob");
    group.sample_size(20);

    for size in [1024, 1024 * 1024] {
        let payload = bytes::Bytes::from(vec![0x42u8; size]);

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("set", size), &payload, |b, payload| {
            b.to_async(&rt).iter(|| {
                let client = &client;
                let blob = Argument::blob(BytesBlob::new(payload.clone()));
                async move {
                    client.send(Command::new("SET").arg("blob").arg(blob));
                    black_box(client.read().await.unwrap())
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_ping_latency, bench_pipeline, bench_blob_upload);

criterion_main!(benches);
