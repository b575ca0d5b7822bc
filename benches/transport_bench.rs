//! Transport layer benchmarks.
//!
//! Buffer pool churn, address record parsing and encrypted stream
//! throughput over an in-memory pipe.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use cftun::crypto::Cipher;
use cftun::proxy::Address;
use cftun::transport::BufferPool;
use cftun::transport::EncryptedStream;

fn bench_pool_get_put(c: &mut Criterion) {
    let pool = BufferPool::default();

    c.bench_function("pool_get_put", |b| {
        b.iter(|| {
            let buf = pool.get();
            black_box(buf.len());
            pool.put(buf);
        })
    });
}

fn bench_address_parse(c: &mut Criterion) {
    let mut raw = vec![0x03, 11];
    raw.extend_from_slice(b"example.com");
    raw.extend_from_slice(&[0x01, 0xBB]);

    c.bench_function("address_parse_domain", |b| {
        b.iter(|| black_box(Address::from_bytes(black_box(&raw)).unwrap()))
    });
}

fn bench_encrypted_stream(c: &mut Criterion) {
    const CHUNK: usize = 16 * 1024;
    const CHUNKS: usize = 64;

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let pool = Arc::new(BufferPool::default());
    let payload = vec![0xA5u8; CHUNK];

    let mut group = c.benchmark_group("encrypted_stream");
    group.throughput(Throughput::Bytes((CHUNK * CHUNKS) as u64));

    group.bench_function("1MiB_duplex", |b| {
        b.iter(|| {
            rt.block_on(async {
                let (left, right) = tokio::io::duplex(64 * 1024);
                let mut writer =
                    EncryptedStream::new(left, Cipher::new("aes-256-cfb", "bench"), Arc::clone(&pool));
                let mut reader =
                    EncryptedStream::new(right, Cipher::new("aes-256-cfb", "bench"), Arc::clone(&pool));

                let payload = payload.clone();
                let send = tokio::spawn(async move {
                    for _ in 0..CHUNKS {
                        writer.write_all(&payload).await.unwrap();
                    }
                    writer.shutdown().await.unwrap();
                });

                let mut out = vec![0u8; CHUNK];
                for _ in 0..CHUNKS {
                    reader.read_exact(&mut out).await.unwrap();
                }
                send.await.unwrap();
                black_box(out);
            })
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_pool_get_put,
    bench_address_parse,
    bench_encrypted_stream,
);

criterion_main!(benches);
