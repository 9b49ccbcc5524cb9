//! Throughput benchmark for `ByteStreamPipe`: messages per second through the
//! write -> flush -> read -> advance_to cycle that every recv/send pump in
//! the relay drives.
//!
//! Tests the PUBLIC API from `relay_core::pipe` at several message sizes.

use std::time::Duration;

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use relay_core::backpressure::Watermarks;
use relay_core::pipe::pipe;

const MESSAGE_SIZES: &[usize] = &[64, 256, 1024, 4096, 16384];
const MESSAGE_COUNT: usize = 10_000;

/// One writer task staging pre-framed `Bytes` messages against one reader
/// task draining them, both cooperatively scheduled on a single runtime —
/// the same shape `recv_from_socket`/`frame_from_recv` run in production.
fn pipe_throughput(c: &mut Criterion) {
    relay::dev_tracing::init_tracing();
    let mut group = c.benchmark_group("throughput/relay_core/pipe");
    group.measurement_time(Duration::from_secs(10));
    group.sample_size(20);

    let rt = compio::runtime::Runtime::new().unwrap();

    for &size in MESSAGE_SIZES {
        group.throughput(Throughput::Bytes((size * MESSAGE_COUNT) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let payload = Bytes::from(vec![0u8; size]);

            b.iter(|| {
                rt.block_on(async {
                    let (mut writer, mut reader) = pipe(Watermarks::default());

                    let writer_task = compio::runtime::spawn({
                        let payload = payload.clone();
                        async move {
                            for _ in 0..MESSAGE_COUNT {
                                writer.write_bytes(black_box(payload.clone()));
                                writer.flush().await;
                            }
                            writer.complete();
                        }
                    });

                    let mut delivered = 0usize;
                    loop {
                        let result = reader.read().await;
                        let len = result.buffer.len();
                        delivered += len;
                        reader.advance_to(len, len);
                        if result.completed {
                            break;
                        }
                    }
                    debug_assert_eq!(delivered, size * MESSAGE_COUNT);

                    writer_task.await;
                });
            });
        });
    }
    group.finish();
}

criterion_group!(benches, pipe_throughput);
criterion_main!(benches);
