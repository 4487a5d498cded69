//! Chunk reader benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use s3_loadgen::upload::ChunkReader;
use std::io::Cursor;

const SOURCE_SIZE: usize = 64 * 1024 * 1024;

fn benchmark_part_sizes(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let data = vec![0u8; SOURCE_SIZE];

    let mut group = c.benchmark_group("chunk_reader");
    group.throughput(Throughput::Bytes(SOURCE_SIZE as u64));
    group.sample_size(20);

    for part_size in [1024 * 1024, 5 * 1024 * 1024, 20 * 1024 * 1024].iter() {
        group.bench_with_input(
            format!("{}_mb_parts", part_size / (1024 * 1024)),
            part_size,
            |b, &part_size| {
                b.to_async(&runtime).iter(|| async {
                    let mut reader = ChunkReader::new(Cursor::new(data.as_slice()), part_size);
                    while let Some(part) = reader.next_part().await.unwrap() {
                        black_box(part);
                    }
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, benchmark_part_sizes);
criterion_main!(benches);
