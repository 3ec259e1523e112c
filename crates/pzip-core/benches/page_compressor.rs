use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use pzip_core::{PageTask, RunBufferPool, codec, compress_page, compress_page_into};

fn mixed_runs(len: usize) -> Vec<u8> {
    let mut state = 0x9E37_79B9_7F4A_7C15u64;
    let mut out = Vec::with_capacity(len);
    while out.len() < len {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let symbol = (state >> 56) as u8;
        let run = 1 + ((state >> 32) % 48) as usize;
        out.extend(std::iter::repeat_n(symbol, run.min(len - out.len())));
    }
    out
}

fn bench_compress_page(c: &mut Criterion) {
    let page = 4096usize;
    let uniform = vec![b'a'; page];
    let alternating: Vec<u8> = (0..page).map(|i| (i % 2) as u8).collect();
    let mixed = mixed_runs(page);

    let mut group = c.benchmark_group("compress_page");
    group.throughput(Throughput::Bytes(page as u64));
    group.bench_function("uniform_4k", |b| {
        b.iter(|| compress_page(black_box(&uniform)))
    });
    group.bench_function("alternating_4k", |b| {
        b.iter(|| compress_page(black_box(&alternating)))
    });
    group.bench_function("mixed_4k", |b| b.iter(|| compress_page(black_box(&mixed))));

    let mut scratch = Vec::new();
    group.bench_function("mixed_4k_reused_buffer", |b| {
        b.iter(|| {
            compress_page_into(black_box(&mixed), &mut scratch).expect("compress failed");
            scratch.len()
        })
    });
    group.finish();
}

fn bench_compress_task(c: &mut Criterion) {
    let pool = RunBufferPool::new(512, 8);
    let task = PageTask::from_bytes(0, 0, mixed_runs(64 * 1024), true);

    let mut group = c.benchmark_group("compress_task");
    group.throughput(Throughput::Bytes(task.len() as u64));
    group.bench_function("pooled_64k", |b| {
        b.iter(|| {
            codec::compress_task(black_box(&task), &pool)
                .expect("compress failed")
                .runs()
                .len()
        })
    });
    group.finish();
}

criterion_group!(benches, bench_compress_page, bench_compress_task);
criterion_main!(benches);
