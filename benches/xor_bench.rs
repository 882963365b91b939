use brightchain::{xor_buffers, xor_streams};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn bench_xor(c: &mut Criterion) {
    let a = vec![0xA5u8; 1024 * 1024];
    let b = vec![0x3Cu8; 1024 * 1024];
    let d = vec![0x77u8; 1024 * 1024];

    c.bench_function("xor_buffers 3x1MiB", |bench| {
        bench.iter(|| {
            let out = xor_buffers(&[black_box(&a), black_box(&b), black_box(&d)]).unwrap();
            black_box(out);
        })
    });

    c.bench_function("xor_streams 3x1MiB (checksummed)", |bench| {
        bench.iter(|| {
            let sources = vec![a.as_slice(), b.as_slice(), d.as_slice()];
            let mut sink = Vec::with_capacity(a.len());
            let (checksum, total) = xor_streams(sources, &mut sink).unwrap();
            black_box((checksum, total, sink));
        })
    });
}

criterion_group!(benches, bench_xor);
criterion_main!(benches);
