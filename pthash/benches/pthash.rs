use criterion::{criterion_group, criterion_main, Criterion, BenchmarkId};
use pthash::{BuildConf, Function, DefaultKeyHasher, SkewBucketer, Xor, encoding::{Flat, Interleaved}};

pub fn get(c: &mut Criterion) {
    let keys = (0u32..200_000).step_by(2).collect::<Vec<_>>();
    let f: Function = Function::from(&keys[..]);
    let interleaved = Function::<DefaultKeyHasher, SkewBucketer, Interleaved, Xor>::new(&keys);
    let mut group = c.benchmark_group("get");
    for key in [2, 103_032, 199_998].iter() {
        group.bench_with_input(BenchmarkId::new("flat_additive", key), key, |b, &key| {
            b.iter(|| f.get(&key))
        });
        group.bench_with_input(BenchmarkId::new("interleaved_xor", key), key, |b, &key| {
            b.iter(|| interleaved.get(&key))
        });
    }
    group.finish();
}

pub fn build(c: &mut Criterion) {
    let keys = (0u64..50_000).collect::<Vec<_>>();
    let mut group = c.benchmark_group("build");
    group.sample_size(10);
    for threads in [1, 0] {
        group.bench_with_input(BenchmarkId::new("threads", threads), &threads, |b, &threads| {
            b.iter(|| Function::<DefaultKeyHasher, SkewBucketer, Flat>::with_conf(&keys, BuildConf::mt(threads)))
        });
    }
    group.finish();
}

criterion_group!(benches, get, build);
criterion_main!(benches);
