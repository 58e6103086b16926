//! Benchmarks pour la sélection du dernier dump

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tempfile::TempDir;

fn populate(count: usize) -> TempDir {
    let tmp = TempDir::new().expect("tempdir");
    for i in 0..count {
        let sub = tmp.path().join(format!("batch_{}", i % 10));
        std::fs::create_dir_all(&sub).expect("mkdir");
        std::fs::write(sub.join(format!("sidewalk_gaps_v{}.sql", i)), b"").expect("write");
    }
    tmp
}

fn bench_parse_version(c: &mut Criterion) {
    c.bench_function("parse_version", |b| {
        b.iter(|| pgbackup::parse_version(black_box("sidewalk_gaps_2024_v1234.sql")))
    });
}

fn bench_select_latest(c: &mut Criterion) {
    let mut group = c.benchmark_group("select_latest");

    for count in [10usize, 100, 1000] {
        let tmp = populate(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &tmp, |b, tmp| {
            b.iter(|| pgbackup::select_latest(black_box(tmp.path())))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_parse_version, bench_select_latest);
criterion_main!(benches);
