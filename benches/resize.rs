use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use levelhash::{LevelHashTable, MmapPool, TableConfig};
use tempfile::tempdir;

type Table = LevelHashTable<MmapPool, 16, 15, 4>;

fn table_near_capacity(level_exp: u8) -> (tempfile::TempDir, Table, u64) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("pool.bin");
    let pool = MmapPool::create(&path, 1 << 25).unwrap();
    let config = TableConfig::new(&path).with_level_exp(level_exp);
    let mut table = Table::init(pool, &config).unwrap();
    let mut i = 0u64;
    loop {
        let key = format!("k{}", i);
        let value = format!("v{}", i);
        if table.insert(key.as_bytes(), value.as_bytes()).is_err() {
            break;
        }
        i += 1;
    }
    (dir, table, i)
}

fn expand(c: &mut Criterion) {
    let mut group = c.benchmark_group("resize");
    for &level_exp in &[8u8, 10] {
        group.bench_with_input(BenchmarkId::new("expand", level_exp), &level_exp, |b, &level_exp| {
            b.iter_batched(
                || table_near_capacity(level_exp),
                |(dir, mut table, _count)| {
                    table.expand().unwrap();
                    drop(dir);
                },
                criterion::BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, expand);
criterion_main!(benches);
