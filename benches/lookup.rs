use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use levelhash::{LevelHashTable, MmapPool, TableConfig};
use rand::Rng;
use tempfile::tempdir;

type Table = LevelHashTable<MmapPool, 16, 15, 4>;

const TOTAL_KEYS: u64 = 2000;

fn filled_table(level_exp: u8) -> (tempfile::TempDir, Table) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("pool.bin");
    let pool = MmapPool::create(&path, 1 << 24).unwrap();
    let config = TableConfig::new(&path).with_level_exp(level_exp);
    let mut table = Table::init(pool, &config).unwrap();
    for i in 0..TOTAL_KEYS {
        let key = format!("k{}", i);
        let value = format!("v{}", i);
        if table.insert(key.as_bytes(), value.as_bytes()).is_err() {
            table.expand().unwrap();
            table.insert(key.as_bytes(), value.as_bytes()).unwrap();
        }
    }
    (dir, table)
}

fn lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookup");
    for &level_exp in &[8u8, 10, 12] {
        let (_dir, table) = filled_table(level_exp);
        let mut rng = rand::thread_rng();

        group.bench_with_input(BenchmarkId::new("static", level_exp), &table, |b, table| {
            b.iter(|| {
                let i = rng.gen_range(0..TOTAL_KEYS);
                let key = format!("k{}", i);
                black_box(table.static_query(key.as_bytes()))
            });
        });

        group.bench_with_input(BenchmarkId::new("dynamic", level_exp), &table, |b, table| {
            b.iter(|| {
                let i = rng.gen_range(0..TOTAL_KEYS);
                let key = format!("k{}", i);
                black_box(table.dynamic_query(key.as_bytes()))
            });
        });
    }
    group.finish();
}

criterion_group!(benches, lookup);
criterion_main!(benches);
