use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use levelhash::{LevelHashTable, MmapPool, TableConfig};
use rand::Rng;
use tempfile::tempdir;

type Table = LevelHashTable<MmapPool, 16, 15, 4>;

fn new_table(level_exp: u8) -> (tempfile::TempDir, Table) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("pool.bin");
    let pool = MmapPool::create(&path, 1 << 24).unwrap();
    let config = TableConfig::new(&path).with_level_exp(level_exp);
    let table = Table::init(pool, &config).unwrap();
    (dir, table)
}

fn insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");
    for &level_exp in &[8u8, 10, 12] {
        let capacity = 1u64 << level_exp;
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(capacity), &level_exp, |b, &level_exp| {
            let (_dir, mut table) = new_table(level_exp);
            let mut rng = rand::thread_rng();
            let mut i: u64 = 0;
            b.iter(|| {
                let key = format!("k{}", i);
                let value = format!("v{}", rng.gen::<u32>());
                i += 1;
                if table.insert(key.as_bytes(), value.as_bytes()).is_err() {
                    table.expand().unwrap();
                    table.insert(key.as_bytes(), value.as_bytes()).unwrap();
                }
                black_box(());
            });
        });
    }
    group.finish();
}

criterion_group!(benches, insert);
criterion_main!(benches);
