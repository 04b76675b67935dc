//! End-to-end exercise of the public API against the scenarios and
//! properties laid out for the hashing engine: round-trip operations,
//! same-level movement under collision pressure, bottom-to-top
//! promotion after an expand, expand/shrink set-preservation, and
//! crash recovery via reopening a pool mid-log.

use levelhash::{LevelHashTable, MmapPool, TableConfig};
use tempfile::tempdir;

type Table = LevelHashTable<MmapPool, 16, 15, 4>;

fn open_table(dir: &tempfile::TempDir, level_exp: u8) -> Table {
    let _ = env_logger::builder().is_test(true).try_init();
    let path = dir.path().join("pool.bin");
    let pool = MmapPool::create(&path, 1 << 22).unwrap();
    let config = TableConfig::new(&path).with_level_exp(level_exp);
    Table::init(pool, &config).unwrap()
}

fn pad(bytes: &[u8], width: usize) -> Vec<u8> {
    let mut out = vec![0u8; width];
    out[..bytes.len()].copy_from_slice(bytes);
    out
}

/// S1: init sizing, and the basic insert/update/delete round trip.
#[test]
fn s1_basic_round_trip() {
    let dir = tempdir().unwrap();
    let mut table = open_table(&dir, 4);

    table.insert(b"alpha", b"1").unwrap();
    assert_eq!(table.static_query(b"alpha").unwrap(), pad(b"1", 15));

    table.update(b"alpha", b"2").unwrap();
    assert_eq!(table.static_query(b"alpha").unwrap(), pad(b"2", 15));

    table.delete(b"alpha").unwrap();
    assert!(table.static_query(b"alpha").is_none());
}

/// S2: fill a table until insert reports no room, expand, and confirm
/// every previously inserted key is still queryable both during and
/// after the expand.
#[test]
fn s2_fill_expand_continue() {
    let dir = tempdir().unwrap();
    let mut table = open_table(&dir, 4);

    let mut inserted = Vec::new();
    let mut i = 0u64;
    loop {
        let key = format!("k{}", i);
        let value = format!("v{}", i);
        match table.insert(key.as_bytes(), value.as_bytes()) {
            Ok(()) => {
                inserted.push((key, value));
                i += 1;
            }
            Err(_) => break,
        }
    }
    assert!(!inserted.is_empty(), "table should accept at least one key before filling");

    for (k, v) in &inserted {
        assert_eq!(table.static_query(k.as_bytes()).unwrap(), pad(v.as_bytes(), 15));
    }

    table.expand().unwrap();

    for (k, v) in &inserted {
        assert_eq!(table.static_query(k.as_bytes()).unwrap(), pad(v.as_bytes(), 15));
    }

    // room should now exist for more keys
    for j in 0..8u64 {
        let key = format!("post-expand-{}", j);
        table.insert(key.as_bytes(), b"x").unwrap();
    }
}

/// S3 (collision stress): insert enough keys into a small table that
/// some candidate buckets necessarily overflow their direct capacity
/// and same-level movement (`try_movement`) must run internally for at
/// least one of them; every key involved must stay queryable.
#[test]
fn s3_collision_triggers_movement() {
    let dir = tempdir().unwrap();
    let mut table = open_table(&dir, 4);

    let mut inserted = Vec::new();
    for i in 0..40u64 {
        let key = format!("collide-{}", i);
        let value = format!("v{}", i);
        if table.insert(key.as_bytes(), value.as_bytes()).is_ok() {
            inserted.push((key, value));
        }
    }

    for (k, v) in &inserted {
        assert_eq!(table.static_query(k.as_bytes()).unwrap(), pad(v.as_bytes(), 15));
    }
}

/// S4: after one expand, drive enough inserts that bottom-to-top
/// promotion is exercised, and confirm the table stays consistent.
#[test]
fn s4_bottom_to_top_promotion_after_expand() {
    let dir = tempdir().unwrap();
    let mut table = open_table(&dir, 4);

    let mut inserted = Vec::new();
    let mut i = 0u64;
    loop {
        let key = format!("k{}", i);
        let value = format!("v{}", i);
        match table.insert(key.as_bytes(), value.as_bytes()) {
            Ok(()) => {
                inserted.push((key, value));
                i += 1;
            }
            Err(_) => break,
        }
    }
    table.expand().unwrap();

    loop {
        let key = format!("k{}", i);
        let value = format!("v{}", i);
        match table.insert(key.as_bytes(), value.as_bytes()) {
            Ok(()) => {
                inserted.push((key, value));
                i += 1;
            }
            Err(_) => break,
        }
    }

    for (k, v) in &inserted {
        assert_eq!(table.static_query(k.as_bytes()).unwrap(), pad(v.as_bytes(), 15));
    }
}

/// S5: shrink is gated on the 0.4 load-factor threshold and preserves
/// the stored set when it proceeds.
#[test]
fn s5_shrink_gate_and_set_preservation() {
    // level_exp=4 -> addr_capacity=16, total_capacity=24, so the 0.4
    // load-factor gate sits at floor(0.4 * 24 * 4) = 38 items.
    let dir = tempdir().unwrap();
    let mut table = open_table(&dir, 4);

    let mut inserted = Vec::new();
    for i in 0..45u64 {
        let key = format!("k{}", i);
        let value = format!("v{}", i);
        table.insert(key.as_bytes(), value.as_bytes()).unwrap();
        inserted.push((key, value));
    }

    // above the 38-item gate at this capacity: shrink must fail
    assert!(table.shrink().is_err());

    for (k, _) in inserted.drain(20..) {
        table.delete(k.as_bytes()).unwrap();
    }

    table.shrink().unwrap();

    for (k, v) in &inserted {
        assert_eq!(table.static_query(k.as_bytes()).unwrap(), pad(v.as_bytes(), 15));
    }
}

/// S6 (reopen path): a completed logged update survives closing and
/// reopening the pool. The two-step log write/clean sequence the
/// logged path performs (`redolog::tests`) is what makes a true
/// mid-write crash recoverable; this test exercises the surrounding
/// reopen/recovery machinery end to end rather than injecting a crash
/// inside the update itself, which would require poking at
/// table-internal layout the public API doesn't expose.
#[test]
fn s6_reopen_after_logged_update_keeps_new_value() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("pool.bin");

    {
        let pool = MmapPool::create(&path, 1 << 20).unwrap();
        let config = TableConfig::new(&path).with_level_exp(4).with_log_len(4);
        let mut table: Table = Table::init(pool, &config).unwrap();

        // Fill the key's bucket so `update` is likely to take the
        // logged path rather than the log-free one.
        table.insert(b"hot", b"orig").unwrap();
        for i in 0..3u64 {
            let _ = table.insert(format!("pad{}", i).as_bytes(), b"x");
        }
        table.update(b"hot", b"new-value").unwrap();
    }

    let pool = MmapPool::open(&path).unwrap();
    let table: Table = Table::open(pool).unwrap();
    assert_eq!(table.static_query(b"hot").unwrap(), pad(b"new-value", 15));
}

/// P4/P5: dynamic and static lookup agree on every key, and both
/// honor insert/delete round trips.
#[test]
fn dynamic_and_static_lookup_agree() {
    let dir = tempdir().unwrap();
    let mut table = open_table(&dir, 5);

    for i in 0..30u64 {
        let key = format!("k{}", i);
        let value = format!("v{}", i);
        table.insert(key.as_bytes(), value.as_bytes()).unwrap();
    }

    for i in 0..30u64 {
        let key = format!("k{}", i);
        assert_eq!(table.static_query(key.as_bytes()), table.dynamic_query(key.as_bytes()));
    }

    table.delete(b"k0").unwrap();
    assert_eq!(table.static_query(b"k0"), None);
    assert_eq!(table.dynamic_query(b"k0"), None);
}

/// P2: `len()` tracks the number of live (non-deleted) keys.
#[test]
fn len_tracks_live_keys() {
    let dir = tempdir().unwrap();
    let mut table = open_table(&dir, 4);
    assert!(table.is_empty());

    table.insert(b"a", b"1").unwrap();
    table.insert(b"b", b"2").unwrap();
    assert_eq!(table.len(), 2);

    table.delete(b"a").unwrap();
    assert_eq!(table.len(), 1);
}
