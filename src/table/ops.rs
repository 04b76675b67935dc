//! Lookup, insert, update, and delete: the operations a caller drives
//! directly. Movement/promotion fallbacks live in `super::movement`;
//! this module calls into them once both of a key's candidate buckets,
//! at both levels, are full.

use super::layout::{self, ResizeState};
use super::placement;
use crate::error::{LevelHashError, Result};
use crate::pm::flush::same_cache_line;
use crate::pm::PmPool;

use super::LevelHashTable;

/// Where the canonical probe order found (or would insert) a key.
pub(super) struct Probe {
    pub level: usize,
    pub idx_f: u64,
    pub idx_s: u64,
}

impl<P: PmPool, const KEY_LEN: usize, const VALUE_LEN: usize, const ASSOC_NUM: usize>
    LevelHashTable<P, KEY_LEN, VALUE_LEN, ASSOC_NUM>
{
    fn level_capacity(&self, level: usize) -> u64 {
        let h = self.root();
        if level == 0 {
            h.l0_buckets
        } else {
            h.l1_buckets
        }
    }

    fn probe(&self, level: usize, key: &[u8]) -> Probe {
        let capacity = self.level_capacity(level);
        let (f, s) = placement::candidates(&self.hashes, key, capacity);
        Probe {
            level,
            idx_f: f,
            idx_s: s,
        }
    }

    /// Find `key` in `L[probe.level]`'s two candidate buckets, returning
    /// `(bucket_idx, slot_idx)` on a match.
    fn find_in_level(&self, probe: &Probe, key: &[u8]) -> Option<(u64, usize)> {
        for &idx in &[probe.idx_f, probe.idx_s] {
            let base = self.bucket_base(probe.level, idx);
            let token = self.read_token(base);
            for slot in 0..ASSOC_NUM {
                if layout::get_bit(token, slot) {
                    let slot_base = layout::slot_offset(base, slot, KEY_LEN, VALUE_LEN);
                    let stored = self.pool.as_slice(slot_base, KEY_LEN);
                    if placement::key_eq(stored, key) {
                        return Some((idx, slot));
                    }
                }
            }
        }
        None
    }

    /// Static lookup: always probes `L0` then `L1` (§4.2).
    pub fn static_query(&self, key: &[u8]) -> Option<Vec<u8>> {
        let key = &pad(key, KEY_LEN)[..];
        for level in 0..2 {
            let probe = self.probe(level, key);
            if let Some((idx, slot)) = self.find_in_level(&probe, key) {
                let base = self.bucket_base(level, idx);
                let value_off = layout::slot_offset(base, slot, KEY_LEN, VALUE_LEN) + KEY_LEN as u64;
                return Some(self.pool.as_slice(value_off, VALUE_LEN).to_vec());
            }
        }
        None
    }

    /// Dynamic lookup: probes whichever level currently holds more
    /// items first, ties going to `L0` (§4.2). Semantically identical
    /// to `static_query`; only the expected-case cost differs.
    pub fn dynamic_query(&self, key: &[u8]) -> Option<Vec<u8>> {
        let key = &pad(key, KEY_LEN)[..];
        let h = self.root();
        let order: [usize; 2] = if h.count[1] > h.count[0] { [1, 0] } else { [0, 1] };
        for level in order {
            let probe = self.probe(level, key);
            if let Some((idx, slot)) = self.find_in_level(&probe, key) {
                let base = self.bucket_base(level, idx);
                let value_off = layout::slot_offset(base, slot, KEY_LEN, VALUE_LEN) + KEY_LEN as u64;
                return Some(self.pool.as_slice(value_off, VALUE_LEN).to_vec());
            }
        }
        None
    }

    /// Persist `(key, value)` at `L[level][bucket][slot]` following the
    /// cache-line-aware slot-write protocol (§4.6), set the token bit,
    /// and fence.
    pub(super) fn write_slot(&mut self, level: usize, bucket: u64, slot: usize, key: &[u8], value: &[u8]) {
        let base = self.bucket_base(level, bucket);
        self.write_slot_at(base, slot, key, value);
    }

    /// Persist `(key, value)` at `slot` of the bucket starting at the
    /// pool-relative offset `base`, following the cache-line-aware
    /// slot-write protocol (§4.6). Takes a raw base rather than a
    /// `(level, bucket)` pair so it can also be used against the
    /// transient `interim` array during expand/shrink.
    pub(super) fn write_slot_at(&mut self, base: u64, slot: usize, key: &[u8], value: &[u8]) {
        let slot_off = layout::slot_offset(base, slot, KEY_LEN, VALUE_LEN);
        let token_off = layout::token_offset(base, ASSOC_NUM, KEY_LEN, VALUE_LEN);
        let slot_len = KEY_LEN + VALUE_LEN;

        self.pool.as_mut_slice(slot_off, KEY_LEN).copy_from_slice(key);
        self.pool
            .as_mut_slice(slot_off + KEY_LEN as u64, VALUE_LEN)
            .copy_from_slice(value);
        self.pool.fence();

        if same_cache_line(slot_off as usize, slot_len, token_off as usize, 4) {
            let token = self.read_token(base);
            let token = layout::set_bit(token, slot, true);
            self.pool.as_mut_slice(token_off, 4).copy_from_slice(&token.to_le_bytes());
            self.pool.flush(slot_off, slot_len);
        } else {
            self.pool.flush(slot_off, KEY_LEN);
            self.pool.flush(slot_off + KEY_LEN as u64, VALUE_LEN);
            self.pool.fence();
            let token = self.read_token(base);
            let token = layout::set_bit(token, slot, true);
            self.pool.as_mut_slice(token_off, 4).copy_from_slice(&token.to_le_bytes());
            self.pool.flush(token_off, 4);
        }
        self.pool.fence();
    }

    /// Clear a token bit, flush, fence (used by delete and by movement
    /// sources).
    pub(super) fn clear_token_bit(&mut self, level: usize, bucket: u64, slot: usize) {
        let base = self.bucket_base(level, bucket);
        self.clear_token_bit_at(base, slot);
    }

    pub(super) fn clear_token_bit_at(&mut self, base: u64, slot: usize) {
        let token_off = layout::token_offset(base, ASSOC_NUM, KEY_LEN, VALUE_LEN);
        let token = self.read_token(base);
        let token = layout::set_bit(token, slot, false);
        self.pool.as_mut_slice(token_off, 4).copy_from_slice(&token.to_le_bytes());
        self.pool.flush(token_off, 4);
        self.pool.fence();
    }

    fn first_free_slot(&self, level: usize, bucket: u64) -> Option<usize> {
        let base = self.bucket_base(level, bucket);
        let token = self.read_token(base);
        (0..ASSOC_NUM).find(|&slot| !layout::get_bit(token, slot))
    }

    /// Insert `(key, value)` without checking for an existing key
    /// (§4.3, §9): duplicate detection is the caller's responsibility
    /// via `update`/`upsert`. Returns `Ok(())` on success or
    /// `Err(LevelHashError::NoRoom)` when the caller should `expand`
    /// and retry.
    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        debug_assert!(key.len() <= KEY_LEN);
        debug_assert!(value.len() <= VALUE_LEN);
        if key.len() > KEY_LEN {
            return Err(LevelHashError::TooLarge {
                actual: key.len(),
                max: KEY_LEN,
            });
        }
        if value.len() > VALUE_LEN {
            return Err(LevelHashError::TooLarge {
                actual: value.len(),
                max: VALUE_LEN,
            });
        }
        let key = &pad(key, KEY_LEN)[..];
        let value = &pad(value, VALUE_LEN)[..];

        for level in 0..2 {
            let probe = self.probe(level, key);
            for &idx in &[probe.idx_f, probe.idx_s] {
                if let Some(slot) = self.first_free_slot(level, idx) {
                    self.write_slot(level, idx, slot, key, value);
                    self.bump_count(level, 1);
                    return Ok(());
                }
            }
        }

        for level in 0..2 {
            let probe = self.probe(level, key);
            if self.try_movement(level, probe.idx_f, key, value)?
                || self.try_movement(level, probe.idx_s, key, value)?
            {
                self.bump_count(level, 1);
                return Ok(());
            }
        }

        if self.root().expand_time > 0 {
            // The bottom level's (L1) candidate indices for this key:
            // `b2t_movement` evicts an existing L1 occupant up to L0,
            // and the caller (here) writes the new item into the slot
            // that vacates in L1.
            let probe = self.probe(1, key);
            if let Some(slot) = self.b2t_movement(probe.idx_f)? {
                self.write_slot(1, probe.idx_f, slot, key, value);
                self.bump_count(1, 1);
                return Ok(());
            }
            if let Some(slot) = self.b2t_movement(probe.idx_s)? {
                self.write_slot(1, probe.idx_s, slot, key, value);
                self.bump_count(1, 1);
                return Ok(());
            }
        }

        log::debug!("insert found no room for key, caller should expand and retry");
        Err(LevelHashError::NoRoom)
    }

    pub(super) fn bump_count(&mut self, level: usize, delta: i64) {
        let h = self.root_mut();
        if delta >= 0 {
            h.count[level] += delta as u64;
        } else {
            h.count[level] -= (-delta) as u64;
        }
        self.flush_root();
        self.pool.fence();
    }

    /// Update `key`'s value in place (§4.4). Returns
    /// `Err(LevelHashError::NotFound)` when the key is absent.
    pub fn update(&mut self, key: &[u8], new_value: &[u8]) -> Result<()> {
        if new_value.len() > VALUE_LEN {
            return Err(LevelHashError::TooLarge {
                actual: new_value.len(),
                max: VALUE_LEN,
            });
        }
        let key = &pad(key, KEY_LEN)[..];
        let new_value = &pad(new_value, VALUE_LEN)[..];

        for level in 0..2 {
            let probe = self.probe(level, key);
            if let Some((bucket, slot)) = self.find_in_level(&probe, key) {
                if let Some(free) = self.first_free_slot(level, bucket) {
                    // Log-free update: write the new value into a free
                    // slot, then flip both bits in a single token store.
                    self.write_value_only(level, bucket, free, key, new_value);
                    let base = self.bucket_base(level, bucket);
                    let mut token = self.read_token(base);
                    token = layout::set_bit(token, free, true);
                    token = layout::set_bit(token, slot, false);
                    let token_off = layout::token_offset(base, ASSOC_NUM, KEY_LEN, VALUE_LEN);
                    self.pool.as_mut_slice(token_off, 4).copy_from_slice(&token.to_le_bytes());
                    self.pool.flush(token_off, 4);
                    self.pool.fence();
                } else {
                    // Logged update: record the intent, overwrite the
                    // value in place, then retire the log entry.
                    let value_log = self.value_log();
                    let current = self.root().value_log_current;
                    value_log.write(&mut self.pool, current, key, new_value);

                    self.overwrite_slot_value(level, bucket, slot, new_value);

                    let next = value_log.clean(&mut self.pool, current);
                    self.root_mut().value_log_current = next;
                    self.flush_root();
                }
                return Ok(());
            }
        }
        Err(LevelHashError::NotFound)
    }

    fn write_value_only(&mut self, level: usize, bucket: u64, slot: usize, key: &[u8], value: &[u8]) {
        let base = self.bucket_base(level, bucket);
        let slot_off = layout::slot_offset(base, slot, KEY_LEN, VALUE_LEN);
        self.pool.as_mut_slice(slot_off, KEY_LEN).copy_from_slice(key);
        self.pool
            .as_mut_slice(slot_off + KEY_LEN as u64, VALUE_LEN)
            .copy_from_slice(value);
        self.pool.flush(slot_off, KEY_LEN + VALUE_LEN);
        self.pool.fence();
    }

    /// Remove `key`. Returns `Err(LevelHashError::NotFound)` when the
    /// key is absent. The key/value bytes are left in place as
    /// tombstones; only the token bit is cleared.
    pub fn delete(&mut self, key: &[u8]) -> Result<()> {
        let key = &pad(key, KEY_LEN)[..];
        for level in 0..2 {
            let probe = self.probe(level, key);
            if let Some((bucket, slot)) = self.find_in_level(&probe, key) {
                self.clear_token_bit(level, bucket, slot);
                self.bump_count(level, -1);
                return Ok(());
            }
        }
        Err(LevelHashError::NotFound)
    }

    /// Convenience built from `static_query` + `update`/`insert`: if
    /// `key` is present, overwrite its value; otherwise insert it. See
    /// the duplicate-key decision recorded in `DESIGN.md`.
    pub fn upsert(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if self.static_query(key).is_some() {
            self.update(key, value)
        } else {
            self.insert(key, value)
        }
    }

    pub(super) fn resize_state(&self) -> ResizeState {
        self.root().resize_state()
    }
}

/// NUL-pad `bytes` out to `width`, matching the C-string-style fixed
/// key/value encoding used throughout the table (§3).
pub(super) fn pad(bytes: &[u8], width: usize) -> Vec<u8> {
    let mut out = vec![0u8; width];
    out[..bytes.len()].copy_from_slice(bytes);
    out
}
