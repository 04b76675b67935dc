//! Cuckoo-like same-level movement and bottom-to-top promotion: the two
//! fallback paths `insert` uses once a key's direct candidate buckets,
//! at a given level, are both full (§4.3, §4.9).
//!
//! Both operations perform a two-step mutation (write destination, then
//! clear source); the insert log records the destination coordinates
//! before any byte of the move is written so a crash between the two
//! steps is recoverable (see `crate::redolog`).

use super::layout;
use super::placement;
use crate::error::Result;
use crate::pm::PmPool;
use crate::redolog::InsertLogEntry;

use super::LevelHashTable;

impl<P: PmPool, const KEY_LEN: usize, const VALUE_LEN: usize, const ASSOC_NUM: usize>
    LevelHashTable<P, KEY_LEN, VALUE_LEN, ASSOC_NUM>
{
    /// Try to relocate one occupant of `L[level][idx]` to its other
    /// candidate bucket at this level, freeing a slot for `(key,
    /// value)`, which is then written into the vacated slot. Returns
    /// `true` on success.
    pub(super) fn try_movement(&mut self, level: usize, idx: u64, key: &[u8], value: &[u8]) -> Result<bool> {
        let capacity = if level == 0 {
            self.root().l0_buckets
        } else {
            self.root().l1_buckets
        };
        let base = self.bucket_base(level, idx);

        for i in 0..ASSOC_NUM {
            let token = self.read_token(base);
            if !layout::get_bit(token, i) {
                continue;
            }
            let slot_off = layout::slot_offset(base, i, KEY_LEN, VALUE_LEN);
            let m_key = self.pool.as_slice(slot_off, KEY_LEN).to_vec();
            let m_value = self
                .pool
                .as_slice(slot_off + KEY_LEN as u64, VALUE_LEN)
                .to_vec();

            let (f, s) = placement::candidates(&self.hashes, &m_key, capacity);
            let jdx = if f == idx { s } else { f };
            let jbase = self.bucket_base(level, jdx);
            let jtoken = self.read_token(jbase);

            for j in 0..ASSOC_NUM {
                if layout::get_bit(jtoken, j) {
                    continue;
                }

                let entry = InsertLogEntry::new(level as u8, jdx, j as u8);
                let insert_log = self.insert_log();
                let current = self.root().insert_log_current;
                insert_log.write(&mut self.pool, current, entry);

                self.write_slot(level, jdx, j, &m_key, &m_value);
                self.clear_token_bit(level, idx, i);

                let next = insert_log.clean(&mut self.pool, current);
                self.root_mut().insert_log_current = next;
                self.flush_root();

                self.write_slot(level, idx, i, key, value);
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Try to move one occupant of `L1[idx]` up to one of its two L0
    /// candidate buckets. On success, returns the now-vacant slot
    /// index in `L1[idx]`; the caller is expected to write the new
    /// item there. Only valid once the table has expanded at least
    /// once, matching the reference's `level_expand_time > 0` guard.
    pub(super) fn b2t_movement(&mut self, idx: u64) -> Result<Option<usize>> {
        let l0_capacity = self.root().l0_buckets;
        let base = self.bucket_base(1, idx);

        for i in 0..ASSOC_NUM {
            let token = self.read_token(base);
            if !layout::get_bit(token, i) {
                continue;
            }
            let slot_off = layout::slot_offset(base, i, KEY_LEN, VALUE_LEN);
            let m_key = self.pool.as_slice(slot_off, KEY_LEN).to_vec();
            let m_value = self
                .pool
                .as_slice(slot_off + KEY_LEN as u64, VALUE_LEN)
                .to_vec();

            let (f, s) = placement::candidates(&self.hashes, &m_key, l0_capacity);
            for &target in &[f, s] {
                let tbase = self.bucket_base(0, target);
                let ttoken = self.read_token(tbase);
                for j in 0..ASSOC_NUM {
                    if layout::get_bit(ttoken, j) {
                        continue;
                    }

                    let entry = InsertLogEntry::new(0, target, j as u8);
                    let insert_log = self.insert_log();
                    let current = self.root().insert_log_current;
                    insert_log.write(&mut self.pool, current, entry);

                    self.write_slot(0, target, j, &m_key, &m_value);
                    self.clear_token_bit(1, idx, i);

                    let next = insert_log.clean(&mut self.pool, current);
                    self.root_mut().insert_log_current = next;
                    self.flush_root();

                    self.bump_count(0, 1);
                    self.bump_count(1, -1);

                    return Ok(Some(i));
                }
            }
        }

        Ok(None)
    }
}
