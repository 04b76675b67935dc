//! In-place expand and shrink (§4.7, §4.8).
//!
//! Both procedures mutate the root header's `resize_state` and
//! `interim_*` fields *before* touching any bucket bytes. If a crash
//! interrupts a migration, `LevelHashTable::recover` (in `super`)
//! discards the interim array and resets `resize_state` to `Idle`
//! rather than resuming the loop mid-way: the next call to
//! `expand`/`shrink` starts over from whatever the source array still
//! holds at that point. This matches the reference design's recovery
//! contract rather than attempting a resumable migration.

use super::layout::{self, ResizeState};
use super::placement;
use crate::error::{LevelHashError, Result};
use crate::pm::PmPool;

use super::LevelHashTable;

/// Fraction of `total_capacity * ASSOC_NUM` at or below which `shrink`
/// is permitted (§4.8).
const SHRINK_LOAD_FACTOR: f64 = 0.4;

impl<P: PmPool, const KEY_LEN: usize, const VALUE_LEN: usize, const ASSOC_NUM: usize>
    LevelHashTable<P, KEY_LEN, VALUE_LEN, ASSOC_NUM>
{
    /// Pick the less-loaded of two candidate buckets and return the
    /// first free slot in it, falling back to the other bucket if the
    /// less-loaded one is (surprisingly) full. `None` means both
    /// candidate buckets are completely full.
    fn pick_placement(&self, a_base: u64, b_base: u64) -> Option<(u64, usize)> {
        let a_token = self.read_token(a_base);
        let b_token = self.read_token(b_base);
        let (first_base, first_token, second_base, second_token) = if a_token.count_ones() <= b_token.count_ones() {
            (a_base, a_token, b_base, b_token)
        } else {
            (b_base, b_token, a_base, a_token)
        };
        if let Some(j) = (0..ASSOC_NUM).find(|&j| !layout::get_bit(first_token, j)) {
            return Some((first_base, j));
        }
        if let Some(j) = (0..ASSOC_NUM).find(|&j| !layout::get_bit(second_token, j)) {
            return Some((second_base, j));
        }
        None
    }

    /// Triggered when `insert` has exhausted placement and movement at
    /// the current capacity. Doubles the top level in place, folding
    /// the old top level down to become the new bottom level.
    pub fn expand(&mut self) -> Result<()> {
        if self.resize_state() == ResizeState::Idle {
            let old_l0_buckets = self.root().l0_buckets;
            let new_l0_buckets = old_l0_buckets * 2;
            let bucket_sz = Self::bucket_size();
            let interim_bytes = new_l0_buckets as u64 * bucket_sz as u64;
            let interim_offset = self.pool.alloc(interim_bytes as usize, 64)?;

            log::info!("expand: addr_capacity {} -> {}", old_l0_buckets, new_l0_buckets);

            let h = self.root_mut();
            h.interim_offset = interim_offset;
            h.interim_buckets = new_l0_buckets;
            h.resize_state = ResizeState::Expanding as u32;
            self.flush_root();
            self.pool.fence();
        }
        self.run_expand_migration()
    }

    /// The migration loop proper: move every occupied slot of the old
    /// bottom level into `interim` (sized for the new top level), then
    /// commit the swap. Safe to call repeatedly — occupied slots
    /// already migrated have had their source bit cleared, so the scan
    /// naturally skips them.
    pub(super) fn run_expand_migration(&mut self) -> Result<()> {
        let bucket_sz = Self::bucket_size();
        let interim_offset = self.root().interim_offset;
        let new_l0_buckets = self.root().interim_buckets;
        let old_l1_offset = self.root().l1_offset;
        let old_l1_buckets = self.root().l1_buckets;

        let mut moved = 0u64;
        for bucket in 0..old_l1_buckets {
            let base = layout::bucket_offset(old_l1_offset, bucket, bucket_sz);
            loop {
                let token = self.read_token(base);
                let slot = match (0..ASSOC_NUM).find(|&s| layout::get_bit(token, s)) {
                    Some(s) => s,
                    None => break,
                };
                let slot_off = layout::slot_offset(base, slot, KEY_LEN, VALUE_LEN);
                let key = self.pool.as_slice(slot_off, KEY_LEN).to_vec();
                let value = self.pool.as_slice(slot_off + KEY_LEN as u64, VALUE_LEN).to_vec();

                let (f, s) = placement::candidates(&self.hashes, &key, new_l0_buckets);
                let f_base = layout::bucket_offset(interim_offset, f, bucket_sz);
                let s_base = layout::bucket_offset(interim_offset, s, bucket_sz);

                match self.pick_placement(f_base, s_base) {
                    Some((target_base, target_slot)) => {
                        self.write_slot_at(target_base, target_slot, &key, &value);
                        self.clear_token_bit_at(base, slot);
                        moved += 1;
                    }
                    None => {
                        return Err(LevelHashError::CapacityViolation(
                            "item could not be placed into interim array during expand".into(),
                        ));
                    }
                }
            }
        }

        let old_l0_offset = self.root().l0_offset;
        let old_l0_buckets = self.root().l0_buckets;
        let old_l1_bytes = old_l1_buckets as u64 * bucket_sz as u64;
        self.pool.free(old_l1_offset, old_l1_bytes as usize);

        let h = self.root_mut();
        h.l0_offset = interim_offset;
        h.l0_buckets = new_l0_buckets;
        h.l1_offset = old_l0_offset;
        h.l1_buckets = old_l0_buckets;
        h.interim_offset = 0;
        h.interim_buckets = 0;
        h.addr_capacity = new_l0_buckets;
        h.total_capacity = new_l0_buckets + old_l0_buckets;
        h.count[1] = h.count[0];
        h.count[0] = moved;
        h.level_size += 1;
        h.expand_time += 1;
        h.resize_state = ResizeState::Idle as u32;
        self.flush_root();
        self.pool.fence();

        log::info!("expand: completed, new addr_capacity={}", new_l0_buckets);
        Ok(())
    }

    /// Permitted only while `count[0] + count[1] <= 0.4 * total_capacity
    /// * ASSOC_NUM` (§4.8).
    pub fn shrink(&mut self) -> Result<()> {
        if self.resize_state() == ResizeState::Idle {
            let h = self.root();
            let count = h.count[0] + h.count[1];
            let limit = (SHRINK_LOAD_FACTOR * h.total_capacity as f64 * ASSOC_NUM as f64) as u64;
            if count > limit {
                return Err(LevelHashError::ShrinkNotAllowed { count, limit });
            }

            let old_l1_buckets = h.l1_buckets;
            let old_l0_offset = h.l0_offset;
            let old_l0_buckets = h.l0_buckets;
            let old_l1_offset = h.l1_offset;
            let new_l1_buckets = old_l1_buckets / 2;
            let bucket_sz = Self::bucket_size();
            let new_l1_bytes = new_l1_buckets as u64 * bucket_sz as u64;
            let new_l1_offset = self.pool.alloc(new_l1_bytes as usize, 64)?;

            log::info!("shrink: addr_capacity {} -> {}", old_l0_buckets, old_l1_buckets);

            let h = self.root_mut();
            h.interim_offset = old_l0_offset;
            h.interim_buckets = old_l0_buckets;
            h.l0_offset = old_l1_offset;
            h.l0_buckets = old_l1_buckets;
            h.l1_offset = new_l1_offset;
            h.l1_buckets = new_l1_buckets;
            h.level_size -= 1;
            h.addr_capacity = old_l1_buckets;
            h.total_capacity = old_l1_buckets + new_l1_buckets;
            h.count[0] = h.count[1];
            h.count[1] = 0;
            h.resize_state = ResizeState::Shrinking as u32;
            self.flush_root();
            self.pool.fence();
        }
        self.run_shrink_migration()
    }

    /// Reinsert every occupied item of `interim` (the old top level, at
    /// its pre-shrink address space) via the ordinary insert path, at
    /// the already-committed new capacities. Safe to call repeatedly
    /// for the same reason `run_expand_migration` is.
    pub(super) fn run_shrink_migration(&mut self) -> Result<()> {
        let bucket_sz = Self::bucket_size();
        let interim_offset = self.root().interim_offset;
        let interim_buckets = self.root().interim_buckets;

        for bucket in 0..interim_buckets {
            let base = layout::bucket_offset(interim_offset, bucket, bucket_sz);
            loop {
                let token = self.read_token(base);
                let slot = match (0..ASSOC_NUM).find(|&s| layout::get_bit(token, s)) {
                    Some(s) => s,
                    None => break,
                };
                let slot_off = layout::slot_offset(base, slot, KEY_LEN, VALUE_LEN);
                let key = self.pool.as_slice(slot_off, KEY_LEN).to_vec();
                let value = self.pool.as_slice(slot_off + KEY_LEN as u64, VALUE_LEN).to_vec();
                self.insert(&key, &value).map_err(|e| {
                    LevelHashError::CapacityViolation(format!("reinsert during shrink failed: {}", e))
                })?;
                self.clear_token_bit_at(base, slot);
            }
        }

        let interim_bytes = interim_buckets * bucket_sz as u64;
        self.pool.free(interim_offset, interim_bytes as usize);

        let h = self.root_mut();
        h.interim_offset = 0;
        h.interim_buckets = 0;
        h.resize_state = ResizeState::Idle as u32;
        self.flush_root();
        self.pool.fence();

        log::info!("shrink: completed, new addr_capacity={}", self.root().addr_capacity);
        Ok(())
    }
}
