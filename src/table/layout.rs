//! Fixed-size PM structures: the table root header and the byte-offset
//! arithmetic for buckets, slots, and the trailing token word.
//!
//! Buckets are not represented as a generic `#[repr(C)]` struct the way
//! `toloco_warp_cache::shm::layout::Bucket` is, because their size
//! depends on the const generics `KEY_LEN`/`VALUE_LEN`/`ASSOC_NUM` and
//! Rust cannot express a compile-time size assertion over a type with
//! unresolved const parameters. Instead buckets are addressed the way
//! `toloco_warp_cache::shm::hashtable` addresses its slab: plain byte
//! offsets computed from runtime-held geometry, read/written through
//! `PmPool::as_slice`/`as_mut_slice`.

use crate::error::{LevelHashError, Result};

/// Magic recorded in the root header, independent of the pool header's
/// own magic, so a root can be distinguished from other structures a
/// pool might one day hold.
pub const ROOT_MAGIC: [u8; 8] = *b"LHROOT01";

pub const ROOT_VERSION: u32 = 1;

/// `resize_state` values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum ResizeState {
    Idle = 0,
    Expanding = 1,
    Shrinking = 2,
}

impl ResizeState {
    pub fn from_u32(v: u32) -> Self {
        match v {
            0 => ResizeState::Idle,
            1 => ResizeState::Expanding,
            2 => ResizeState::Shrinking,
            _ => ResizeState::Idle,
        }
    }
}

/// The root persistent object: everything needed to find and interpret
/// the rest of the table. Fields are grouped 8-byte-first, same
/// convention as `toloco_warp_cache::shm::layout::Header`.
#[repr(C)]
#[derive(Debug)]
pub struct RootHeader {
    pub magic: [u8; 8], // 0..8

    pub addr_capacity: u64,  // 8..16   = 2^level_size
    pub total_capacity: u64, // 16..24  = addr_capacity + addr_capacity/2
    pub count: [u64; 2],     // 24..40  items in L0, L1
    pub expand_time: u64,    // 40..48

    pub f_seed: u64, // 48..56
    pub s_seed: u64, // 56..64

    pub l0_offset: u64,  // 64..72
    pub l0_buckets: u64, // 72..80
    pub l1_offset: u64,  // 80..88
    pub l1_buckets: u64, // 88..96

    pub interim_offset: u64,  // 96..104  0 when resize_state == Idle
    pub interim_buckets: u64, // 104..112

    pub value_log_offset: u64,  // 112..120
    pub value_log_len: u64,     // 120..128
    pub value_log_current: u64, // 128..136

    pub insert_log_offset: u64,  // 136..144
    pub insert_log_len: u64,     // 144..152
    pub insert_log_current: u64, // 152..160

    pub level_size: u32,   // 160..164
    pub assoc_num: u32,    // 164..168
    pub key_len: u32,      // 168..172
    pub value_len: u32,    // 172..176
    pub resize_state: u32, // 176..180
    pub version: u32,      // 180..184

    pub _pad: [u8; 72], // 184..256
}

pub const ROOT_HEADER_SIZE: usize = 256;

const _: () = assert!(std::mem::size_of::<RootHeader>() == ROOT_HEADER_SIZE);

impl RootHeader {
    pub fn validate(&self, assoc_num: u32, key_len: u32, value_len: u32) -> Result<()> {
        if self.magic != ROOT_MAGIC {
            return Err(LevelHashError::Corrupt);
        }
        if self.version != ROOT_VERSION {
            return Err(LevelHashError::VersionMismatch {
                found: self.version,
                expected: ROOT_VERSION,
            });
        }
        if self.assoc_num != assoc_num || self.key_len != key_len || self.value_len != value_len {
            return Err(LevelHashError::CapacityViolation(format!(
                "pool geometry (assoc_num={}, key_len={}, value_len={}) does not match table type (assoc_num={}, key_len={}, value_len={})",
                self.assoc_num, self.key_len, self.value_len, assoc_num, key_len, value_len
            )));
        }
        Ok(())
    }

    pub fn resize_state(&self) -> ResizeState {
        ResizeState::from_u32(self.resize_state)
    }
}

/// Byte size of one bucket: `ASSOC_NUM` slots of `KEY_LEN + VALUE_LEN`
/// bytes, followed by one `u32` token word.
#[inline]
pub fn bucket_size(assoc_num: usize, key_len: usize, value_len: usize) -> usize {
    assoc_num * (key_len + value_len) + std::mem::size_of::<u32>()
}

#[inline]
pub fn bucket_offset(level_base: u64, bucket_idx: u64, bucket_size: usize) -> u64 {
    level_base + bucket_idx * bucket_size as u64
}

#[inline]
pub fn slot_offset(bucket_base: u64, slot_idx: usize, key_len: usize, value_len: usize) -> u64 {
    bucket_base + (slot_idx * (key_len + value_len)) as u64
}

#[inline]
pub fn token_offset(bucket_base: u64, assoc_num: usize, key_len: usize, value_len: usize) -> u64 {
    bucket_base + (assoc_num * (key_len + value_len)) as u64
}

#[inline]
pub fn get_bit(token: u32, bit: usize) -> bool {
    (token >> bit) & 1 == 1
}

#[inline]
pub fn set_bit(token: u32, bit: usize, value: bool) -> u32 {
    if value {
        token | (1 << bit)
    } else {
        token & !(1 << bit)
    }
}
