//! On-disk header for a PM pool file.
//!
//! Laid out the way `toloco_warp_cache::shm::layout` lays out its
//! `Header`: u64 fields first to avoid implicit padding, explicit
//! `_pad` bytes to round out to a fixed size, and a compile-time
//! assertion pinning `size_of::<PoolHeader>()`.

use crate::error::{LevelHashError, Result};

/// Magic bytes stamped at the start of every pool file.
pub const MAGIC: [u8; 8] = *b"LVLHASH1";

/// Current on-disk format version.
pub const VERSION: u32 = 1;

/// Size of the fixed header at the start of the pool file.
pub const HEADER_SIZE: usize = 64;

/// Header lives at offset 0 of the mapping.
#[repr(C)]
#[derive(Debug)]
pub struct PoolHeader {
    pub magic: [u8; 8],       // 0..8
    pub bump_offset: u64,     // 8..16  next free byte in the arena
    pub root_offset: u64,     // 16..24 offset of the table's RootHeader, 0 until set
    pub version: u32,         // 24..28
    pub _pad: [u8; 36],       // 28..64
}

const _: () = assert!(std::mem::size_of::<PoolHeader>() == HEADER_SIZE);

impl PoolHeader {
    pub fn validate(&self) -> Result<()> {
        if self.magic != MAGIC {
            return Err(LevelHashError::Corrupt);
        }
        if self.version != VERSION {
            return Err(LevelHashError::VersionMismatch {
                found: self.version,
                expected: VERSION,
            });
        }
        Ok(())
    }
}
