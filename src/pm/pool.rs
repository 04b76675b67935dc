//! Persistent-memory pool abstraction.
//!
//! `PmPool` is the crate's boundary to the backing store: everything
//! above it (table layout, log rings) addresses memory as pool-relative
//! `u64` offsets rather than raw pointers, so that a pool can be closed
//! and reopened at a different base address without invalidating any
//! on-disk structure. `MmapPool` is the only implementation shipped,
//! built the way `toloco_warp_cache::shm::ShmRegion` builds its mapping:
//! a fixed header at offset 0, validated on open, with the remainder of
//! the file treated as a flat arena.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use memmap2::MmapMut;

use crate::error::{LevelHashError, Result};
use crate::pm::flush;
use crate::pm::layout::{PoolHeader, HEADER_SIZE, MAGIC, VERSION};

/// A block of persistent memory addressed by pool-relative offsets.
///
/// Implementors need not support freeing individual allocations: the
/// reference allocator this crate is modeled on (`pflush.c`'s `pfree`)
/// never reclaims memory either, since a level-hash table only ever
/// grows its backing arena at `expand` time and the old arrays are
/// retired, not freed back for reuse. `free` is therefore allowed to be
/// a no-op; callers must not depend on freed bytes becoming available
/// again.
pub trait PmPool {
    /// Allocate `size` bytes aligned to `align` (a power of two) and
    /// return their pool-relative offset. The returned region is zeroed.
    fn alloc(&mut self, size: usize, align: usize) -> Result<u64>;

    /// Release a previously allocated region. May be a no-op.
    fn free(&mut self, offset: u64, size: usize);

    /// Borrow `len` bytes starting at `offset`.
    fn as_slice(&self, offset: u64, len: usize) -> &[u8];

    /// Mutably borrow `len` bytes starting at `offset`.
    fn as_mut_slice(&mut self, offset: u64, len: usize) -> &mut [u8];

    /// Raw pointer to pool-relative `offset`, for callers that need to
    /// build a typed reference over it.
    fn as_ptr(&self, offset: u64) -> *const u8;

    /// Mutable raw pointer to pool-relative `offset`.
    fn as_mut_ptr(&mut self, offset: u64) -> *mut u8;

    /// Flush `len` bytes at `offset` out of the CPU cache hierarchy and
    /// down to the backing medium.
    fn flush(&self, offset: u64, len: usize);

    /// Block until every flush issued so far on this thread is globally
    /// visible. Call once after a batch of `flush` calls.
    fn fence(&self);

    /// The pool-relative offset of the table's root header, or `None`
    /// if the pool was just created and no table has been installed
    /// yet.
    fn root_offset(&self) -> Option<u64>;

    /// Record the table's root header offset for future `open` calls.
    fn set_root_offset(&mut self, offset: u64);

    /// Total size of the pool's arena in bytes, header excluded.
    fn capacity(&self) -> u64;
}

/// `PmPool` backed by a memory-mapped file, following the
/// create/open/create_or_open split used for `ShmRegion`.
pub struct MmapPool {
    mmap: MmapMut,
    path: PathBuf,
    file: File,
}

fn align_up(offset: u64, align: usize) -> u64 {
    let align = align as u64;
    (offset + align - 1) & !(align - 1)
}

impl MmapPool {
    /// Create a fresh pool file of `arena_bytes` capacity (excluding the
    /// header) at `path`, truncating any existing file.
    pub fn create<P: AsRef<Path>>(path: P, arena_bytes: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let total = HEADER_SIZE as u64 + arena_bytes;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        file.set_len(total)?;

        let mut mmap = unsafe { MmapMut::map_mut(&file)? };
        mmap.fill(0);

        {
            let header = unsafe { &mut *(mmap.as_mut_ptr() as *mut PoolHeader) };
            header.magic = MAGIC;
            header.version = VERSION;
            header.bump_offset = HEADER_SIZE as u64;
            header.root_offset = 0;
        }
        mmap.flush()?;

        log::info!(
            "created PM pool at {:?} ({} bytes arena)",
            path,
            arena_bytes
        );

        Ok(MmapPool { mmap, path, file })
    }

    /// Open an existing pool file, validating its header.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let mmap = unsafe { MmapMut::map_mut(&file)? };

        {
            let header = unsafe { &*(mmap.as_ptr() as *const PoolHeader) };
            header.validate()?;
        }

        log::info!("opened PM pool at {:?}", path);

        Ok(MmapPool { mmap, path, file })
    }

    /// Open `path` if it already holds a valid header, otherwise create
    /// a fresh pool of `arena_bytes` there.
    pub fn create_or_open<P: AsRef<Path>>(path: P, arena_bytes: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            match Self::open(&path) {
                Ok(pool) => return Ok(pool),
                Err(e) => {
                    log::warn!("existing pool at {:?} failed validation ({}), recreating", path, e);
                }
            }
        }
        Self::create(path, arena_bytes)
    }

    fn header(&self) -> &PoolHeader {
        unsafe { &*(self.mmap.as_ptr() as *const PoolHeader) }
    }

    fn header_mut(&mut self) -> &mut PoolHeader {
        unsafe { &mut *(self.mmap.as_mut_ptr() as *mut PoolHeader) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PmPool for MmapPool {
    fn alloc(&mut self, size: usize, align: usize) -> Result<u64> {
        let total_len = self.mmap.len() as u64;
        let current = self.header().bump_offset;
        let start = align_up(current, align);
        let end = start + size as u64;
        if end > total_len {
            return Err(LevelHashError::AllocatorFailure(format!(
                "requested {} bytes at align {}, only {} bytes remain",
                size,
                align,
                total_len.saturating_sub(current)
            )));
        }
        self.header_mut().bump_offset = end;
        self.as_mut_slice(start, size).iter_mut().for_each(|b| *b = 0);
        Ok(start)
    }

    fn free(&mut self, _offset: u64, _size: usize) {
        // Intentionally a no-op; see the trait-level documentation.
    }

    fn as_slice(&self, offset: u64, len: usize) -> &[u8] {
        let start = offset as usize;
        &self.mmap[start..start + len]
    }

    fn as_mut_slice(&mut self, offset: u64, len: usize) -> &mut [u8] {
        let start = offset as usize;
        &mut self.mmap[start..start + len]
    }

    fn as_ptr(&self, offset: u64) -> *const u8 {
        unsafe { self.mmap.as_ptr().add(offset as usize) }
    }

    fn as_mut_ptr(&mut self, offset: u64) -> *mut u8 {
        unsafe { self.mmap.as_mut_ptr().add(offset as usize) }
    }

    fn flush(&self, offset: u64, len: usize) {
        unsafe { flush::flush_range(self.as_ptr(offset), len) };
    }

    fn fence(&self) {
        flush::store_fence();
    }

    fn root_offset(&self) -> Option<u64> {
        let off = self.header().root_offset;
        if off == 0 {
            None
        } else {
            Some(off)
        }
    }

    fn set_root_offset(&mut self, offset: u64) {
        self.header_mut().root_offset = offset;
        self.flush(0, HEADER_SIZE);
        self.fence();
    }

    fn capacity(&self) -> u64 {
        self.mmap.len() as u64 - HEADER_SIZE as u64
    }
}

impl Drop for MmapPool {
    fn drop(&mut self) {
        if let Err(e) = self.mmap.flush() {
            log::warn!("failed to flush PM pool {:?} on drop: {}", self.path, e);
        }
        let _ = &self.file;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_open_roundtrips_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.bin");
        {
            let mut pool = MmapPool::create(&path, 4096).unwrap();
            pool.set_root_offset(123);
        }
        let pool = MmapPool::open(&path).unwrap();
        assert_eq!(pool.root_offset(), Some(123));
    }

    #[test]
    fn alloc_bumps_and_zeroes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.bin");
        let mut pool = MmapPool::create(&path, 4096).unwrap();
        let a = pool.alloc(32, 8).unwrap();
        let b = pool.alloc(32, 8).unwrap();
        assert_ne!(a, b);
        assert!(pool.as_slice(a, 32).iter().all(|&b| b == 0));
    }

    #[test]
    fn alloc_beyond_capacity_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.bin");
        let mut pool = MmapPool::create(&path, 64).unwrap();
        assert!(pool.alloc(1024, 8).is_err());
    }

    #[test]
    fn bad_magic_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.bin");
        std::fs::write(&path, vec![0u8; 4096]).unwrap();
        let err = MmapPool::open(&path).unwrap_err();
        matches!(err, LevelHashError::Corrupt);
    }
}
