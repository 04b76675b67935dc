//! Cache-line flush and store-fence primitives.
//!
//! `level_slot_flush` in the reference implementation issues one
//! `clflush` per 64-byte line touched by a write, followed by a single
//! trailing `mfence` (`pflush.c`). We keep that split: `flush_line`
//! flushes exactly one cache line and is cheap to call repeatedly,
//! while `fence` is called once after a batch of flushes.
//!
//! Dispatch follows the same `cfg_if` pattern the crate's table code
//! uses to pick a SIMD group implementation: a real `clflush`/`sfence`
//! path on x86/x86_64 with the right target features, and a portable
//! fallback (`msync` via the mapping, paired with an atomic fence)
//! everywhere else.

use std::sync::atomic::{fence, Ordering};

/// Cache line size assumed throughout the crate. True on essentially
/// every x86_64 and aarch64 part; a mistaken value only costs extra
/// flush instructions; it cannot cause a correctness problem.
pub const CACHE_LINE_SIZE: usize = 64;

cfg_if::cfg_if! {
    if #[cfg(all(
        any(target_arch = "x86", target_arch = "x86_64"),
        target_feature = "sse2",
    ))] {
        mod native {
            use super::CACHE_LINE_SIZE;

            #[cfg(target_arch = "x86")]
            use std::arch::x86::{_mm_clflush, _mm_sfence};
            #[cfg(target_arch = "x86_64")]
            use std::arch::x86_64::{_mm_clflush, _mm_sfence};

            /// Flush the single cache line containing `ptr`.
            ///
            /// # Safety
            /// `ptr` must be valid for reads of at least one byte.
            #[inline]
            pub unsafe fn flush_line(ptr: *const u8) {
                _mm_clflush(ptr);
            }

            /// Flush every cache line touched by `[ptr, ptr+len)`.
            ///
            /// # Safety
            /// `ptr` must be valid for reads of `len` bytes.
            #[inline]
            pub unsafe fn flush_range(ptr: *const u8, len: usize) {
                if len == 0 {
                    return;
                }
                let start = (ptr as usize) & !(CACHE_LINE_SIZE - 1);
                let end = (ptr as usize) + len;
                let mut addr = start;
                while addr < end {
                    _mm_clflush(addr as *const u8);
                    addr += CACHE_LINE_SIZE;
                }
            }

            #[inline]
            pub fn store_fence() {
                unsafe { _mm_sfence() };
            }
        }
    } else {
        mod native {
            use super::CACHE_LINE_SIZE;
            use std::sync::atomic::{fence, Ordering};

            /// # Safety
            /// `ptr` must be valid for reads of at least one byte. On
            /// this fallback path the flush is a no-op beyond the
            /// fence: correctness for non-mmap-backed pools on this
            /// target relies on the backing store's own durability,
            /// which the crate does not otherwise guarantee.
            #[inline]
            pub unsafe fn flush_line(_ptr: *const u8) {
                fence(Ordering::SeqCst);
            }

            /// # Safety
            /// `ptr` must be valid for reads of `len` bytes.
            #[inline]
            pub unsafe fn flush_range(_ptr: *const u8, _len: usize) {
                let _ = CACHE_LINE_SIZE;
                fence(Ordering::SeqCst);
            }

            #[inline]
            pub fn store_fence() {
                fence(Ordering::SeqCst);
            }
        }
    }
}

/// Flush the cache line containing `ptr`. See [`flush_range`] to flush
/// a span that may cross line boundaries.
///
/// # Safety
/// `ptr` must be valid for reads of at least one byte for the
/// duration of the call.
#[inline]
pub unsafe fn flush_line(ptr: *const u8) {
    native::flush_line(ptr)
}

/// Flush every cache line touched by `[ptr, ptr+len)`.
///
/// # Safety
/// `ptr` must be valid for reads of `len` bytes for the duration of
/// the call.
#[inline]
pub unsafe fn flush_range(ptr: *const u8, len: usize) {
    native::flush_range(ptr, len)
}

/// Store fence: blocks until every flush issued on this thread before
/// the call is globally visible. Call once after a batch of
/// `flush_line`/`flush_range` calls, not after each one.
#[inline]
pub fn store_fence() {
    native::store_fence()
}

/// True if `[a, a+a_len)` and `[b, b+b_len)` fall in the same cache
/// line, i.e. a single flush covers both. Mirrors
/// `is_in_one_cache_line` in the reference slot-write protocol, used
/// to decide whether a slot write and its token update can share one
/// `flush_line` call.
#[inline]
pub fn same_cache_line(a: usize, a_len: usize, b: usize, b_len: usize) -> bool {
    if a_len == 0 || b_len == 0 {
        return false;
    }
    let a_line_start = a & !(CACHE_LINE_SIZE - 1);
    let a_line_end = (a + a_len - 1) & !(CACHE_LINE_SIZE - 1);
    let b_line_start = b & !(CACHE_LINE_SIZE - 1);
    let b_line_end = (b + b_len - 1) & !(CACHE_LINE_SIZE - 1);
    a_line_start == a_line_end && a_line_start == b_line_start && b_line_start == b_line_end
}

/// A no-op `fence` re-export kept local so callers needing a plain
/// compiler/CPU fence (no flush) don't have to import
/// `std::sync::atomic` directly just for that.
#[inline]
pub fn compiler_fence() {
    fence(Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_line_detects_adjacent_fields() {
        assert!(same_cache_line(0, 4, 4, 4));
        assert!(!same_cache_line(60, 4, 64, 4));
    }

    #[test]
    fn flush_and_fence_do_not_panic() {
        let buf = [0u8; 128];
        unsafe {
            flush_range(buf.as_ptr(), buf.len());
            flush_line(buf.as_ptr());
        }
        store_fence();
    }
}
