//! Dual-hash, two-choice placement policy and C-string-style key
//! comparison.

use crate::hashfn::{HashPair, SeedHash};

/// Candidate bucket in the first half of a level's address space.
///
/// `half_capacity` is the level's address capacity divided by two
/// (i.e. `C/2` in the spec's notation): both `f_idx` and `s_idx` are
/// taken modulo this value so that, together, they cover the whole
/// level with `f_idx` in `[0, half_capacity)` and `s_idx` in
/// `[half_capacity, 2*half_capacity)`.
#[inline]
pub fn f_idx(hash: u64, half_capacity: u64) -> u64 {
    hash % half_capacity
}

/// Candidate bucket in the second half of a level's address space.
#[inline]
pub fn s_idx(hash: u64, half_capacity: u64) -> u64 {
    hash % half_capacity + half_capacity
}

/// The pair of candidate bucket indices for `key` at a level whose
/// address capacity is `capacity` (so `half_capacity = capacity / 2`).
pub fn candidates(hashes: &HashPair, key: &[u8], capacity: u64) -> (u64, u64) {
    let half = capacity / 2;
    let h1 = hashes.f.hash(key);
    let h2 = hashes.s.hash(key);
    (f_idx(h1, half), s_idx(h2, half))
}

/// Length of the NUL-terminated prefix of a fixed-width key buffer,
/// i.e. the logical key length ignoring trailing pad bytes. Returns
/// the full buffer length if no NUL byte is present.
#[inline]
pub fn c_str_len(buf: &[u8]) -> usize {
    buf.iter().position(|&b| b == 0).unwrap_or(buf.len())
}

/// Compare two fixed-width key buffers as C-style NUL-terminated byte
/// strings: only the bytes up to (and not including) the first NUL in
/// either buffer are significant.
#[inline]
pub fn key_eq(a: &[u8], b: &[u8]) -> bool {
    let la = c_str_len(a);
    let lb = c_str_len(b);
    la == lb && a[..la] == b[..lb]
}

/// True if `key`'s logical (NUL-terminated) length fits within
/// `key_len` bytes, leaving room for at least the terminator when the
/// caller always NUL-pads (the caller is responsible for the padding
/// itself; this only bounds the content).
#[inline]
pub fn fits_width(len: usize, width: usize) -> bool {
    len < width
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidates_split_the_address_space() {
        let hashes = HashPair::new(1, 2);
        let (f, s) = candidates(&hashes, b"some-key", 16);
        assert!(f < 8);
        assert!((8..16).contains(&s));
    }

    #[test]
    fn key_eq_ignores_trailing_padding() {
        let mut a = [0u8; 16];
        let mut b = [0u8; 16];
        a[..5].copy_from_slice(b"hello");
        b[..5].copy_from_slice(b"hello");
        b[10] = 0xFF; // garbage past the NUL terminator
        assert!(key_eq(&a, &b));
    }

    #[test]
    fn key_eq_distinguishes_different_keys() {
        let mut a = [0u8; 16];
        let mut b = [0u8; 16];
        a[..3].copy_from_slice(b"foo");
        b[..3].copy_from_slice(b"bar");
        assert!(!key_eq(&a, &b));
    }
}
