//! The two independent hash functions `F_HASH`/`S_HASH` used to derive a
//! key's candidate buckets in each level.
//!
//! The reference implementation keeps two seeds and re-seeds a hash
//! function per call. We follow the teacher's lead of defaulting to
//! `fxhash` for short keys, but wrap it so a seed can be mixed in: a
//! single `FxBuildHasher` has no notion of a runtime seed, so we fold
//! the seed into the byte stream being hashed instead of the hasher
//! state.

use fxhash::FxHasher64;
use std::hash::Hasher;

/// A seedable 64-bit hash function over raw bytes.
///
/// `LevelHashTable` holds two instances, one per candidate-index
/// function (`F_IDX`/`S_IDX`), each with its own seed so that a key
/// colliding in one level's first bucket does not also collide in its
/// second.
pub trait SeedHash {
    fn hash(&self, bytes: &[u8]) -> u64;
}

/// Default `SeedHash` built on `fxhash::FxHasher64`, seeded by writing
/// the seed into the hasher state before the key bytes.
#[derive(Clone, Copy, Debug)]
pub struct FxSeedHash {
    seed: u64,
}

impl FxSeedHash {
    pub fn new(seed: u64) -> Self {
        FxSeedHash { seed }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl SeedHash for FxSeedHash {
    #[inline]
    fn hash(&self, bytes: &[u8]) -> u64 {
        let mut state = FxHasher64::default();
        state.write_u64(self.seed);
        state.write(bytes);
        state.finish()
    }
}

/// The pair of seeded hashers a table needs: one for `F_IDX`, one for
/// `S_IDX`.
#[derive(Clone, Copy, Debug)]
pub struct HashPair {
    pub f: FxSeedHash,
    pub s: FxSeedHash,
}

impl HashPair {
    pub fn new(f_seed: u64, s_seed: u64) -> Self {
        HashPair {
            f: FxSeedHash::new(f_seed),
            s: FxSeedHash::new(s_seed),
        }
    }

    /// Seeds used when a `TableConfig` supplies none: fixed constants so
    /// that two processes opening the same pool without overriding seeds
    /// still agree on bucket placement.
    pub fn default_seeds() -> (u64, u64) {
        (0x9E3779B97F4A7C15, 0xC2B2AE3D27D4EB4F)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinct_seeds_usually_disagree() {
        let pair = HashPair::new(1, 2);
        let key = b"a-sample-key";
        assert_ne!(pair.f.hash(key), pair.s.hash(key));
    }

    #[test]
    fn same_seed_same_hash() {
        let a = FxSeedHash::new(42);
        let b = FxSeedHash::new(42);
        assert_eq!(a.hash(b"x"), b.hash(b"x"));
    }
}
