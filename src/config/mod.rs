use std::path::{Path, PathBuf};

/// Default number of entries a `ValueLog`/`InsertLog` ring holds before
/// wrapping, matching the reference implementation's default. Only one
/// entry is ever live at a time under the single-writer model (§5); the
/// ring exists so a long-running table doesn't keep rewriting the same
/// handful of cache lines for its log slots.
pub const DEFAULT_LOG_LEN: usize = 1024;

/// Default number of buckets per level when a pool is created fresh.
/// Expressed as `2^DEFAULT_LEVEL_EXP`.
pub const DEFAULT_LEVEL_EXP: u8 = 10;

/// Configuration for opening or creating a level-hash table.
///
/// Covers the knobs that govern the on-PM layout: the backing pool
/// file, its initial geometry, and the hash seeds used to derive
/// `F_IDX`/`S_IDX`. Fixed-width parameters (`KEY_LEN`, `VALUE_LEN`,
/// `ASSOC_NUM`) are not part of this struct because they are compiled
/// in as const generics on `LevelHashTable` rather than chosen at
/// runtime.
#[derive(Clone, Debug)]
pub struct TableConfig {
    pool_path: PathBuf,
    level_exp: u8,
    log_len: usize,
    seeds: Option<(u64, u64)>,
}

impl TableConfig {
    /// Start a config pointed at `pool_path`, with defaults for
    /// everything else.
    pub fn new<P: AsRef<Path>>(pool_path: P) -> Self {
        TableConfig {
            pool_path: pool_path.as_ref().to_path_buf(),
            level_exp: DEFAULT_LEVEL_EXP,
            log_len: DEFAULT_LOG_LEN,
            seeds: None,
        }
    }

    /// Set the initial level size as a power of two, i.e. a fresh pool
    /// starts with `2^level_exp` buckets in its top level.
    pub fn with_level_exp(mut self, level_exp: u8) -> Self {
        self.level_exp = level_exp;
        self
    }

    /// Set the ring length shared by the value log and the insert log.
    pub fn with_log_len(mut self, log_len: usize) -> Self {
        assert!(log_len > 0, "log_len must be non-zero");
        self.log_len = log_len;
        self
    }

    /// Inject fixed hash seeds instead of the engine's defaults. Mainly
    /// useful for deterministic tests, where a random seed would make a
    /// recorded bucket layout unreproducible.
    pub fn with_seeds(mut self, f_seed: u64, s_seed: u64) -> Self {
        self.seeds = Some((f_seed, s_seed));
        self
    }

    pub fn pool_path(&self) -> &Path {
        &self.pool_path
    }

    pub fn level_exp(&self) -> u8 {
        self.level_exp
    }

    pub fn log_len(&self) -> usize {
        self.log_len
    }

    pub fn seeds(&self) -> Option<(u64, u64)> {
        self.seeds
    }
}
