use thiserror::Error;

/// Errors produced by the level-hash engine and its PM pool backend.
#[derive(Error, Debug)]
pub enum LevelHashError {
    /// The key was not present in the table.
    #[error("key not found")]
    NotFound,

    /// Insert failed because all four candidate buckets (and every
    /// movement/promotion fallback) were full. The caller is expected to
    /// call `expand` and retry.
    #[error("no room for key; call expand and retry")]
    NoRoom,

    /// An item could not be placed while rehashing during expand/shrink.
    /// Indicates corruption or a mis-tuned `ASSOC_NUM`.
    #[error("capacity invariant violated during resize: {0}")]
    CapacityViolation(String),

    /// `shrink` was called above the 0.4 load-factor gate.
    #[error("shrink precondition not met: {count} items over {limit} allowed")]
    ShrinkNotAllowed { count: u64, limit: u64 },

    /// The PM pool allocator could not satisfy an allocation.
    #[error("PM pool allocation failed: {0}")]
    AllocatorFailure(String),

    /// A key or value exceeded its fixed-width slot.
    #[error("key/value of length {actual} exceeds fixed width {max}")]
    TooLarge { actual: usize, max: usize },

    /// The pool file exists but does not carry the expected magic bytes.
    #[error("PM pool header is corrupt: bad magic")]
    Corrupt,

    /// The pool was written by an incompatible version of this crate.
    #[error("PM pool version mismatch: found {found}, expected {expected}")]
    VersionMismatch { found: u32, expected: u32 },

    /// Underlying I/O error opening/growing/flushing the backing file.
    #[error("PM pool I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LevelHashError>;
