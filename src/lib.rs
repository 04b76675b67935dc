//! A write-optimized, crash-consistent two-level hash index for
//! byte-addressable persistent memory.
//!
//! The engine ([`table::LevelHashTable`]) stores fixed-width `(key,
//! value)` records across two bucket arrays and provides point lookup,
//! insert, update, delete, and in-place expand/shrink, with a
//! cache-line-aware write protocol (see the `pm` and `redolog` modules)
//! that keeps the table consistent across a crash without whole-table
//! logging.

/// Errors produced by the engine and its PM pool backend.
pub mod error;
/// Seedable, two-choice hash functions used to derive a key's
/// candidate buckets.
pub mod hashfn;
/// Runtime configuration for opening or creating a table.
pub mod config;
/// Persistent-memory pool abstraction: allocation, flush, fence.
pub mod pm;
/// The two small redo logs used for crash-atomic update and movement.
pub mod redolog;
/// The hash engine: placement, lookup, insert, update, delete,
/// expand, shrink.
pub mod table;

pub use config::TableConfig;
pub use error::{LevelHashError, Result};
pub use pm::{MmapPool, PmPool};
pub use table::LevelHashTable;
