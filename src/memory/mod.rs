//! # Memory Tiering
//!
//! Fast, TTL-bounded LRU cache in front of a capacity-bounded persistent
//! store. Promotion to the persistent tier is decided per store call by an
//! importance policy.
//!
//! ## Module Organization
//!
//! - `payload` - Tagged `Payload` enum, JSON + LZ4 encoding, BLAKE3 checksums
//! - `cache` - LRU cache with lazy TTL expiry
//! - `store` - `StorageBackend` trait, in-memory and SQLite backends
//! - `importance` - `ImportancePolicy` trait and the default weighted policy
//! - `manager` - `MemoryTieringManager` and the periodic cleanup task

pub mod cache;
pub mod importance;
pub mod manager;
pub mod payload;
pub mod store;

pub use importance::{AccessStats, DefaultImportance, ImportancePolicy};
pub use manager::{
    spawn_cleanup_task, CacheStats, CleanupReport, MemoryConfig, MemoryTieringManager,
    StoreOutcome, Tier,
};
pub use payload::{Payload, PayloadKind};
pub use store::{InMemoryStore, SqliteStore, StorageBackend, StorageEntry};
