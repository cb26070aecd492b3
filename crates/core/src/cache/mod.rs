//! SQLite-backed response cache with request deduplication.
//!
//! This module provides a persistent, fingerprint-addressed proxy cache
//! over an arbitrary fetch capability. It supports:
//!
//! - SHA-256 request fingerprinting over (url, headers)
//! - Automatic schema migrations, WAL mode for concurrent access
//! - At-most-one concurrent fetch per fingerprint
//! - TTL-driven refresh and size-capped eviction

pub mod connection;
pub mod engine;
pub mod entries;
pub mod hash;
pub mod migrations;
pub mod storage;

pub use connection::CacheDb;
pub use engine::{EngineOptions, ResponseCache};
pub use entries::{CacheEntry, EntryState};
pub use storage::BodyStore;
