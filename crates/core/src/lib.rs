//! Core caching subsystems for marquee.
//!
//! This crate provides:
//! - A request-deduplicating, TTL-aware response cache over SQLite and a
//!   filesystem body store
//! - An in-memory, LRU-bounded stream validity cache
//! - The keyed lock manager both caches serialize on
//! - Configuration structures and unified error types
//!
//! Network access is abstracted behind the [`fetch::Fetch`] and
//! [`fetch::Probe`] traits, implemented in `marquee-client`.

pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod lock;
pub mod maintenance;
pub mod streams;
pub mod ttl;

pub use cache::{BodyStore, CacheDb, CacheEntry, EngineOptions, EntryState, ResponseCache};
pub use config::AppConfig;
pub use error::Error;
pub use fetch::{ByteStream, Fetch, FetchedResponse, Probe};
pub use lock::KeyedLocks;
pub use streams::{StreamCache, StreamCacheConfig, StreamDescriptor};
