//! HTTP client for marquee.
//!
//! This crate provides the concrete fetch/probe pipeline behind the cache
//! core's capability traits: a reqwest client with canonicalized URLs and
//! an optional upstream allowlist.

pub mod fetch;

pub use fetch::{HttpClient, HttpClientConfig, UrlError, UrlGuard, canonicalize};
