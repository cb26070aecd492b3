//! Request fingerprinting.
//!
//! A fingerprint identifies one distinct (url, headers) fetch. Headers are
//! kept in a `BTreeMap` so their serialization is deterministic regardless
//! of insertion order.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

/// Serialize a header map in canonical (key-sorted) JSON form.
///
/// This exact form is also what gets persisted on the cache entry, so a
/// refresh replays the same headers the fingerprint was derived from.
pub fn canonical_headers(headers: &BTreeMap<String, String>) -> String {
    serde_json::to_string(headers).unwrap_or_else(|_| "{}".to_string())
}

/// Compute the fingerprint for a request URL plus headers.
pub fn fingerprint(url: &str, headers: &BTreeMap<String, String>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hasher.update(b"\n");
    hasher.update(canonical_headers(headers).as_bytes());
    hex::encode(hasher.finalize())
}
