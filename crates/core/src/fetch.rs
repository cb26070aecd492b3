//! Upstream fetch and probe capabilities.
//!
//! The cache core never talks to the network itself. It consumes these two
//! traits, implemented over a real HTTP client in `marquee-client` and over
//! in-test fakes in the test suites.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;

use crate::Error;

/// Chunked response body. Chunks arrive in order; the stream owns any
/// underlying connection and releases it on drop.
pub type ByteStream = BoxStream<'static, Result<Bytes, Error>>;

/// A fetched upstream response with its body still on the wire.
pub struct FetchedResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers, lowercased names.
    pub headers: BTreeMap<String, String>,
    /// Response body as an in-order chunk stream.
    pub body: ByteStream,
}

impl std::fmt::Debug for FetchedResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchedResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Full-body fetch capability used to populate cache entries.
#[async_trait]
pub trait Fetch: Send + Sync {
    /// Issue a GET for `url` with `headers` and return the response with a
    /// streaming body. Transport failures map to [`Error::Fetch`].
    async fn fetch(&self, url: &str, headers: &BTreeMap<String, String>) -> Result<FetchedResponse, Error>;
}

/// Lightweight existence probe used by the stream validity cache.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Issue a HEAD-style request with a short timeout, following
    /// redirects, and return the final status code.
    async fn probe(&self, url: &str, headers: &BTreeMap<String, String>) -> Result<u16, Error>;
}
