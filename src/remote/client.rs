//! Capability interface for the remote object store.
//!
//! The core depends only on this contract, which keeps workers and the
//! predictor testable against in-memory doubles.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("invalid byte range for {0}")]
    InvalidRange(String),

    #[error("throttled: {0}")]
    Throttled(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("attempt timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl RemoteError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RemoteError::Throttled(_) | RemoteError::Network(_) | RemoteError::Timeout(_)
        )
    }
}

/// One object surfaced by a listing.
#[derive(Debug, Clone)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
}

/// Result of a LIST call, in the store's key order.
#[derive(Debug, Clone, Default)]
pub struct Listing {
    pub objects: Vec<ObjectInfo>,
    /// True when the store capped the result at `max_keys`.
    pub truncated: bool,
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch the inclusive byte range `[offset, offset + len - 1]` of `key`.
    /// Fewer bytes than requested means the object ended inside the range.
    async fn get_range(&self, key: &str, offset: u64, len: u64) -> Result<Bytes, RemoteError>;

    /// List up to `max_keys` objects under the configured prefix, with the
    /// prefix stripped from returned keys.
    async fn list(&self, max_keys: usize) -> Result<Listing, RemoteError>;
}

/// Compose the full store key from an optional prefix.
pub fn full_key(prefix: Option<&str>, key: &str) -> String {
    match prefix {
        Some(p) if !p.is_empty() => format!("{p}/{key}"),
        _ => key.to_string(),
    }
}
