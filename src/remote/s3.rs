//! S3-backed implementation of the remote store contract.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::Client;
use bytes::Bytes;
use tracing::{debug, trace};

use crate::remote::client::{full_key, Listing, ObjectInfo, RemoteError, RemoteStore};

/// Object store client bound to one bucket and optional key prefix.
pub struct S3Store {
    client: Client,
    bucket: String,
    prefix: Option<String>,
}

impl S3Store {
    /// Build a client for the given bucket/region.
    pub async fn connect(bucket: String, region: String, prefix: Option<String>) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region))
            .load()
            .await;

        debug!(bucket = %bucket, prefix = ?prefix, "S3 client ready");
        Self {
            client: Client::new(&config),
            bucket,
            prefix,
        }
    }
}

/// Map an SDK failure onto the store error taxonomy by its error text, the
/// same buckets S3 reports via error codes.
fn classify(context: &str, err: impl std::fmt::Display) -> RemoteError {
    let text = err.to_string();
    let lower = text.to_lowercase();

    if lower.contains("nosuchkey") || lower.contains("nosuchbucket") || lower.contains("404") {
        RemoteError::NotFound(context.to_string())
    } else if lower.contains("accessdenied") || lower.contains("403") {
        RemoteError::AccessDenied(context.to_string())
    } else if lower.contains("invalidrange") || lower.contains("416") {
        RemoteError::InvalidRange(context.to_string())
    } else if lower.contains("slowdown") || lower.contains("toomanyrequests") || lower.contains("throttl") {
        RemoteError::Throttled(text)
    } else {
        RemoteError::Network(text)
    }
}

#[async_trait]
impl RemoteStore for S3Store {
    async fn get_range(&self, key: &str, offset: u64, len: u64) -> Result<Bytes, RemoteError> {
        let object_key = full_key(self.prefix.as_deref(), key);
        let range = format!("bytes={}-{}", offset, offset + len.max(1) - 1);

        trace!(key = %object_key, %range, "GetObject");

        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .range(range)
            .send()
            .await
            .map_err(|e| classify(&object_key, DisplayErrorContext(&e)))?;

        let body = resp
            .body
            .collect()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        Ok(body.into_bytes())
    }

    async fn list(&self, max_keys: usize) -> Result<Listing, RemoteError> {
        let mut req = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .max_keys(max_keys as i32);

        let strip = self.prefix.as_ref().map(|p| format!("{p}/"));
        if let Some(ref prefix) = strip {
            req = req.prefix(prefix);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| classify(&self.bucket, DisplayErrorContext(&e)))?;

        let truncated = resp.is_truncated() == Some(true);
        let mut objects = Vec::new();

        for obj in resp.contents() {
            let Some(key) = obj.key() else { continue };
            // Skip directory markers.
            if key.is_empty() || key.ends_with('/') {
                continue;
            }

            let relative = match strip.as_deref() {
                Some(prefix) => key.strip_prefix(prefix).unwrap_or(key),
                None => key,
            };

            objects.push(ObjectInfo {
                key: relative.to_string(),
                size: obj.size().unwrap_or(0).max(0) as u64,
            });
        }

        Ok(Listing { objects, truncated })
    }
}
