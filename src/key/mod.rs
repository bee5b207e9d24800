//! Request fingerprinting — deriving cache keys from request semantics.
//!
//! A key is `"{partition}_{digest}"` where the digest covers the method, the
//! full URL (query string included), and the raw body bytes, in that order.
//! Headers never take part, so per-call values such as auth tokens or
//! correlation ids do not split one resource across many entries.

use std::io;

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::http::{Body, Request};
use crate::transport::BoxFuture;

/// Errors produced while fingerprinting a request.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("failed to read request body: {0}")]
    Body(#[from] io::Error),

    #[error("{0}")]
    Custom(String),
}

/// A strategy for turning a request into a cache key.
///
/// Implementations may read the body, but must leave it readable for
/// whoever sends the request afterwards.
pub trait KeyGenerator: Send + Sync {
    /// Computes the cache key for `request`.
    fn key<'a>(&'a self, request: &'a mut Request) -> BoxFuture<'a, Result<String, KeyError>>;
}

/// The standard fingerprint: `partition` + SHA-256 of method, URL, and body.
///
/// Two generators with the same partition produce the same key for the same
/// method, URL, and body; different partitions never share keys.
///
/// # Examples
///
/// ```
/// use transcache::http::Request;
/// use transcache::key::{DefaultKeyGenerator, KeyGenerator};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let keys = DefaultKeyGenerator::new("tenant-a");
/// let mut req = Request::get("http://example.com/items").unwrap()
///     .header("Authorization", "Bearer one");
/// let key = keys.key(&mut req).await.unwrap();
/// assert!(key.starts_with("tenant-a_"));
/// # }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefaultKeyGenerator {
    partition: String,
}

impl DefaultKeyGenerator {
    pub fn new(partition: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
        }
    }

    pub fn partition(&self) -> &str {
        &self.partition
    }

    fn digest(&self, request: &Request, body: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(request.method().as_str().as_bytes());
        hasher.update(request.url().as_str().as_bytes());
        hasher.update(body);
        format!("{}_{}", self.partition, hex::encode(hasher.finalize()))
    }
}

impl KeyGenerator for DefaultKeyGenerator {
    fn key<'a>(&'a self, request: &'a mut Request) -> BoxFuture<'a, Result<String, KeyError>> {
        Box::pin(async move {
            if let Some(body) = request.body_ref().as_bytes() {
                return Ok(self.digest(request, body));
            }

            // Streamed body: drain it, hash it, and hand the bytes back.
            let body = request.take_body().collect().await?;
            let key = self.digest(request, &body);
            request.set_body(Body::Full(body));
            Ok(key)
        })
    }
}
