//! Key-value backends holding encoded responses.
//!
//! A [`Store`] maps string keys to opaque byte values with a per-write TTL.
//! A missing key is `Ok(None)`; `Err` always means the backend itself failed,
//! so callers can tell "not cached" apart from "cache unavailable".
//!
//! | Backend          | Where the bytes live                                        |
//! |------------------|-------------------------------------------------------------|
//! | [`MemoryStore`]  | In this process, behind an async `RwLock`                   |
//! | [`TieredStore`]  | A fast local store in front of a shared remote one          |
//! | `RedisStore`     | A Redis server (cargo feature `redis`)                      |

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;

use crate::transport::BoxFuture;

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;
pub mod tiered;

pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisStore;
pub use tiered::TieredStore;

/// A stored value and how long it has left, if it expires at all.
pub type Stored = (Bytes, Option<Duration>);

/// Errors raised by a key-value backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("TTL must be greater than zero")]
    InvalidTtl,

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[cfg(feature = "redis")]
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
}

/// String-keyed byte storage with per-entry expiry.
///
/// # Contract
///
/// - `get_with_ttl` returns `Ok(None)` for absent or expired keys, and
///   otherwise the value with its remaining lifetime (`None` when the
///   backend holds it without expiry).
/// - `set` replaces any previous value and restarts its TTL.
/// - `delete` of an absent key succeeds.
/// - Implementations **must** be safe to share across tasks.
pub trait Store: Send + Sync {
    fn get_with_ttl<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Stored>, StoreError>>;

    /// The value alone.
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Bytes>, StoreError>> {
        Box::pin(async move { Ok(self.get_with_ttl(key).await?.map(|(value, _)| value)) })
    }

    fn set<'a>(
        &'a self,
        key: &'a str,
        value: Bytes,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<(), StoreError>>;

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<(), StoreError>>;
}

impl<S: Store + ?Sized> Store for Arc<S> {
    fn get_with_ttl<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Stored>, StoreError>> {
        (**self).get_with_ttl(key)
    }

    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Bytes>, StoreError>> {
        (**self).get(key)
    }

    fn set<'a>(
        &'a self,
        key: &'a str,
        value: Bytes,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        (**self).set(key, value, ttl)
    }

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<(), StoreError>> {
        (**self).delete(key)
    }
}
