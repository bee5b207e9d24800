//! Cache engines — the adapter between the caching transport and a store.
//!
//! A [`CacheEngine`] answers three questions for the caching transport:
//! what is this request's key, is there a stored response for it, and please
//! store this one. [`StoreEngine`] is the standard engine: a
//! [`KeyGenerator`] for keys, the [`codec`](crate::codec) for bytes, and any
//! [`Store`] for persistence.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::codec::{self, CodecError};
use crate::http::{Request, Response};
use crate::key::{DefaultKeyGenerator, KeyError, KeyGenerator};
use crate::store::{Store, StoreError};
use crate::transport::BoxFuture;

/// Errors raised while reading from or writing to a cache engine.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache store error: {0}")]
    Store(#[from] StoreError),

    #[error("stored response is unreadable: {0}")]
    Codec(#[from] CodecError),

    #[error("{0}")]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

/// The capability set the caching transport needs from a cache.
///
/// # Contract
///
/// - `key` may read the request body but must leave it readable.
/// - `get` returns `Ok(None)` on a miss and `Err` only when the cache itself
///   failed; a fault is never reported as a miss.
/// - `get` binds the decoded response to `request`, whose method decides how
///   the stored bytes are framed.
/// - `set` reports every failure to the caller.
pub trait CacheEngine: Send + Sync {
    fn key<'a>(&'a self, request: &'a mut Request) -> BoxFuture<'a, Result<String, KeyError>>;

    fn get<'a>(
        &'a self,
        key: &'a str,
        request: &'a Request,
    ) -> BoxFuture<'a, Result<Option<Response>, CacheError>>;

    fn set<'a>(
        &'a self,
        key: &'a str,
        response: &'a Response,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<(), CacheError>>;
}

impl<E: CacheEngine + ?Sized> CacheEngine for Arc<E> {
    fn key<'a>(&'a self, request: &'a mut Request) -> BoxFuture<'a, Result<String, KeyError>> {
        (**self).key(request)
    }

    fn get<'a>(
        &'a self,
        key: &'a str,
        request: &'a Request,
    ) -> BoxFuture<'a, Result<Option<Response>, CacheError>> {
        (**self).get(key, request)
    }

    fn set<'a>(
        &'a self,
        key: &'a str,
        response: &'a Response,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<(), CacheError>> {
        (**self).set(key, response, ttl)
    }
}

/// The standard [`CacheEngine`]: wire-format responses in a key-value [`Store`].
///
/// # Examples
///
/// ```
/// use transcache::engine::StoreEngine;
/// use transcache::key::DefaultKeyGenerator;
/// use transcache::store::MemoryStore;
///
/// let engine = StoreEngine::new(MemoryStore::new())
///     .key_generator(DefaultKeyGenerator::new("billing-service"));
/// ```
pub struct StoreEngine<S> {
    store: S,
    keys: Arc<dyn KeyGenerator>,
}

impl<S: Store> StoreEngine<S> {
    /// Creates an engine over `store` with an unpartitioned [`DefaultKeyGenerator`].
    pub fn new(store: S) -> Self {
        Self {
            store,
            keys: Arc::new(DefaultKeyGenerator::default()),
        }
    }

    /// Replaces the fingerprinting strategy.
    #[must_use]
    pub fn key_generator<K>(mut self, keys: K) -> Self
    where
        K: KeyGenerator + 'static,
    {
        self.keys = Arc::new(keys);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S: Store> CacheEngine for StoreEngine<S> {
    fn key<'a>(&'a self, request: &'a mut Request) -> BoxFuture<'a, Result<String, KeyError>> {
        self.keys.key(request)
    }

    fn get<'a>(
        &'a self,
        key: &'a str,
        request: &'a Request,
    ) -> BoxFuture<'a, Result<Option<Response>, CacheError>> {
        Box::pin(async move {
            let Some(stored) = self.store.get(key).await? else {
                return Ok(None);
            };
            let response = codec::decode(&stored, request)?;
            Ok(Some(response))
        })
    }

    fn set<'a>(
        &'a self,
        key: &'a str,
        response: &'a Response,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<(), CacheError>> {
        Box::pin(async move {
            self.store.set(key, codec::encode(response), ttl).await?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::StatusCode;
    use crate::store::MemoryStore;
    use bytes::Bytes;

    const MINUTE: Duration = Duration::from_secs(60);

    struct FixedKey;

    impl KeyGenerator for FixedKey {
        fn key<'a>(&'a self, _request: &'a mut Request) -> BoxFuture<'a, Result<String, KeyError>> {
            Box::pin(async { Ok("fixed".to_owned()) })
        }
    }

    fn request() -> Request {
        Request::get("http://example.com/resource").unwrap()
    }

    #[tokio::test]
    async fn miss_then_hit() {
        let engine = StoreEngine::new(MemoryStore::new());
        let mut req = request();
        let key = engine.key(&mut req).await.unwrap();
        assert!(engine.get(&key, &req).await.unwrap().is_none());

        let response = Response::new(StatusCode::OK)
            .header("Content-Type", "text/plain")
            .body("cached");
        engine.set(&key, &response, MINUTE).await.unwrap();

        let hit = engine.get(&key, &req).await.unwrap().unwrap();
        assert_eq!(hit.status(), StatusCode::OK);
        assert_eq!(hit.text().unwrap(), "cached");
        assert_eq!(hit.headers().get("content-type"), Some("text/plain"));
        assert_eq!(hit.url(), Some(req.url()));
    }

    #[tokio::test]
    async fn key_strategy_is_pluggable() {
        let engine = StoreEngine::new(MemoryStore::new()).key_generator(FixedKey);
        assert_eq!(engine.key(&mut request()).await.unwrap(), "fixed");
    }

    #[tokio::test]
    async fn partition_comes_from_generator() {
        let engine =
            StoreEngine::new(MemoryStore::new()).key_generator(DefaultKeyGenerator::new("svc"));
        assert!(engine.key(&mut request()).await.unwrap().starts_with("svc_"));
    }

    #[tokio::test]
    async fn corrupt_entry_is_an_error_not_a_miss() {
        let store = MemoryStore::new();
        store
            .set("k", Bytes::from_static(b"garbage"), MINUTE)
            .await
            .unwrap();
        let engine = StoreEngine::new(store);
        let err = engine.get("k", &request()).await.unwrap_err();
        assert!(matches!(err, CacheError::Codec(_)));
    }

    #[tokio::test]
    async fn zero_ttl_surfaces_from_set() {
        let engine = StoreEngine::new(MemoryStore::new());
        let err = engine
            .set("k", &Response::new(StatusCode::OK), Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::Store(StoreError::InvalidTtl)));
    }
}
