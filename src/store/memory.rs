//! In-process store with TTL expiry and an optional entry cap.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

use super::{Store, StoreError, Stored};
use crate::transport::BoxFuture;

/// An in-memory [`Store`].
///
/// Expired entries are dropped lazily when read or when room is needed.
/// With a capacity set, the oldest insertions are evicted first. Clones share
/// the same entries, so one handle can be given to a cache engine while
/// another is kept for inspection or [`clear`](Self::clear).
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use transcache::store::{MemoryStore, Store};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let store = MemoryStore::with_capacity(1_000);
/// store.set("k", "v".into(), Duration::from_secs(60)).await.unwrap();
/// assert_eq!(store.get("k").await.unwrap().as_deref(), Some(&b"v"[..]));
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Entries>>,
    max_entries: Option<usize>,
}

#[derive(Debug, Default)]
struct Entries {
    map: HashMap<String, Entry>,
    // Insertion order, oldest first.
    order: VecDeque<String>,
}

#[derive(Debug)]
struct Entry {
    value: Bytes,
    expires_at: Instant,
}

impl Entries {
    fn remove(&mut self, key: &str) -> bool {
        if self.map.remove(key).is_some() {
            self.order.retain(|k| k != key);
            true
        } else {
            false
        }
    }

    /// `Some(None)` when `key` is absent, `Some(Some(..))` when it is live,
    /// `None` when it is present but expired.
    fn live(&self, key: &str, now: Instant) -> Option<Option<Stored>> {
        match self.map.get(key) {
            None => Some(None),
            Some(entry) if entry.expires_at > now => Some(Some((
                entry.value.clone(),
                Some(entry.expires_at - now),
            ))),
            Some(_) => None,
        }
    }

    fn purge_expired(&mut self, now: Instant) {
        self.map.retain(|_, entry| entry.expires_at > now);
        let map = &self.map;
        self.order.retain(|k| map.contains_key(k));
    }
}

impl MemoryStore {
    /// Creates an unbounded store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding at most `max_entries` live entries.
    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            inner: Arc::default(),
            max_entries: Some(max_entries.max(1)),
        }
    }

    /// Drops every entry.
    pub async fn clear(&self) {
        let mut entries = self.inner.write().await;
        let count = entries.map.len();
        entries.map.clear();
        entries.order.clear();
        debug!(count, "memory store cleared");
    }

    /// Number of stored entries, expired ones included until they are purged.
    pub async fn len(&self) -> usize {
        self.inner.read().await.map.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Store for MemoryStore {
    fn get_with_ttl<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Stored>, StoreError>> {
        Box::pin(async move {
            if let Some(live) = self.inner.read().await.live(key, Instant::now()) {
                return Ok(live);
            }

            // Expired. Recheck under the write lock: a writer may have
            // replaced the entry in between.
            let mut entries = self.inner.write().await;
            let now = Instant::now();
            match entries.live(key, now) {
                Some(live) => Ok(live),
                None => {
                    entries.remove(key);
                    Ok(None)
                }
            }
        })
    }

    fn set<'a>(
        &'a self,
        key: &'a str,
        value: Bytes,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            if ttl.is_zero() {
                return Err(StoreError::InvalidTtl);
            }
            let now = Instant::now();
            let mut entries = self.inner.write().await;

            entries.remove(key);
            if let Some(max) = self.max_entries {
                if entries.map.len() >= max {
                    entries.purge_expired(now);
                }
                while entries.map.len() >= max {
                    let Some(oldest) = entries.order.pop_front() else {
                        break;
                    };
                    entries.map.remove(&oldest);
                    debug!(key = %oldest, "memory store evicted entry");
                }
            }

            entries.map.insert(
                key.to_owned(),
                Entry {
                    value,
                    expires_at: now + ttl,
                },
            );
            entries.order.push_back(key.to_owned());
            Ok(())
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            self.inner.write().await.remove(key);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn miss_is_none() {
        let store = MemoryStore::new();
        assert!(store.get("absent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_get_delete() {
        let store = MemoryStore::new();
        store.set("k", Bytes::from_static(b"v1"), MINUTE).await.unwrap();
        store.set("k", Bytes::from_static(b"v2"), MINUTE).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().unwrap(), "v2");
        assert_eq!(store.len().await, 1);

        store.delete("k").await.unwrap();
        store.delete("k").await.unwrap();
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn entries_expire() {
        let store = MemoryStore::new();
        store
            .set("k", Bytes::from_static(b"v"), Duration::from_millis(20))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(store.get("k").await.unwrap().is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn remaining_ttl_is_reported() {
        let store = MemoryStore::new();
        store.set("k", Bytes::from_static(b"v"), MINUTE).await.unwrap();
        let (value, ttl) = store.get_with_ttl("k").await.unwrap().unwrap();
        assert_eq!(value, "v");
        let ttl = ttl.unwrap();
        assert!(ttl <= MINUTE && ttl > Duration::from_secs(50));
        assert!(store.get_with_ttl("absent").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_reads_see_same_entry() {
        let store = MemoryStore::new();
        store.set("k", Bytes::from_static(b"v"), MINUTE).await.unwrap();
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.get("k").await.unwrap() })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "v");
        }
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn zero_ttl_is_rejected() {
        let store = MemoryStore::new();
        let err = store.set("k", Bytes::new(), Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidTtl));
    }

    #[tokio::test]
    async fn capacity_evicts_oldest() {
        let store = MemoryStore::with_capacity(2);
        for key in ["a", "b", "c"] {
            store.set(key, Bytes::from_static(b"x"), MINUTE).await.unwrap();
        }
        assert!(store.get("a").await.unwrap().is_none());
        assert!(store.get("b").await.unwrap().is_some());
        assert!(store.get("c").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn rewrite_refreshes_position() {
        let store = MemoryStore::with_capacity(2);
        store.set("a", Bytes::from_static(b"1"), MINUTE).await.unwrap();
        store.set("b", Bytes::from_static(b"1"), MINUTE).await.unwrap();
        store.set("a", Bytes::from_static(b"2"), MINUTE).await.unwrap();
        store.set("c", Bytes::from_static(b"1"), MINUTE).await.unwrap();
        assert!(store.get("b").await.unwrap().is_none());
        assert_eq!(store.get("a").await.unwrap().unwrap(), "2");
    }

    #[tokio::test]
    async fn clones_share_entries() {
        let store = MemoryStore::new();
        let handle = store.clone();
        store.set("k", Bytes::from_static(b"v"), MINUTE).await.unwrap();
        handle.clear().await;
        assert!(store.get("k").await.unwrap().is_none());
    }
}
