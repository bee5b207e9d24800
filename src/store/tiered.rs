//! Two-level store: a local layer in front of a shared remote one.

use std::time::Duration;

use bytes::Bytes;
use tracing::warn;

use super::{Store, StoreError, Stored};
use crate::transport::BoxFuture;

/// A [`Store`] that answers from a fast local layer when it can.
///
/// - **Reads** try `local`, then `remote`; a remote hit is copied into
///   `local` for at most `local_ttl`, and never past the remote entry's
///   own expiry.
/// - **Writes and deletes** go to `remote` first, then `local`.
///
/// The remote store is authoritative: its errors are returned, while a
/// failing local layer is logged and skipped. Callers see the same
/// `get`/`set`/`delete` behaviour as with the remote store alone.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use transcache::store::{MemoryStore, TieredStore};
///
/// let shared = MemoryStore::new(); // stands in for a remote store
/// let store = TieredStore::new(MemoryStore::with_capacity(512), shared, Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct TieredStore<L, R> {
    local: L,
    remote: R,
    local_ttl: Duration,
}

impl<L, R> TieredStore<L, R>
where
    L: Store,
    R: Store,
{
    pub fn new(local: L, remote: R, local_ttl: Duration) -> Self {
        Self {
            local,
            remote,
            local_ttl,
        }
    }

    pub fn local(&self) -> &L {
        &self.local
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    fn local_ttl_for(&self, ttl: Duration) -> Duration {
        ttl.min(self.local_ttl)
    }
}

impl<L, R> Store for TieredStore<L, R>
where
    L: Store,
    R: Store,
{
    fn get_with_ttl<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Stored>, StoreError>> {
        Box::pin(async move {
            match self.local.get_with_ttl(key).await {
                Ok(Some(hit)) => return Ok(Some(hit)),
                Ok(None) => {}
                Err(e) => warn!(key, error = %e, "local cache layer read failed"),
            }

            let Some((value, ttl)) = self.remote.get_with_ttl(key).await? else {
                return Ok(None);
            };
            let fill_ttl = ttl.map_or(self.local_ttl, |remaining| self.local_ttl_for(remaining));
            if !fill_ttl.is_zero() {
                if let Err(e) = self.local.set(key, value.clone(), fill_ttl).await {
                    warn!(key, error = %e, "local cache layer fill failed");
                }
            }
            Ok(Some((value, ttl)))
        })
    }

    fn set<'a>(
        &'a self,
        key: &'a str,
        value: Bytes,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            self.remote.set(key, value.clone(), ttl).await?;
            if let Err(e) = self.local.set(key, value, self.local_ttl_for(ttl)).await {
                warn!(key, error = %e, "local cache layer write failed");
            }
            Ok(())
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            self.remote.delete(key).await?;
            if let Err(e) = self.local.delete(key).await {
                warn!(key, error = %e, "local cache layer delete failed");
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    const MINUTE: Duration = Duration::from_secs(60);

    struct DownStore;

    impl Store for DownStore {
        fn get_with_ttl<'a>(
            &'a self,
            _key: &'a str,
        ) -> BoxFuture<'a, Result<Option<Stored>, StoreError>> {
            Box::pin(async { Err(StoreError::Unavailable("down".into())) })
        }

        fn set<'a>(
            &'a self,
            _key: &'a str,
            _value: Bytes,
            _ttl: Duration,
        ) -> BoxFuture<'a, Result<(), StoreError>> {
            Box::pin(async { Err(StoreError::Unavailable("down".into())) })
        }

        fn delete<'a>(&'a self, _key: &'a str) -> BoxFuture<'a, Result<(), StoreError>> {
            Box::pin(async { Err(StoreError::Unavailable("down".into())) })
        }
    }

    fn tiered() -> TieredStore<MemoryStore, MemoryStore> {
        TieredStore::new(MemoryStore::new(), MemoryStore::new(), MINUTE)
    }

    #[tokio::test]
    async fn writes_reach_both_layers() {
        let store = tiered();
        store.set("k", Bytes::from_static(b"v"), MINUTE).await.unwrap();
        assert!(store.local().get("k").await.unwrap().is_some());
        assert!(store.remote().get("k").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn remote_hit_fills_local() {
        let store = tiered();
        store
            .remote()
            .set("k", Bytes::from_static(b"v"), MINUTE)
            .await
            .unwrap();
        assert!(store.local().get("k").await.unwrap().is_none());

        assert_eq!(store.get("k").await.unwrap().unwrap(), "v");
        assert_eq!(store.local().get("k").await.unwrap().unwrap(), "v");
    }

    #[tokio::test]
    async fn local_hit_skips_remote() {
        let store = TieredStore::new(MemoryStore::new(), DownStore, MINUTE);
        store
            .local()
            .set("k", Bytes::from_static(b"v"), MINUTE)
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap().unwrap(), "v");
    }

    #[tokio::test]
    async fn remote_errors_are_not_misses() {
        let store = TieredStore::new(MemoryStore::new(), DownStore, MINUTE);
        assert!(store.get("k").await.is_err());
        assert!(store.set("k", Bytes::new(), MINUTE).await.is_err());
        assert!(store.local().get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn broken_local_layer_is_bypassed() {
        let store = TieredStore::new(DownStore, MemoryStore::new(), MINUTE);
        store.set("k", Bytes::from_static(b"v"), MINUTE).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().unwrap(), "v");
        store.delete("k").await.unwrap();
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn refilled_copy_never_outlives_remote_entry() {
        let local = MemoryStore::new();
        let store = TieredStore::new(local.clone(), MemoryStore::new(), Duration::from_secs(5));
        store
            .set("k", Bytes::from_static(b"v"), Duration::from_millis(100))
            .await
            .unwrap();

        local.clear().await;
        assert_eq!(store.get("k").await.unwrap().unwrap(), "v");
        let (_, local_ttl) = local.get_with_ttl("k").await.unwrap().unwrap();
        assert!(local_ttl.unwrap() <= Duration::from_millis(100));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(store.remote().get("k").await.unwrap().is_none());
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn local_copy_never_outlives_entry() {
        let store = TieredStore::new(MemoryStore::new(), MemoryStore::new(), MINUTE);
        store
            .set("k", Bytes::from_static(b"v"), Duration::from_millis(20))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(store.get("k").await.unwrap().is_none());
    }
}
