//! Redis-backed store (cargo feature `redis`).

use std::time::Duration;

use bytes::Bytes;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use super::{Store, StoreError, Stored};
use crate::transport::BoxFuture;

/// A [`Store`] kept in Redis.
///
/// Values are written with `PSETEX`, so the TTL has millisecond precision and
/// expiry is enforced by the server. The underlying [`ConnectionManager`]
/// reconnects on its own and is cheap to clone per command.
///
/// # Examples
///
/// ```rust,no_run
/// use transcache::store::RedisStore;
///
/// # async fn run() -> Result<(), transcache::store::StoreError> {
/// let store = RedisStore::connect("redis://127.0.0.1:6379/0").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Opens a managed connection to the server at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Redis`] if the URL is invalid or the server is unreachable.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }

    /// Wraps an existing connection manager.
    pub fn from_manager(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

impl Store for RedisStore {
    fn get_with_ttl<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Stored>, StoreError>> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            let (value, pttl): (Option<Vec<u8>>, i64) = redis::pipe()
                .atomic()
                .get(key)
                .pttl(key)
                .query_async(&mut conn)
                .await?;
            // PTTL is -1 for a key without expiry and -2 for a missing one.
            let ttl = u64::try_from(pttl).ok().map(Duration::from_millis);
            Ok(value.map(|v| (Bytes::from(v), ttl)))
        })
    }

    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Bytes>, StoreError>> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            let value: Option<Vec<u8>> = conn.get(key).await?;
            Ok(value.map(Bytes::from))
        })
    }

    fn set<'a>(
        &'a self,
        key: &'a str,
        value: Bytes,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
            if millis == 0 {
                return Err(StoreError::InvalidTtl);
            }
            let mut conn = self.conn.clone();
            conn.pset_ex::<_, _, ()>(key, &value[..], millis).await?;
            Ok(())
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            conn.del::<_, ()>(key).await?;
            Ok(())
        })
    }
}
