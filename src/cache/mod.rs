//! The caching transport: cache-aside lookups with coalesced origin calls.
//!
//! [`CachingTransport`] wraps any [`Transport`] and is one itself. For each
//! request it:
//!
//! 1. asks the [`CacheEngine`] for the request's key; on failure, logs and
//!    sends the request straight to the wrapped transport;
//! 2. looks the key up; a fault is logged and the request goes to the origin
//!    uncached, a hit is returned as is;
//! 3. on a miss, joins the open group for that key or opens one. The group's
//!    single origin call stores the response when its status is cacheable,
//!    then hands the same encoded bytes (or the same error) to every caller
//!    in the group, each of which decodes its own copy.
//!
//! A group only exists while its origin call is running. Requests arriving
//! after it resolved start a new one.
//!
//! The origin call runs on its own task: dropping a caller's future, or the
//! caller's [`Request::timeout`] elapsing, stops that caller waiting but never
//! aborts the call the other callers depend on.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::instrument::WithSubscriber;
use tracing::{Dispatch, debug, dispatcher, error};

use crate::codec;
use crate::engine::CacheEngine;
use crate::http::{Request, Response, StatusCode};
use crate::transport::{BoxFuture, TcpTransport, Transport, TransportError};

mod flight;
pub mod settings;

use flight::{Flights, Leader};
pub use settings::{Settings, SettingsError};

/// Default lifetime of stored entries.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// A [`Transport`] that serves repeated requests from a cache.
///
/// Cloning is cheap and clones share everything, including the set of
/// in-flight origin calls. Two separately built instances never coalesce
/// with each other, even over the same store.
///
/// # Examples
///
/// ```rust,no_run
/// use std::time::Duration;
/// use transcache::cache::CachingTransport;
/// use transcache::engine::StoreEngine;
/// use transcache::http::Request;
/// use transcache::store::MemoryStore;
/// use transcache::transport::Transport;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let client = CachingTransport::builder(StoreEngine::new(MemoryStore::new()))
///     .ttl(Duration::from_secs(30))
///     .build();
///
/// let response = client.round_trip(Request::get("http://127.0.0.1:8080/items")?).await?;
/// println!("{}", response.status());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct CachingTransport {
    inner: Arc<Inner>,
}

struct Inner {
    engine: Arc<dyn CacheEngine>,
    child: Arc<dyn Transport>,
    cacheable: HashSet<StatusCode>,
    ttl: Duration,
    log: Option<Dispatch>,
    flights: Arc<Flights>,
}

/// Construction-time options for [`CachingTransport`].
///
/// | Option                     | Default                          |
/// |----------------------------|----------------------------------|
/// | `child`                    | [`TcpTransport::default()`]      |
/// | `cacheable_status_codes`   | `{200}`                          |
/// | `ttl`                      | [`DEFAULT_TTL`] (one minute)     |
/// | `log`                      | the caller's current subscriber  |
///
/// The key strategy belongs to the engine, e.g.
/// [`StoreEngine::key_generator`](crate::engine::StoreEngine::key_generator).
pub struct Builder {
    engine: Arc<dyn CacheEngine>,
    child: Option<Arc<dyn Transport>>,
    cacheable: HashSet<StatusCode>,
    ttl: Duration,
    log: Option<Dispatch>,
}

impl Builder {
    pub fn new<E>(engine: E) -> Self
    where
        E: CacheEngine + 'static,
    {
        Self {
            engine: Arc::new(engine),
            child: None,
            cacheable: HashSet::from([StatusCode::OK]),
            ttl: DEFAULT_TTL,
            log: None,
        }
    }

    /// The transport that performs origin calls on a miss.
    #[must_use]
    pub fn child<T>(mut self, child: T) -> Self
    where
        T: Transport + 'static,
    {
        self.child = Some(Arc::new(child));
        self
    }

    /// Replaces the set of status codes whose responses are stored.
    ///
    /// An empty set turns storage off; lookups and coalescing still happen.
    #[must_use]
    pub fn cacheable_status_codes<I>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = StatusCode>,
    {
        self.cacheable = codes.into_iter().collect();
        self
    }

    /// Lifetime given to every stored entry. Backends reject a zero TTL.
    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Sends this instance's log events to `dispatch` instead of whatever
    /// subscriber is current where requests are issued.
    #[must_use]
    pub fn log(mut self, dispatch: impl Into<Dispatch>) -> Self {
        self.log = Some(dispatch.into());
        self
    }

    /// Applies the TTL and status codes from `settings`.
    ///
    /// The partition is not a transport option; use
    /// [`Settings::engine`] to build an engine that keys with it.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] if `settings` fails validation.
    pub fn settings(mut self, settings: &Settings) -> Result<Self, SettingsError> {
        settings.validate()?;
        self.ttl = settings.ttl();
        self.cacheable = settings.status_codes()?;
        Ok(self)
    }

    pub fn build(self) -> CachingTransport {
        let child = self
            .child
            .unwrap_or_else(|| Arc::new(TcpTransport::default()));
        CachingTransport {
            inner: Arc::new(Inner {
                engine: self.engine,
                child,
                cacheable: self.cacheable,
                ttl: self.ttl,
                log: self.log,
                flights: Arc::default(),
            }),
        }
    }
}

impl CachingTransport {
    /// A caching transport over `engine` with every default.
    pub fn new<E>(engine: E) -> Self
    where
        E: CacheEngine + 'static,
    {
        Builder::new(engine).build()
    }

    pub fn builder<E>(engine: E) -> Builder
    where
        E: CacheEngine + 'static,
    {
        Builder::new(engine)
    }

    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    /// Whether responses with `status` are stored.
    pub fn is_cacheable(&self, status: StatusCode) -> bool {
        self.inner.cacheable.contains(&status)
    }

    /// Number of origin calls currently shared by a coalescing group.
    pub fn in_flight(&self) -> usize {
        self.inner.flights.len()
    }
}

impl fmt::Debug for CachingTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut codes: Vec<u16> = self.inner.cacheable.iter().map(|s| s.as_u16()).collect();
        codes.sort_unstable();
        f.debug_struct("CachingTransport")
            .field("ttl", &self.inner.ttl)
            .field("cacheable_status_codes", &codes)
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}

impl Transport for CachingTransport {
    fn round_trip(&self, request: Request) -> BoxFuture<'_, Result<Response, TransportError>> {
        let dispatch = match &self.inner.log {
            Some(dispatch) => dispatch.clone(),
            None => dispatcher::get_default(Dispatch::clone),
        };
        let inner = Arc::clone(&self.inner);
        Box::pin(
            inner
                .cached_round_trip(request, dispatch.clone())
                .with_subscriber(dispatch),
        )
    }
}

impl Inner {
    async fn cached_round_trip(
        self: Arc<Self>,
        mut request: Request,
        dispatch: Dispatch,
    ) -> Result<Response, TransportError> {
        let budget = request.timeout_duration();
        let deadline = budget.map(|t| Instant::now() + t);

        let key = match self.engine.key(&mut request).await {
            Ok(key) => key,
            Err(e) => {
                error!(url = %request.url(), error = %e, "cache key generation failed, bypassing cache");
                return self.child.round_trip(request).await;
            }
        };

        match within(deadline, self.engine.get(&key, &request)).await {
            Some(Ok(Some(response))) => {
                debug!(key = %key, status = response.status().as_u16(), "cache hit");
                return Ok(response);
            }
            Some(Ok(None)) => debug!(key = %key, "cache miss"),
            Some(Err(e)) => {
                error!(key = %key, error = %e, "cache lookup failed, going to origin");
                return self.child.round_trip(request).await;
            }
            None => {
                error!(key = %key, "cache lookup timed out");
                return Err(timed_out(budget));
            }
        }

        let head = request.head();
        let (waiter, leader) = self.flights.join(&key);
        match leader {
            Some(leader) => {
                debug!(key = %key, "starting origin call");
                let origin = Arc::clone(&self).fill(leader, request);
                tokio::spawn(origin.with_subscriber(dispatch));
            }
            None => debug!(key = %key, "joined in-flight origin call"),
        }

        let encoded = within(deadline, waiter.outcome())
            .await
            .ok_or_else(|| timed_out(budget))??;
        Ok(codec::decode(&encoded, &head)?)
    }

    /// Performs the origin call for a group and publishes its outcome.
    async fn fill(self: Arc<Self>, leader: Leader, request: Request) {
        let key = leader.key();
        let outcome = match self.child.round_trip(request).await {
            Ok(response) => {
                let encoded = codec::encode(&response);
                let status = response.status();
                if self.cacheable.contains(&status) {
                    match self.engine.set(key, &response, self.ttl).await {
                        Ok(()) => debug!(key = %key, status = status.as_u16(), "response stored"),
                        Err(e) => error!(key = %key, error = %e, "failed to store response"),
                    }
                } else {
                    debug!(key = %key, status = status.as_u16(), "status not cacheable");
                }
                Ok(encoded)
            }
            Err(e) => {
                debug!(key = %key, error = %e, "origin call failed");
                Err(e)
            }
        };
        leader.finish(outcome);
    }
}

async fn within<F: Future>(deadline: Option<Instant>, fut: F) -> Option<F::Output> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, fut).await.ok(),
        None => Some(fut.await),
    }
}

fn timed_out(budget: Option<Duration>) -> TransportError {
    TransportError::Timeout(budget.unwrap_or_default())
}
