//! # transcache
//!
//! Transparent response caching for async HTTP client transports.
//!
//! [`CachingTransport`] wraps any [`Transport`] and is a drop-in substitute
//! for it. Responses are looked up by a fingerprint of the request (method,
//! URL, body), stored in their HTTP/1.1 wire form with a TTL, and concurrent
//! identical misses share a single origin call.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use transcache::{CachingTransport, Request, Transport};
//! use transcache::engine::StoreEngine;
//! use transcache::key::DefaultKeyGenerator;
//! use transcache::store::MemoryStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = StoreEngine::new(MemoryStore::with_capacity(10_000))
//!         .key_generator(DefaultKeyGenerator::new("catalog"));
//!     let client = CachingTransport::builder(engine)
//!         .ttl(Duration::from_secs(30))
//!         .build();
//!
//!     let response = client
//!         .round_trip(Request::get("http://127.0.0.1:8080/products")?)
//!         .await?;
//!     println!("{} {}", response.status(), response.text()?);
//!     Ok(())
//! }
//! ```
//!
//! ## Layout
//!
//! | Module        | Role                                                       |
//! |---------------|------------------------------------------------------------|
//! | [`http`]      | Request / response types                                   |
//! | [`key`]       | Request fingerprinting                                     |
//! | [`codec`]     | Response ⇄ wire bytes                                      |
//! | [`store`]     | Key-value backends (memory, tiered, Redis)                 |
//! | [`engine`]    | The cache adapter the transport talks to                   |
//! | [`transport`] | The `Transport` trait and the plain TCP transport          |
//! | [`cache`]     | The caching transport itself                               |

pub mod cache;
pub mod codec;
pub mod engine;
pub mod http;
pub mod key;
pub mod store;
pub mod transport;

pub use cache::{Builder, CachingTransport, Settings};
pub use engine::{CacheEngine, CacheError, StoreEngine};
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use key::{DefaultKeyGenerator, KeyGenerator};
pub use transport::{TcpTransport, Transport, TransportError};
