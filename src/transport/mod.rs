//! The "send a request, get a response" contract every transport implements.
//!
//! [`Transport`] is the seam between callers and the network. The caching
//! layer implements it and also wraps one, so it can sit anywhere a plain
//! transport is expected. [`TcpTransport`] is the default network transport.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::codec::CodecError;
use crate::http::{Request, Response};

pub mod tcp;

pub use tcp::TcpTransport;

/// A boxed, `Send` future — the return type of every async trait method in this crate.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors produced while performing a request.
///
/// Cloning is cheap: one failed origin call is handed to every caller that
/// was waiting on it, each getting the same error.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(Arc<io::Error>),

    #[error("invalid response: {0}")]
    Codec(#[from] CodecError),

    #[error("unsupported URL scheme: {scheme}")]
    UnsupportedScheme { scheme: String },

    #[error("URL has no host: {url}")]
    MissingHost { url: String },

    #[error("header {name:?} contains a line break")]
    InvalidHeader { name: String },

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("response exceeds maximum allowed size of {max_bytes} bytes")]
    ResponseTooLarge { max_bytes: usize },

    #[error("origin call ended without producing a response")]
    Aborted,

    #[error("{0}")]
    Other(Arc<dyn std::error::Error + Send + Sync>),
}

impl TransportError {
    /// Wraps an arbitrary error raised by a custom transport.
    pub fn other<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Other(Arc::new(error))
    }
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

/// Sends one request and yields its response.
///
/// # Contract
///
/// - Implementations **must** be `Send + Sync`; a single instance is shared
///   by every task issuing requests.
/// - The returned response has its body fully read.
/// - Retries, redirects, and TLS are the implementation's own business.
pub trait Transport: Send + Sync {
    /// Performs `request` and returns the response or the failure.
    fn round_trip(&self, request: Request) -> BoxFuture<'_, Result<Response, TransportError>>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn round_trip(&self, request: Request) -> BoxFuture<'_, Result<Response, TransportError>> {
        (**self).round_trip(request)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn round_trip(&self, request: Request) -> BoxFuture<'_, Result<Response, TransportError>> {
        (**self).round_trip(request)
    }
}
