//! Request bodies: absent, buffered, or streamed from an async reader.

use std::fmt;
use std::io;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Initial capacity used when draining a streamed body.
const INITIAL_BUF_SIZE: usize = 4096;

/// An outgoing request body.
///
/// A streamed body can be read once. [`Body::collect`] drains it into a
/// buffer; callers that need to look at the bytes and still send them put the
/// buffered copy back with [`Body::Full`].
///
/// # Examples
///
/// ```
/// use transcache::http::Body;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> std::io::Result<()> {
/// let body = Body::from_reader(&b"hello"[..]);
/// let bytes = body.collect().await?;
/// assert_eq!(&bytes[..], b"hello");
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub enum Body {
    #[default]
    Empty,
    Full(Bytes),
    Reader(Box<dyn AsyncRead + Send + Sync + Unpin>),
}

impl Body {
    /// Wraps an async reader as a streamed body.
    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Sync + Unpin + 'static,
    {
        Self::Reader(Box::new(reader))
    }

    /// Returns `true` for [`Body::Empty`] and for zero-length buffers.
    ///
    /// A streamed body is never reported as empty; its length is unknown.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Full(bytes) => bytes.is_empty(),
            Self::Reader(_) => false,
        }
    }

    /// Returns the buffered bytes, or `None` for a streamed body.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Empty => Some(&[]),
            Self::Full(bytes) => Some(bytes),
            Self::Reader(_) => None,
        }
    }

    /// Reads the whole body into memory.
    ///
    /// # Errors
    ///
    /// Propagates any I/O error raised by a streamed body's reader.
    pub async fn collect(self) -> io::Result<Bytes> {
        match self {
            Self::Empty => Ok(Bytes::new()),
            Self::Full(bytes) => Ok(bytes),
            Self::Reader(mut reader) => {
                let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);
                while reader.read_buf(&mut buf).await? != 0 {}
                Ok(buf.freeze())
            }
        }
    }

    /// Cheap copy of a buffered body; `None` if the body is streamed.
    pub(crate) fn try_clone(&self) -> Option<Self> {
        match self {
            Self::Empty => Some(Self::Empty),
            Self::Full(bytes) => Some(Self::Full(bytes.clone())),
            Self::Reader(_) => None,
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Body::Empty"),
            Self::Full(bytes) => f.debug_tuple("Body::Full").field(&bytes.len()).finish(),
            Self::Reader(_) => f.write_str("Body::Reader(..)"),
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self::Full(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Full(Bytes::from(bytes))
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Self::Full(Bytes::from(text))
    }
}

impl From<&'static str> for Body {
    fn from(text: &'static str) -> Self {
        Self::Full(Bytes::from_static(text.as_bytes()))
    }
}
