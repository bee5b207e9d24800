//! Response codec — the storage format for cached responses.
//!
//! A cached entry is the HTTP/1.1 wire form of the response: status line,
//! header lines in their original order, a blank line, then the body. Reading
//! it back goes through [`httparse`], the same parser the network path uses.
//!
//! ```
//! use transcache::codec;
//! use transcache::http::{Request, Response, StatusCode};
//!
//! let response = Response::new(StatusCode::OK)
//!     .header("Content-Type", "text/plain")
//!     .body("hello");
//! let stored = codec::encode(&response);
//! assert!(stored.starts_with(b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\n"));
//!
//! let request = Request::get("http://example.com/").unwrap();
//! let decoded = codec::decode(&stored, &request).unwrap();
//! assert_eq!(decoded.text().unwrap(), "hello");
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::http::{
    Headers, InvalidStatusCode, Method, Request, Response, StatusCode, Version,
};

/// Header slots tried on the first parse attempt.
const MIN_HEADERS: usize = 64;

/// Upper bound on header slots; more fields than this is treated as malformed.
const MAX_HEADERS: usize = 1024;

/// Errors raised while reading a stored or received response.
#[derive(Debug, Clone, Error)]
pub enum CodecError {
    #[error("response head is incomplete — more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error(transparent)]
    Status(#[from] InvalidStatusCode),

    #[error("invalid Content-Length header: {value:?}")]
    InvalidContentLength { value: String },

    #[error("body truncated: Content-Length is {expected} but only {available} bytes follow")]
    Truncated { expected: usize, available: usize },

    #[error("invalid chunk size line")]
    InvalidChunkSize,
}

/// The status line and headers of a response, plus where its body starts.
#[derive(Debug)]
pub(crate) struct ResponseHead {
    pub(crate) version: Version,
    pub(crate) status: StatusCode,
    pub(crate) reason: String,
    pub(crate) headers: Headers,
    pub(crate) body_offset: usize,
}

impl ResponseHead {
    /// Whether a response to `method` with this head carries body bytes at all.
    pub(crate) fn expects_body(&self, method: &Method) -> bool {
        method != &Method::Head && !self.status.forbids_body()
    }

    /// The declared `Content-Length`, if any.
    ///
    /// # Errors
    ///
    /// [`CodecError::InvalidContentLength`] when the header is present but not a number.
    pub(crate) fn content_length(&self) -> Result<Option<usize>, CodecError> {
        match self.headers.get("content-length") {
            None => Ok(None),
            Some(value) => value
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| CodecError::InvalidContentLength {
                    value: value.to_owned(),
                }),
        }
    }

    pub(crate) fn into_response(self, body: Bytes) -> Response {
        let mut response = Response::new(self.status)
            .version(self.version)
            .reason_phrase(self.reason)
            .body(body);
        *response.headers_mut() = self.headers;
        response
    }
}

/// Parses a response status line and header block from the front of `buf`.
///
/// # Errors
///
/// - [`CodecError::Incomplete`] — the blank line ending the header block has not arrived.
/// - [`CodecError::Parse`] — the bytes are not an HTTP/1.x response head.
/// - [`CodecError::MissingField`] / [`CodecError::Status`] — the status line is unusable.
pub(crate) fn parse_head(buf: &[u8]) -> Result<ResponseHead, CodecError> {
    let mut capacity = MIN_HEADERS;
    loop {
        let mut scratch = vec![httparse::EMPTY_HEADER; capacity];
        let mut raw = httparse::Response::new(&mut scratch);

        let body_offset = match raw.parse(buf) {
            Ok(httparse::Status::Complete(offset)) => offset,
            Ok(httparse::Status::Partial) => return Err(CodecError::Incomplete),
            Err(httparse::Error::TooManyHeaders) if capacity < MAX_HEADERS => {
                capacity *= 2;
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let version = raw
            .version
            .ok_or(CodecError::MissingField { field: "version" })?;
        let code = raw.code.ok_or(CodecError::MissingField { field: "status" })?;

        let mut headers = Headers::with_capacity(raw.headers.len());
        for header in raw.headers.iter() {
            headers.append(header.name, String::from_utf8_lossy(header.value));
        }

        return Ok(ResponseHead {
            version: Version::from_minor(version),
            status: StatusCode::from_u16(code)?,
            reason: raw.reason.unwrap_or_default().to_owned(),
            headers,
            body_offset,
        });
    }
}

/// Serializes a response into its HTTP/1.1 wire form.
///
/// Nothing is added or dropped: the status line keeps the response's own
/// reason phrase, and every header line is written in stored order.
pub fn encode(response: &Response) -> Bytes {
    let body = response.bytes();
    let estimated_size = 32 + response.reason().len() + response.headers().encoded_len() + body.len();
    let mut buf = BytesMut::with_capacity(estimated_size);

    // Status line
    buf.put_slice(response.http_version().as_str().as_bytes());
    buf.put_slice(format!(" {} ", response.status().as_u16()).as_bytes());
    buf.put_slice(response.reason().as_bytes());
    buf.put_slice(b"\r\n");

    response.headers().write_to(&mut buf);

    // Header/body separator
    buf.put_slice(b"\r\n");
    buf.put_slice(body);

    buf.freeze()
}

/// Rebuilds a response from bytes produced by [`encode`].
///
/// `request` is the request the response answers. Its method decides the
/// framing: a `HEAD` request never has a body, nor do `1xx`, `204` and `304`
/// responses. Otherwise `Content-Length` bounds the body, or the body runs to
/// the end of `buf` when the header is absent.
///
/// Every call returns an independent response with its own buffered body.
///
/// # Errors
///
/// Any [`CodecError`]; notably [`CodecError::Truncated`] when fewer body bytes
/// follow the head than `Content-Length` promises.
pub fn decode(buf: &[u8], request: &Request) -> Result<Response, CodecError> {
    let head = parse_head(buf)?;
    let rest = &buf[head.body_offset..];

    let body = if !head.expects_body(request.method()) {
        Bytes::new()
    } else {
        match head.content_length()? {
            Some(expected) if expected > rest.len() => {
                return Err(CodecError::Truncated {
                    expected,
                    available: rest.len(),
                });
            }
            Some(len) => Bytes::copy_from_slice(&rest[..len]),
            None => Bytes::copy_from_slice(rest),
        }
    };

    Ok(head.into_response(body).with_url(request.url().clone()))
}
