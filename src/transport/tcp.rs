//! Plain-TCP HTTP/1.1 client transport built on Tokio.
//!
//! Opens one connection per request and asks the origin to close it
//! afterwards, so responses framed by connection close are read correctly.
//! The response is read with the same incremental buffer-and-parse loop the
//! head parser in [`crate::codec`] is designed for.

use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;
use url::{Host, Position, Url};

use super::{BoxFuture, Transport, TransportError};
use crate::codec::{self, CodecError, ResponseHead};
use crate::http::{Method, Request, Response, StatusCode};

/// Default cap on a buffered response (8 MiB).
const MAX_RESPONSE_SIZE: usize = 8 * 1024 * 1024;

/// Default deadline for a whole exchange when the request sets none.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Initial read buffer capacity per connection.
const INITIAL_BUF_SIZE: usize = 4096;

/// The default network transport: HTTP/1.1 over a plain TCP connection.
///
/// Only `http://` URLs are supported. Put a TLS-capable transport in front of
/// the cache for `https://` origins.
///
/// # Examples
///
/// ```rust,no_run
/// use transcache::http::Request;
/// use transcache::transport::{TcpTransport, Transport};
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let transport = TcpTransport::new();
/// let response = transport
///     .round_trip(Request::get("http://127.0.0.1:8080/health")?)
///     .await?;
/// println!("{}", response.status());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TcpTransport {
    timeout: Duration,
    max_response_bytes: usize,
}

impl TcpTransport {
    /// Creates a transport with a 30 s timeout and an 8 MiB response cap.
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_response_bytes: MAX_RESPONSE_SIZE,
        }
    }

    /// Deadline for requests that do not carry their own.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Largest response (head plus body) that will be buffered.
    #[must_use]
    pub fn max_response_size(mut self, max_bytes: usize) -> Self {
        self.max_response_bytes = max_bytes;
        self
    }

    async fn exchange(&self, mut request: Request) -> Result<Response, TransportError> {
        let url = request.url().clone();
        if url.scheme() != "http" {
            return Err(TransportError::UnsupportedScheme {
                scheme: url.scheme().to_owned(),
            });
        }
        let host = match url.host() {
            Some(Host::Domain(domain)) => domain.to_owned(),
            Some(Host::Ipv4(ip)) => ip.to_string(),
            Some(Host::Ipv6(ip)) => ip.to_string(),
            None => {
                return Err(TransportError::MissingHost {
                    url: url.to_string(),
                });
            }
        };
        let port = url.port_or_known_default().unwrap_or(80);

        let body = request.take_body().collect().await?;
        let head = encode_request_head(&request, &url, body.len())?;

        let mut stream = TcpStream::connect((host.as_str(), port)).await?;
        stream.write_all(&head).await?;
        if !body.is_empty() {
            stream.write_all(&body).await?;
        }
        stream.flush().await?;

        let response = read_response(&mut stream, request.method(), self.max_response_bytes).await?;

        debug!(
            method = %request.method(),
            url = %url,
            status = response.status().as_u16(),
            "origin exchange complete"
        );
        Ok(response.with_url(url))
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for TcpTransport {
    fn round_trip(&self, request: Request) -> BoxFuture<'_, Result<Response, TransportError>> {
        Box::pin(async move {
            let timeout = request.timeout_duration().unwrap_or(self.timeout);
            tokio::time::timeout(timeout, self.exchange(request))
                .await
                .map_err(|_| TransportError::Timeout(timeout))?
        })
    }
}

/// Writes the request line and headers.
///
/// `Host`, `Connection` and `Content-Length` are owned by the transport;
/// a caller-supplied `Host` is kept. A header containing CR or LF is refused
/// rather than written, since it would split into extra header lines.
fn encode_request_head(
    request: &Request,
    url: &Url,
    body_len: usize,
) -> Result<BytesMut, TransportError> {
    let target = &url[Position::BeforePath..Position::AfterQuery];
    let mut buf = BytesMut::with_capacity(128 + request.headers().encoded_len());

    buf.put_slice(format!("{} {} HTTP/1.1\r\n", request.method(), target).as_bytes());
    if !request.headers().contains("host") {
        let authority = &url[Position::BeforeHost..Position::AfterPort];
        buf.put_slice(format!("Host: {authority}\r\n").as_bytes());
    }
    for (name, value) in request.headers().iter() {
        if breaks_line(name) || breaks_line(value) {
            return Err(TransportError::InvalidHeader {
                name: name.to_owned(),
            });
        }
        if name.eq_ignore_ascii_case("connection")
            || name.eq_ignore_ascii_case("content-length")
            || name.eq_ignore_ascii_case("transfer-encoding")
        {
            continue;
        }
        buf.put_slice(format!("{name}: {value}\r\n").as_bytes());
    }
    buf.put_slice(b"Connection: close\r\n");
    if body_len > 0 || matches!(request.method(), Method::Post | Method::Put | Method::Patch) {
        buf.put_slice(format!("Content-Length: {body_len}\r\n").as_bytes());
    }
    buf.put_slice(b"\r\n");
    Ok(buf)
}

fn breaks_line(field: &str) -> bool {
    field.bytes().any(|b| b == b'\r' || b == b'\n')
}

/// Reads one complete response from `stream`.
///
/// Interim `1xx` responses are skipped. The body is framed by
/// `Transfer-Encoding: chunked`, then `Content-Length`, then connection close.
async fn read_response<S>(
    stream: &mut S,
    method: &Method,
    max_bytes: usize,
) -> Result<Response, TransportError>
where
    S: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);

    let mut head = loop {
        match codec::parse_head(&buf) {
            Ok(head)
                if head.status.is_informational()
                    && head.status != StatusCode::SWITCHING_PROTOCOLS =>
            {
                buf.advance(head.body_offset);
            }
            Ok(head) => break head,
            Err(CodecError::Incomplete) => {
                if buf.len() > max_bytes {
                    return Err(TransportError::ResponseTooLarge { max_bytes });
                }
                read_more(stream, &mut buf).await?;
            }
            Err(e) => return Err(e.into()),
        }
    };
    buf.advance(head.body_offset);

    let body = if !head.expects_body(method) {
        Bytes::new()
    } else if is_chunked(&head) {
        let body = read_chunked(stream, buf, max_bytes).await?;
        // The body is stored de-chunked, so neither framing header applies.
        // Transfer-Encoding overrides any Content-Length the origin also sent.
        head.headers.remove("transfer-encoding");
        head.headers.remove("content-length");
        body
    } else if let Some(len) = head.content_length()? {
        if len > max_bytes {
            return Err(TransportError::ResponseTooLarge { max_bytes });
        }
        while buf.len() < len {
            read_more(stream, &mut buf).await?;
        }
        buf.split_to(len).freeze()
    } else {
        loop {
            if buf.len() > max_bytes {
                return Err(TransportError::ResponseTooLarge { max_bytes });
            }
            if stream.read_buf(&mut buf).await? == 0 {
                break;
            }
        }
        buf.freeze()
    };

    Ok(head.into_response(body))
}

fn is_chunked(head: &ResponseHead) -> bool {
    head.headers
        .get_all("transfer-encoding")
        .flat_map(|v| v.split(','))
        .any(|coding| coding.trim().eq_ignore_ascii_case("chunked"))
}

async fn read_chunked<S>(
    stream: &mut S,
    mut buf: BytesMut,
    max_bytes: usize,
) -> Result<Bytes, TransportError>
where
    S: AsyncRead + Unpin,
{
    let mut body = BytesMut::new();
    loop {
        match httparse::parse_chunk_size(&buf) {
            Ok(httparse::Status::Complete((offset, size))) => {
                let size = usize::try_from(size)
                    .map_err(|_| TransportError::ResponseTooLarge { max_bytes })?;
                // Trailer fields after the last chunk are not needed on a closing connection.
                if size == 0 {
                    return Ok(body.freeze());
                }
                if body.len().saturating_add(size) > max_bytes {
                    return Err(TransportError::ResponseTooLarge { max_bytes });
                }
                let needed = offset + size + 2;
                while buf.len() < needed {
                    read_more(stream, &mut buf).await?;
                }
                body.put_slice(&buf[offset..offset + size]);
                buf.advance(needed);
            }
            Ok(httparse::Status::Partial) => read_more(stream, &mut buf).await?,
            Err(_) => return Err(CodecError::InvalidChunkSize.into()),
        }
    }
}

async fn read_more<S>(stream: &mut S, buf: &mut BytesMut) -> Result<(), TransportError>
where
    S: AsyncRead + Unpin,
{
    if stream.read_buf(buf).await? == 0 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "connection closed before the response was complete",
        )
        .into());
    }
    Ok(())
}
