//! HTTP responses with fully buffered bodies.

use bytes::Bytes;
use url::Url;

use super::{Headers, StatusCode, Version};

/// An HTTP response whose body has been read completely.
///
/// The body is a [`Bytes`] buffer, so a response can be inspected, stored,
/// and handed on without a single-read stream getting in the way.
///
/// # Examples
///
/// ```
/// use transcache::http::{Response, StatusCode};
///
/// let response = Response::new(StatusCode::OK)
///     .header("Content-Type", "application/json")
///     .body(r#"{"status":"ok"}"#);
///
/// assert_eq!(response.status(), StatusCode::OK);
/// assert_eq!(response.reason(), "OK");
/// assert_eq!(response.text().unwrap(), r#"{"status":"ok"}"#);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: StatusCode,
    reason: String,
    version: Version,
    headers: Headers,
    body: Bytes,
    url: Option<Url>,
}

impl Response {
    /// Creates a new HTTP/1.1 response with the canonical reason phrase and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            reason: status.canonical_reason().unwrap_or_default().to_owned(),
            version: Version::Http11,
            headers: Headers::new(),
            body: Bytes::new(),
            url: None,
        }
    }

    /// Appends a response header. Multiple calls with the same name are additive.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Sets the response body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Overrides the reason phrase sent on the status line.
    #[must_use]
    pub fn reason_phrase(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    #[must_use]
    pub fn version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub(crate) fn with_url(mut self, url: Url) -> Self {
        self.url = Some(url);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the reason phrase exactly as it appeared on the status line.
    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn http_version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    pub fn bytes(&self) -> &Bytes {
        &self.body
    }

    /// Returns the body as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Returns the UTF-8 error if the body is not valid text.
    pub fn text(&self) -> Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(&self.body)
    }

    pub fn into_body(self) -> Bytes {
        self.body
    }

    /// The URL of the request this response answers, when known.
    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::OK)
    }
}
