//! Outgoing HTTP requests.

use std::time::Duration;

use url::Url;

use super::{Body, Headers, Method};

/// An outgoing HTTP request addressed by an absolute URL.
///
/// # Examples
///
/// ```
/// use transcache::http::{Method, Request};
///
/// let request = Request::post("http://api.local/search?q=rust")
///     .unwrap()
///     .header("Authorization", "Bearer abc")
///     .body(r#"{"page":2}"#);
///
/// assert_eq!(request.method(), &Method::Post);
/// assert_eq!(request.url().query(), Some("q=rust"));
/// assert_eq!(request.headers().get("authorization"), Some("Bearer abc"));
/// ```
#[derive(Debug)]
pub struct Request {
    method: Method,
    url: Url,
    headers: Headers,
    body: Body,
    timeout: Option<Duration>,
}

impl Request {
    /// Creates a request with no headers and an empty body.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Headers::new(),
            body: Body::Empty,
            timeout: None,
        }
    }

    /// Parses `url` and creates a `GET` request for it.
    ///
    /// # Errors
    ///
    /// Returns the parse error if `url` is not an absolute URL.
    pub fn get(url: &str) -> Result<Self, url::ParseError> {
        Ok(Self::new(Method::Get, Url::parse(url)?))
    }

    /// Parses `url` and creates a `POST` request for it.
    ///
    /// # Errors
    ///
    /// Returns the parse error if `url` is not an absolute URL.
    pub fn post(url: &str) -> Result<Self, url::ParseError> {
        Ok(Self::new(Method::Post, Url::parse(url)?))
    }

    /// Appends a request header. Multiple calls with the same name are additive.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Sets the request body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    /// Bounds how long this request may wait on the cache and on the network.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    pub fn body_ref(&self) -> &Body {
        &self.body
    }

    /// Takes the body out, leaving [`Body::Empty`] behind.
    pub fn take_body(&mut self) -> Body {
        std::mem::take(&mut self.body)
    }

    /// Puts a body (back) on the request.
    pub fn set_body(&mut self, body: Body) {
        self.body = body;
    }

    pub fn timeout_duration(&self) -> Option<Duration> {
        self.timeout
    }

    /// A body-less copy carrying the method, URL, headers, and timeout.
    ///
    /// Enough to frame a response read back from the cache once the original
    /// has been handed to the network.
    pub fn head(&self) -> Self {
        Self {
            method: self.method.clone(),
            url: self.url.clone(),
            headers: self.headers.clone(),
            body: Body::Empty,
            timeout: self.timeout,
        }
    }

    /// Full copy of the request, or `None` while the body is still a stream.
    pub fn try_clone(&self) -> Option<Self> {
        Some(Self {
            body: self.body.try_clone()?,
            ..self.head()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn head_drops_body_only() {
        let req = Request::post("http://example.com/a?b=c")
            .unwrap()
            .header("X-Trace", "1")
            .body("payload")
            .timeout(Duration::from_secs(2));
        let head = req.head();
        assert_eq!(head.method(), &Method::Post);
        assert_eq!(head.url().as_str(), "http://example.com/a?b=c");
        assert_eq!(head.headers().get("x-trace"), Some("1"));
        assert!(head.body_ref().is_empty());
        assert_eq!(head.timeout_duration(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn streamed_body_cannot_be_cloned() {
        let req = Request::post("http://example.com")
            .unwrap()
            .body(Body::from_reader(&b"abc"[..]));
        assert!(req.try_clone().is_none());

        let req = Request::post("http://example.com").unwrap().body("abc");
        let copy = req.try_clone().unwrap();
        assert_eq!(copy.body_ref().as_bytes(), Some(&b"abc"[..]));
    }

    #[test]
    fn relative_urls_are_rejected() {
        assert!(Request::get("/just/a/path").is_err());
    }
}
