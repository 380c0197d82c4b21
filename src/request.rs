//! Incoming HTTP request type.

use std::collections::HashMap;

use bytes::Bytes;
use http::request::Parts;
use http::{Extensions, HeaderMap, Method, Uri};

/// An incoming HTTP request with a fully buffered body.
///
/// Exclusively owned by the pipeline processing it. Interceptors pass data
/// forward to later interceptors and to the handler through
/// [`extensions_mut`](Request::extensions_mut), keyed by a private type:
///
/// ```rust
/// # use warden::Request;
/// #[derive(Clone)]
/// struct UserId(String);
///
/// # let mut req = Request::from(http::Request::new(bytes::Bytes::new()));
/// req.extensions_mut().insert(UserId("u-42".into()));
/// assert_eq!(req.extensions().get::<UserId>().map(|u| u.0.as_str()), Some("u-42"));
/// ```
pub struct Request {
    parts: Parts,
    body: Bytes,
    params: HashMap<String, String>,
}

impl Request {
    pub(crate) fn with_params(req: http::Request<Bytes>, params: HashMap<String, String>) -> Self {
        let (parts, body) = req.into_parts();
        Self { parts, body, params }
    }

    pub fn method(&self) -> &Method { &self.parts.method }
    pub fn uri(&self) -> &Uri { &self.parts.uri }
    pub fn path(&self) -> &str { self.parts.uri.path() }
    pub fn headers(&self) -> &HeaderMap { &self.parts.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// The target host without its port, from the URI authority or the
    /// `Host` header.
    pub fn host(&self) -> Option<&str> {
        target_host(&self.parts.uri, &self.parts.headers)
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.parts.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Request-scoped annotation store.
    pub fn extensions(&self) -> &Extensions { &self.parts.extensions }

    pub fn extensions_mut(&mut self) -> &mut Extensions { &mut self.parts.extensions }
}

impl From<http::Request<Bytes>> for Request {
    fn from(req: http::Request<Bytes>) -> Self {
        Self::with_params(req, HashMap::new())
    }
}

/// The host a request is addressed to, before it is wrapped in a [`Request`].
pub(crate) fn target_host<'a>(uri: &'a Uri, headers: &'a HeaderMap) -> Option<&'a str> {
    if let Some(host) = uri.host() {
        return Some(host);
    }
    let raw = headers.get(http::header::HOST)?.to_str().ok()?;
    Some(strip_port(raw))
}

/// `example.com:8443` → `example.com`, `[::1]:80` → `[::1]`.
fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.bytes().all(|b| b.is_ascii_digit()) => name,
        _ => host,
    }
}
