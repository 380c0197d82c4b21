//! The in-flight response and the write-state marker.
//!
//! Handlers and interceptors never build a [`Response`] themselves. They call
//! the terminal operations on [`ResponseWriter`](crate::ResponseWriter), which
//! produces exactly one `Response` per request. Commit-phase interceptors then
//! see it through [`CommitWriter`](crate::CommitWriter) before it is handed to
//! the connection.

use bytes::Bytes;
use http::header::{CONTENT_TYPE, LOCATION, X_CONTENT_TYPE_OPTIONS};
use http::{HeaderValue, StatusCode};
use http_body_util::Full;

use crate::header::Header;

// ── Outcome ───────────────────────────────────────────────────────────────────

/// Control-flow marker returned by handlers, `before` and `commit`.
///
/// Two classes only: *not written* (carry on) and *written* (a terminal
/// response exists, stop). The only way to obtain a *written* outcome is to
/// perform a terminal write, so it cannot be forged. The pipeline trusts the
/// writer's own state, not this value, when deciding whether to stop.
#[must_use = "return the outcome of the write to the pipeline"]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Outcome {
    written: bool,
}

impl Outcome {
    /// Nothing was written; the next stage runs.
    pub fn not_written() -> Self {
        Self { written: false }
    }

    pub(crate) fn written() -> Self {
        Self { written: true }
    }

    pub fn is_written(self) -> bool {
        self.written
    }
}

// ── Response ─────────────────────────────────────────────────────────────────

/// A terminal response: status, guarded headers, serialised body.
#[derive(Debug)]
pub struct Response {
    pub(crate) status: StatusCode,
    pub(crate) headers: Header,
    pub(crate) body: Bytes,
}

impl Response {
    pub(crate) fn new(status: StatusCode, headers: Header, body: Bytes) -> Self {
        Self { status, headers, body }
    }

    /// Status-only response with no body and no headers. Used for the
    /// router's own 404/405 answers, which must not leak anything.
    pub(crate) fn empty(status: StatusCode) -> Self {
        Self::new(status, Header::new(), Bytes::new())
    }

    /// Minimal `text/plain` error: the reason phrase and a newline.
    pub(crate) fn error(status: StatusCode, mut headers: Header) -> Self {
        headers.insert_framing(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
        headers.insert_framing(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
        let reason = status.canonical_reason().unwrap_or("Error");
        Self::new(status, headers, Bytes::from(format!("{reason}\n")))
    }

    pub(crate) fn redirect(status: StatusCode, mut headers: Header, location: HeaderValue) -> Self {
        headers.insert_framing(LOCATION, location);
        Self::new(status, headers, Bytes::new())
    }

    pub fn status(&self) -> StatusCode { self.status }
    pub fn header(&self) -> &Header { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    pub(crate) fn into_http(self) -> http::Response<Full<Bytes>> {
        let mut res = http::Response::new(Full::new(self.body));
        *res.status_mut() = self.status;
        *res.headers_mut() = self.headers.into_map();
        res
    }
}
