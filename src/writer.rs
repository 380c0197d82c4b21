//! The per-request output sink.
//!
//! A [`ResponseWriter`] is created fresh for every request and accepts
//! exactly one terminal write. The write-state only ever moves from *not
//! written* to *written*. A second terminal write is a contract violation
//! and panics; the pipeline recovers it (see [`crate::Router`]) instead of
//! silently sending a different response.
//!
//! | Operation | Status | Body |
//! |---|---|---|
//! | [`write`](ResponseWriter::write) / [`write_json`](ResponseWriter::write_json) / [`write_template`](ResponseWriter::write_template) | 200 | from the [`Dispatcher`] |
//! | [`no_content`](ResponseWriter::no_content) | 204 | empty |
//! | [`write_error`](ResponseWriter::write_error) | 4xx / 5xx only | reason phrase |
//! | [`redirect`](ResponseWriter::redirect) | 3xx only | empty |

use std::any::Any;
use std::mem;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use http::header::{CONTENT_TYPE, SET_COOKIE};
use http::{HeaderValue, StatusCode};
use serde::Serialize;
use tracing::error;

use crate::cookie::Cookie;
use crate::dispatcher::{DispatchError, Dispatcher, Payload, Template};
use crate::error::Error;
use crate::header::Header;
use crate::pattern::clean_path;
use crate::request::Request;
use crate::response::{Outcome, Response};

/// Writes the response for one request. See the [module docs](self).
pub struct ResponseWriter {
    dispatcher: Arc<dyn Dispatcher>,
    header: Header,
    response: Option<Response>,
    // The response is a 500 produced by the writer itself.
    faulted: bool,
}

impl ResponseWriter {
    /// A fresh, unwritten writer. The router makes one per request; tests of
    /// individual interceptors can make their own.
    pub fn new(dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self { dispatcher, header: Header::new(), response: None, faulted: false }
    }

    pub fn is_written(&self) -> bool {
        self.response.is_some()
    }

    /// The response produced by the terminal write, if any.
    pub fn response(&self) -> Option<&Response> {
        self.response.as_ref()
    }

    /// The headers that will be sent with the response.
    ///
    /// # Panics
    ///
    /// Panics once the response has been written.
    pub fn header(&mut self) -> &mut Header {
        assert!(self.response.is_none(), "headers cannot change after the response is written");
        &mut self.header
    }

    /// Appends a `Set-Cookie` header.
    ///
    /// # Panics
    ///
    /// Panics once the response has been written.
    pub fn set_cookie(&mut self, cookie: &Cookie) -> Result<(), Error> {
        let header = self.header();
        cookie.validate()?;
        header.append_framing(SET_COOKIE, HeaderValue::from_str(&cookie.to_string())?);
        Ok(())
    }

    /// `200 OK` with `resp` serialised by the dispatcher.
    pub fn write<R: Any>(&mut self, resp: R) -> Outcome {
        self.ensure_unwritten();
        let rendered = self.render(Payload::Value(&resp), |d, sink| d.write(sink, &resp));
        self.settle(rendered)
    }

    /// `200 OK` with `data` as JSON.
    pub fn write_json<T: Serialize + ?Sized>(&mut self, data: &T) -> Outcome {
        self.ensure_unwritten();
        let rendered = serde_json::to_value(data)
            .map_err(|e| Error::from(DispatchError::from(e)))
            .and_then(|value| {
                self.render(Payload::Json(&value), |d, sink| d.write_json(sink, &value))
            });
        self.settle(rendered)
    }

    /// `200 OK` with `template` executed against `data`.
    pub fn write_template<T: Serialize + ?Sized>(&mut self, template: &dyn Template, data: &T) -> Outcome {
        self.ensure_unwritten();
        let rendered = serde_json::to_value(data)
            .map_err(|e| Error::from(DispatchError::from(e)))
            .and_then(|value| {
                self.render(Payload::Template(template), |d, sink| {
                    d.execute_template(sink, template, &value)
                })
            });
        self.settle(rendered)
    }

    /// `204 No Content`. What a handler gets when it writes nothing.
    pub fn no_content(&mut self) -> Outcome {
        self.ensure_unwritten();
        let header = mem::take(&mut self.header);
        self.response = Some(Response::new(StatusCode::NO_CONTENT, header, Bytes::new()));
        Outcome::written()
    }

    /// An error response.
    ///
    /// # Panics
    ///
    /// Panics if `code` is not a 4xx or 5xx status.
    pub fn write_error(&mut self, code: StatusCode) -> Outcome {
        assert!(
            code.is_client_error() || code.is_server_error(),
            "write_error requires a 4xx or 5xx status, got {code}"
        );
        self.ensure_unwritten();
        self.fail(code)
    }

    /// A redirect to `url`, resolved against the request path when relative.
    ///
    /// # Panics
    ///
    /// Panics if `code` is not a 3xx status.
    pub fn redirect(&mut self, req: &Request, url: &str, code: StatusCode) -> Outcome {
        assert!(code.is_redirection(), "redirect requires a 3xx status, got {code}");
        self.ensure_unwritten();
        match HeaderValue::from_str(&resolve_location(req.path(), url)) {
            Ok(location) => {
                let header = mem::take(&mut self.header);
                self.response = Some(Response::redirect(code, header, location));
                Outcome::written()
            }
            Err(err) => {
                error!(error = %err, "redirect target is not a valid header value");
                self.fault()
            }
        }
    }

    /// Whether the written response is an internal failure of the writer
    /// rather than an answer from the caller. Commit never runs over it.
    pub(crate) fn is_faulted(&self) -> bool {
        self.faulted
    }

    pub(crate) fn in_flight_mut(&mut self) -> Option<&mut Response> {
        self.response.as_mut()
    }

    pub(crate) fn finish(self) -> Response {
        match self.response {
            Some(response) => response,
            None => Response::error(StatusCode::INTERNAL_SERVER_ERROR, self.header),
        }
    }

    fn ensure_unwritten(&self) {
        if self.response.is_some() {
            panic!("response was already written");
        }
    }

    fn render(
        &self,
        payload: Payload<'_>,
        serialize: impl FnOnce(&dyn Dispatcher, &mut BytesMut) -> Result<(), DispatchError>,
    ) -> Result<(HeaderValue, Bytes), Error> {
        let content_type = self.dispatcher.content_type(payload)?;
        let content_type = HeaderValue::from_str(&content_type)?;
        let mut sink = BytesMut::new();
        serialize(self.dispatcher.as_ref(), &mut sink)?;
        Ok((content_type, sink.freeze()))
    }

    fn settle(&mut self, rendered: Result<(HeaderValue, Bytes), Error>) -> Outcome {
        match rendered {
            Ok((content_type, body)) => {
                let mut header = mem::take(&mut self.header);
                header.insert_framing(CONTENT_TYPE, content_type);
                self.response = Some(Response::new(StatusCode::OK, header, body));
                Outcome::written()
            }
            Err(err) => {
                error!(error = %err, "response serialisation failed");
                self.fault()
            }
        }
    }

    fn fault(&mut self) -> Outcome {
        self.faulted = true;
        self.fail(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn fail(&mut self, code: StatusCode) -> Outcome {
        let header = mem::take(&mut self.header);
        self.response = Some(Response::error(code, header));
        Outcome::written()
    }
}

// ── CommitWriter ──────────────────────────────────────────────────────────────

/// The Commit-phase view of a written response.
///
/// Interceptors may adjust headers of the in-flight response, or override it
/// once with [`write_error`](CommitWriter::write_error),
/// [`redirect`](CommitWriter::redirect) or
/// [`no_content`](CommitWriter::no_content). The first override ends the
/// Commit phase; a second one panics.
pub struct CommitWriter<'a> {
    response: &'a mut Response,
    overridden: bool,
}

impl<'a> CommitWriter<'a> {
    pub(crate) fn new(response: &'a mut Response) -> Self {
        Self { response, overridden: false }
    }

    pub fn response(&self) -> &Response {
        &*self.response
    }

    pub fn header(&mut self) -> &mut Header {
        &mut self.response.headers
    }

    pub fn set_cookie(&mut self, cookie: &Cookie) -> Result<(), Error> {
        cookie.validate()?;
        let value = HeaderValue::from_str(&cookie.to_string())?;
        self.response.headers.append_framing(SET_COOKIE, value);
        Ok(())
    }

    pub fn is_overridden(&self) -> bool {
        self.overridden
    }

    /// Replaces the response with an error.
    ///
    /// # Panics
    ///
    /// Panics if `code` is not 4xx/5xx or the response was already overridden.
    pub fn write_error(&mut self, code: StatusCode) -> Outcome {
        assert!(
            code.is_client_error() || code.is_server_error(),
            "write_error requires a 4xx or 5xx status, got {code}"
        );
        self.replace(|headers| Response::error(code, headers))
    }

    /// Replaces the response with a redirect.
    ///
    /// # Panics
    ///
    /// Panics if `code` is not 3xx or the response was already overridden.
    pub fn redirect(&mut self, req: &Request, url: &str, code: StatusCode) -> Outcome {
        assert!(code.is_redirection(), "redirect requires a 3xx status, got {code}");
        match HeaderValue::from_str(&resolve_location(req.path(), url)) {
            Ok(location) => self.replace(|headers| Response::redirect(code, headers, location)),
            Err(err) => {
                error!(error = %err, "redirect target is not a valid header value");
                self.replace(|headers| Response::error(StatusCode::INTERNAL_SERVER_ERROR, headers))
            }
        }
    }

    /// Replaces the response with `204 No Content`.
    pub fn no_content(&mut self) -> Outcome {
        self.replace(|headers| Response::new(StatusCode::NO_CONTENT, headers, Bytes::new()))
    }

    fn replace(&mut self, build: impl FnOnce(Header) -> Response) -> Outcome {
        if self.overridden {
            panic!("response was already overridden during commit");
        }
        self.overridden = true;
        let mut headers = mem::take(&mut self.response.headers);
        // Framing from the handler's write does not describe the new body.
        headers.remove_framing(&CONTENT_TYPE);
        *self.response = build(headers);
        Outcome::written()
    }
}

/// Resolves a redirect target the way browsers resolve a relative link
/// found at `path`.
fn resolve_location(path: &str, url: &str) -> String {
    if url.starts_with('/') || url.contains("://") {
        return url.to_owned();
    }
    let (target, query) = match url.split_once('?') {
        Some((target, query)) => (target, Some(query)),
        None => (url, None),
    };
    let dir = &path[..path.rfind('/').map_or(0, |i| i + 1)];
    let mut joined = format!("{dir}{target}");
    if !joined.starts_with('/') {
        joined.insert(0, '/');
    }
    let cleaned = clean_path(&joined);
    match query {
        Some(query) => format!("{cleaned}?{query}"),
        None => cleaned,
    }
}
