//! Response serialisation.
//!
//! The [`ResponseWriter`](crate::ResponseWriter) never turns a value into
//! bytes itself. It asks a [`Dispatcher`] for the content type, then asks it
//! to serialise into the response body. Swapping the dispatcher is how an
//! application decides which response types are safe to send.
//!
//! [`DefaultDispatcher`] accepts three things:
//!
//! | Payload | Content-Type |
//! |---|---|
//! | [`SafeHtml`] value | `text/html; charset=utf-8` |
//! | JSON (`write_json`) | `application/json; charset=utf-8`, XSSI-prefixed |
//! | [`Template`] | `text/html; charset=utf-8` |
//!
//! Anything else is refused with [`DispatchError::Unsupported`].

use std::any::Any;

use bytes::BytesMut;
use serde_json::Value;

/// Prefix written before every JSON body so the response cannot be
/// included cross-origin as a script.
pub const XSSI_PREFIX: &[u8] = b")]}',\n";

/// A serialisation failure reported by a [`Dispatcher`].
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("unsupported response value")]
    Unsupported,
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("template: {0}")]
    Template(String),
}

/// What the writer is about to send, as seen by [`Dispatcher::content_type`].
pub enum Payload<'a> {
    Value(&'a dyn Any),
    Json(&'a Value),
    Template(&'a dyn Template),
}

/// A renderable template. Template engines plug in here.
pub trait Template: Send + Sync {
    fn execute(&self, sink: &mut BytesMut, data: &Value) -> Result<(), DispatchError>;
}

impl<F> Template for F
where
    F: Fn(&mut BytesMut, &Value) -> Result<(), DispatchError> + Send + Sync,
{
    fn execute(&self, sink: &mut BytesMut, data: &Value) -> Result<(), DispatchError> {
        (self)(sink, data)
    }
}

/// Serialises response values into bytes and names their content type.
///
/// Shared by every request on a router, so implementations must not keep
/// per-request state.
pub trait Dispatcher: Send + Sync + 'static {
    fn content_type(&self, payload: Payload<'_>) -> Result<String, DispatchError>;

    fn write(&self, sink: &mut BytesMut, resp: &dyn Any) -> Result<(), DispatchError>;

    fn write_json(&self, sink: &mut BytesMut, data: &Value) -> Result<(), DispatchError>;

    fn execute_template(
        &self,
        sink: &mut BytesMut,
        template: &dyn Template,
        data: &Value,
    ) -> Result<(), DispatchError>;
}

// ── SafeHtml ──────────────────────────────────────────────────────────────────

/// HTML that is safe to send as-is.
///
/// Either escaped from untrusted text, or a `&'static str` the programmer
/// wrote into the binary. There is no way to wrap an arbitrary runtime
/// `String` without escaping it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SafeHtml(String);

impl SafeHtml {
    /// Escapes `text` so it renders literally.
    pub fn escaped(text: &str) -> Self {
        let mut out = String::with_capacity(text.len());
        for c in text.chars() {
            match c {
                '&'  => out.push_str("&amp;"),
                '<'  => out.push_str("&lt;"),
                '>'  => out.push_str("&gt;"),
                '"'  => out.push_str("&#34;"),
                '\'' => out.push_str("&#39;"),
                c    => out.push(c),
            }
        }
        Self(out)
    }

    /// Wraps markup that is part of the program itself.
    pub fn constant(markup: &'static str) -> Self {
        Self(markup.to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// ── DefaultDispatcher ─────────────────────────────────────────────────────────

/// The dispatcher used unless the application supplies its own.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultDispatcher;

impl Dispatcher for DefaultDispatcher {
    fn content_type(&self, payload: Payload<'_>) -> Result<String, DispatchError> {
        match payload {
            Payload::Value(v) if v.is::<SafeHtml>() => Ok("text/html; charset=utf-8".to_owned()),
            Payload::Value(_) => Err(DispatchError::Unsupported),
            Payload::Json(_) => Ok("application/json; charset=utf-8".to_owned()),
            Payload::Template(_) => Ok("text/html; charset=utf-8".to_owned()),
        }
    }

    fn write(&self, sink: &mut BytesMut, resp: &dyn Any) -> Result<(), DispatchError> {
        let html = resp.downcast_ref::<SafeHtml>().ok_or(DispatchError::Unsupported)?;
        sink.extend_from_slice(html.as_str().as_bytes());
        Ok(())
    }

    fn write_json(&self, sink: &mut BytesMut, data: &Value) -> Result<(), DispatchError> {
        let body = serde_json::to_vec(data)?;
        sink.extend_from_slice(XSSI_PREFIX);
        sink.extend_from_slice(&body);
        Ok(())
    }

    fn execute_template(
        &self,
        sink: &mut BytesMut,
        template: &dyn Template,
        data: &Value,
    ) -> Result<(), DispatchError> {
        template.execute(sink, data)
    }
}
