//! Unified error type.

use http::HeaderName;
use http::header::{InvalidHeaderName, InvalidHeaderValue};

use crate::dispatcher::DispatchError;

/// The error type returned by warden's fallible operations.
///
/// Application-level outcomes (403, 404, etc.) are terminal writes on the
/// [`ResponseWriter`](crate::ResponseWriter), not `Error`s. This type surfaces
/// the failures a caller is expected to detect and handle: losing a header
/// claim, malformed header material, or a response value the
/// [`Dispatcher`](crate::Dispatcher) refused.
///
/// Contract violations (writing a response twice, a redirect with a 404) are
/// not represented here. They panic and are recovered by the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Another component already owns this header for the current request.
    #[error("header `{0}` is already claimed")]
    HeaderClaimed(HeaderName),

    /// The header may only be written through a dedicated method
    /// (e.g. `Set-Cookie` through [`ResponseWriter::set_cookie`](crate::ResponseWriter::set_cookie)).
    #[error("header `{0}` cannot be modified directly")]
    ImmutableHeader(HeaderName),

    #[error("invalid header name: {0}")]
    InvalidHeaderName(#[from] InvalidHeaderName),

    #[error("invalid header value: {0}")]
    InvalidHeaderValue(#[from] InvalidHeaderValue),

    #[error("invalid cookie: {0}")]
    InvalidCookie(String),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// The request body could not be read off the connection.
    #[error("request body: {0}")]
    Body(String),
}
