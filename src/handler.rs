//! The handler contract.
//!
//! A handler sits at the end of a pipeline. It receives the request after
//! every `before` interceptor let it through, and answers through the
//! [`ResponseWriter`]:
//!
//! ```text
//! fn name(w: &mut ResponseWriter, req: &Request) -> Outcome
//! ```
//!
//! Returning without writing is not an error: the pipeline answers
//! `204 No Content` on the handler's behalf.
//!
//! The router stores handlers of different types side by side, so each one is
//! erased behind an `Arc<dyn Handler>`: one vtable call per request and one
//! allocation at registration time.

use std::sync::Arc;

use crate::request::Request;
use crate::response::Outcome;
use crate::writer::ResponseWriter;

/// Implemented for every valid route handler.
///
/// Satisfied automatically by any `fn` or closure with the signature above.
/// Closures need their parameter types spelled out so they are generic over
/// the borrow lifetimes:
///
/// ```rust
/// use warden::{Outcome, Request, ResponseWriter};
///
/// let hello = |w: &mut ResponseWriter, _req: &Request| -> Outcome {
///     w.write_json(&"hello")
/// };
/// # fn assert_handler(_: impl warden::Handler) {}
/// # assert_handler(hello);
/// ```
///
/// Implement it directly for handlers that carry shared, read-only state.
pub trait Handler: Send + Sync + 'static {
    fn serve(&self, w: &mut ResponseWriter, req: &Request) -> Outcome;
}

impl<F> Handler for F
where
    F: Fn(&mut ResponseWriter, &Request) -> Outcome + Send + Sync + 'static,
{
    fn serve(&self, w: &mut ResponseWriter, req: &Request) -> Outcome {
        (self)(w, req)
    }
}

/// A type-erased handler shared across concurrent requests.
pub(crate) type BoxedHandler = Arc<dyn Handler>;

pub(crate) fn boxed(handler: impl Handler) -> BoxedHandler {
    Arc::new(handler)
}
