//! # warden
//!
//! An HTTP router that makes the secure thing the only thing a handler can
//! do with its response.
//!
//! ## The contract
//!
//! Every route runs behind the same ordered chain of interceptors. Security
//! policy (auth, CSRF, CSP, static headers) lives in interceptors, written
//! once and installed once. Handlers only produce content.
//!
//! What the router guarantees for every request:
//!
//! - **Exactly one response.** A [`ResponseWriter`] accepts a single terminal
//!   write. Writing twice is a bug and panics; it never silently replaces
//!   what was already decided.
//! - **Ordered checks.** `before` runs in installation order and stops at the
//!   first interceptor that answers. `commit` runs in reverse over the
//!   handler's response, so the outermost policy has the last word.
//! - **Owned headers.** An interceptor can [`claim`](Header::claim) a header
//!   name; nobody else can touch it for the rest of the request.
//! - **Fail closed.** A panic anywhere in the pipeline becomes a bare 500 if
//!   nothing was written yet. The cause is logged, never sent.
//! - **No leaks to strangers.** Hosts outside the allowed domains get an
//!   empty 404, whatever their path.
//!
//! What warden leaves to you: the concrete policies, the serialisation
//! engine behind [`Dispatcher`], and the transport. [`Router::into_service`]
//! plugs into any hyper server.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use warden::{
//!     Config, DefaultDispatcher, Interceptor, Method, Outcome, Request, ResponseWriter,
//!     Router, StatusCode,
//! };
//!
//! struct RequireAuth;
//!
//! impl Interceptor for RequireAuth {
//!     fn before(&self, w: &mut ResponseWriter, req: &mut Request, _: Option<&dyn Config>) -> Outcome {
//!         if req.header("authorization").is_none() {
//!             return w.write_error(StatusCode::UNAUTHORIZED);
//!         }
//!         Outcome::not_written()
//!     }
//! }
//!
//! fn get_user(w: &mut ResponseWriter, req: &Request) -> Outcome {
//!     let id = req.param("id").unwrap_or("unknown");
//!     w.write_json(&serde_json::json!({ "id": id }))
//! }
//!
//! let router = Router::new(DefaultDispatcher, ["example.com"])
//!     .install(RequireAuth)
//!     .handle("/users/{id}", Method::GET, get_user);
//!
//! let service = router.into_service();
//! // Serve `service` with hyper; see demos/basic.rs.
//! # let _ = service;
//! ```

mod cookie;
mod dispatcher;
mod error;
mod handler;
mod header;
mod interceptor;
mod pattern;
mod pipeline;
mod request;
mod response;
mod router;
mod service;
mod writer;

pub use cookie::{Cookie, SameSite};
pub use dispatcher::{
    DefaultDispatcher, DispatchError, Dispatcher, Payload, SafeHtml, Template, XSSI_PREFIX,
};
pub use error::Error;
pub use handler::Handler;
pub use header::{Header, HeaderClaim};
pub use interceptor::{AsAny, Config, Interceptor};
pub use request::Request;
pub use response::{Outcome, Response};
pub use router::Router;
pub use service::RouterService;
pub use writer::{CommitWriter, ResponseWriter};

pub use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
