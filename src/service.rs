//! hyper integration.
//!
//! The pipeline itself is synchronous: every stage runs on a fully buffered
//! request. [`RouterService`] is the async edge that buffers the body and
//! hands the request to [`Router::dispatch`]. Accepting connections, TLS and
//! shutdown stay with the caller; see `demos/basic.rs` for a complete server.

use std::convert::Infallible;
use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::service::Service;
use tracing::warn;

use crate::error::Error;
use crate::router::Router;

/// A cloneable hyper [`Service`] backed by a shared [`Router`].
///
/// Never fails: routing misses, handler faults and unreadable bodies all
/// become HTTP responses.
#[derive(Clone)]
pub struct RouterService {
    router: Arc<Router>,
}

impl RouterService {
    pub(crate) fn new(router: Router) -> Self {
        Self { router: Arc::new(router) }
    }
}

impl<B> Service<http::Request<B>> for RouterService
where
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: Display,
{
    type Response = http::Response<Full<Bytes>>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Infallible>> + Send>>;

    fn call(&self, req: http::Request<B>) -> Self::Future {
        let router = Arc::clone(&self.router);
        Box::pin(async move {
            let (parts, body) = req.into_parts();
            let body = match body.collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(e) => {
                    let err = Error::Body(e.to_string());
                    warn!(error = %err, "request body could not be read");
                    let mut res = http::Response::new(Full::new(Bytes::new()));
                    *res.status_mut() = StatusCode::BAD_REQUEST;
                    return Ok(res);
                }
            };
            Ok(router.dispatch(http::Request::from_parts(parts, body)))
        })
    }
}
