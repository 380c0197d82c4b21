//! Host-allow-listed request router.
//!
//! Every `(pattern, method)` is bound to its own [`Pipeline`] at setup time.
//! Request-time dispatch is a host check, one pattern-table lookup and a scan
//! over the handful of methods registered for the pattern.

use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;
use http::header::ALLOW;
use http::{HeaderValue, Method, StatusCode};
use http_body_util::Full;
use tracing::{debug, debug_span, warn};

use crate::dispatcher::Dispatcher;
use crate::handler::{Handler, boxed};
use crate::header::Header;
use crate::interceptor::{Config, Interceptor};
use crate::pattern::{Lookup, Pattern, PatternTable};
use crate::pipeline::Pipeline;
use crate::request::{Request, target_host};
use crate::response::Response;
use crate::service::RouterService;

/// Pipelines registered for one pattern, in registration order.
type MethodTable = Vec<(Method, Pipeline)>;

/// The application router.
///
/// Build it once at startup: [`install`](Router::install) every interceptor
/// first, then register routes with [`handle`](Router::handle). Each call
/// returns `self` so registrations chain naturally. Once built, the router is
/// read-only and may be shared by any number of concurrent requests.
///
/// ```rust
/// use warden::{DefaultDispatcher, Method, Outcome, Request, ResponseWriter, Router};
///
/// fn hello(w: &mut ResponseWriter, _: &Request) -> Outcome {
///     w.write_json(&"hello")
/// }
///
/// let router = Router::new(DefaultDispatcher, ["example.com"])
///     .handle("/hello", Method::GET, hello);
///
/// let res = router.dispatch(
///     http::Request::get("/hello")
///         .header("host", "example.com")
///         .body(bytes::Bytes::new())
///         .unwrap(),
/// );
/// assert_eq!(res.status(), 200);
/// ```
pub struct Router {
    domains: HashSet<String>,
    dispatcher: Arc<dyn Dispatcher>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    table: PatternTable<MethodTable>,
    routes: usize,
}

impl Router {
    /// A router that only answers requests addressed to one of `domains`.
    /// Every other host gets an empty 404.
    pub fn new<D>(dispatcher: impl Dispatcher, domains: D) -> Self
    where
        D: IntoIterator,
        D::Item: AsRef<str>,
    {
        let domains = domains
            .into_iter()
            .map(|d| d.as_ref().to_ascii_lowercase())
            .collect();
        Self {
            domains,
            dispatcher: Arc::new(dispatcher),
            interceptors: Vec::new(),
            table: PatternTable::new(),
            routes: 0,
        }
    }

    /// Appends `interceptor` to the pipeline of every handler registered
    /// after this call. Installation order is pipeline order.
    pub fn install(mut self, interceptor: impl Interceptor) -> Self {
        if self.routes > 0 {
            warn!(
                interceptor = interceptor.name(),
                routes = self.routes,
                "interceptor installed after routes were registered; earlier routes will not run it"
            );
        }
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Registers `handler` for `method` on `pattern`.
    ///
    /// Patterns are `[host]/rooted/path`. A trailing `/` matches the whole
    /// subtree; `{name}` segments are read back with [`Request::param`]:
    ///
    /// ```rust
    /// # use warden::{DefaultDispatcher, Method, Outcome, Request, ResponseWriter, Router};
    /// # fn get_user(_: &mut ResponseWriter, _: &Request) -> Outcome { Outcome::not_written() }
    /// # fn assets(_: &mut ResponseWriter, _: &Request) -> Outcome { Outcome::not_written() }
    /// # fn search(_: &mut ResponseWriter, _: &Request) -> Outcome { Outcome::not_written() }
    /// Router::new(DefaultDispatcher, ["example.com", "api.example.com"])
    ///     .handle("/users/{id}",         Method::GET, get_user)
    ///     .handle("/assets/",            Method::GET, assets)
    ///     .handle("api.example.com/search", Method::GET, search);
    /// ```
    ///
    /// # Panics
    ///
    /// Registration errors are programming errors and abort startup: a
    /// malformed pattern, a pattern host outside the allowed domains, a
    /// pattern that conflicts with an existing one, or a second handler for
    /// the same `(pattern, method)`.
    pub fn handle(self, pattern: &str, method: Method, handler: impl Handler) -> Self {
        self.handle_with(pattern, method, handler, Vec::new())
    }

    /// Like [`handle`](Router::handle), with per-handler interceptor
    /// configuration. Each installed interceptor gets the first of `configs`
    /// that [matches](Config::matches) it, or `None`.
    pub fn handle_with(
        mut self,
        pattern: &str,
        method: Method,
        handler: impl Handler,
        configs: Vec<Box<dyn Config>>,
    ) -> Self {
        let parsed = Pattern::parse(pattern)
            .unwrap_or_else(|e| panic!("invalid route `{pattern}`: {e}"));
        if let Some(host) = parsed.host() {
            if !self.domains.contains(host) {
                panic!("invalid route `{pattern}`: host `{host}` is not an allowed domain");
            }
        }

        let configs: Vec<Arc<dyn Config>> = configs.into_iter().map(Arc::from).collect();
        let pipeline = Pipeline::assemble(&self.interceptors, boxed(handler), &configs);

        let methods = self
            .table
            .entry_or_insert_with(&parsed, Vec::new)
            .unwrap_or_else(|e| panic!("invalid route `{pattern}`: {e}"));
        if methods.iter().any(|(m, _)| *m == method) {
            panic!("{method} is already registered for `{pattern}`");
        }

        debug!(pattern, %method, interceptors = pipeline.len(), "route registered");
        methods.push((method, pipeline));
        self.routes += 1;
        self
    }

    /// Routes one buffered request and runs its pipeline.
    pub fn dispatch(&self, req: http::Request<Bytes>) -> http::Response<Full<Bytes>> {
        let span = debug_span!("dispatch", method = %req.method(), path = req.uri().path());
        let _guard = span.enter();
        self.route(req).into_http()
    }

    /// Wraps the router in a hyper service. See [`RouterService`].
    pub fn into_service(self) -> RouterService {
        RouterService::new(self)
    }

    fn route(&self, req: http::Request<Bytes>) -> Response {
        let host = target_host(req.uri(), req.headers()).map(str::to_ascii_lowercase);
        let Some(host) = host.filter(|h| self.domains.contains(h)) else {
            debug!("host is not an allowed domain");
            return Response::empty(StatusCode::NOT_FOUND);
        };

        match self.table.lookup(&host, req.uri().path()) {
            Lookup::NotFound => {
                debug!("no route");
                Response::empty(StatusCode::NOT_FOUND)
            }
            Lookup::Invalid => {
                debug!("request target is not a rooted path");
                Response::empty(StatusCode::BAD_REQUEST)
            }
            Lookup::Redirect(path) => redirect(path, req.uri().query()),
            Lookup::Found { value: methods, params } => {
                let Some((_, pipeline)) = methods.iter().find(|(m, _)| m == req.method()) else {
                    debug!("method not allowed");
                    return not_allowed(methods);
                };
                debug!("running pipeline");
                pipeline.run(&self.dispatcher, Request::with_params(req, params))
            }
        }
    }
}

fn redirect(mut path: String, query: Option<&str>) -> Response {
    if let Some(query) = query {
        path.push('?');
        path.push_str(query);
    }
    debug!(location = %path, "canonical path redirect");
    match HeaderValue::from_str(&path) {
        Ok(location) => Response::redirect(StatusCode::MOVED_PERMANENTLY, Header::new(), location),
        Err(_) => Response::empty(StatusCode::BAD_REQUEST),
    }
}

fn not_allowed(methods: &MethodTable) -> Response {
    let allow = methods
        .iter()
        .map(|(m, _)| m.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let mut res = Response::empty(StatusCode::METHOD_NOT_ALLOWED);
    if let Ok(allow) = HeaderValue::from_str(&allow) {
        res.headers.insert_framing(ALLOW, allow);
    }
    res
}
