//! Minimal warden server: two interceptors and a few routes behind hyper.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example basic
//!
//! Try:
//!   curl -i http://localhost:3000/
//!   curl -i http://localhost:3000/users/42                         # 401
//!   curl -i -H 'authorization: Bearer alice' http://localhost:3000/users/42
//!   curl -i http://localhost:3000/static                          # 301 → /static/
//!   curl -i -H 'authorization: Bearer alice' http://localhost:3000/boom   # 500
//!   curl -i -H 'host: evil.example' http://localhost:3000/        # 404

use std::net::SocketAddr;

use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info};
use warden::{
    CommitWriter, Config, DefaultDispatcher, Interceptor, Method, Outcome, Request,
    ResponseWriter, Router, SafeHtml, StatusCode,
};

// ── Interceptors ─────────────────────────────────────────────────────────────

/// Sets the same hardening headers on every response, and owns them.
struct StaticHeaders;

const HARDENING: &[(&str, &str)] = &[
    ("x-frame-options", "DENY"),
    ("referrer-policy", "no-referrer"),
    ("cross-origin-opener-policy", "same-origin"),
];

impl Interceptor for StaticHeaders {
    fn before(&self, w: &mut ResponseWriter, _: &mut Request, _: Option<&dyn Config>) -> Outcome {
        for (name, value) in HARDENING {
            let claimed = w.header().claim(name).and_then(|claim| w.header().set_claimed(&claim, value));
            if let Err(e) = claimed {
                error!(error = %e, "static header lost");
                return w.write_error(StatusCode::INTERNAL_SERVER_ERROR);
            }
        }
        Outcome::not_written()
    }

    fn commit(&self, w: &mut CommitWriter<'_>, _: &Request, _: Option<&dyn Config>) -> Outcome {
        for (name, value) in HARDENING {
            if w.header().get(name) != Some(*value) {
                error!(header = name, "hardening header changed after before phase");
                return w.write_error(StatusCode::INTERNAL_SERVER_ERROR);
            }
        }
        Outcome::not_written()
    }
}

/// Rejects requests without a bearer token and records the caller.
struct RequireAuth;

/// Per-route opt-out of [`RequireAuth`].
struct Public;

impl Config for Public {
    fn matches(&self, interceptor: &dyn Interceptor) -> bool {
        interceptor.is::<RequireAuth>()
    }
}

#[derive(Clone)]
struct Caller(String);

impl Interceptor for RequireAuth {
    fn before(&self, w: &mut ResponseWriter, req: &mut Request, cfg: Option<&dyn Config>) -> Outcome {
        if cfg.and_then(|c| c.downcast_ref::<Public>()).is_some() {
            return Outcome::not_written();
        }
        let Some(token) = req.header("authorization").and_then(|v| v.strip_prefix("Bearer ")) else {
            return w.write_error(StatusCode::UNAUTHORIZED);
        };
        let caller = Caller(token.to_owned());
        req.extensions_mut().insert(caller);
        Outcome::not_written()
    }
}

// ── Handlers ─────────────────────────────────────────────────────────────────

fn home(w: &mut ResponseWriter, _: &Request) -> Outcome {
    w.write(SafeHtml::constant("<h1>warden</h1>"))
}

fn assets(w: &mut ResponseWriter, req: &Request) -> Outcome {
    w.write(SafeHtml::escaped(req.path()))
}

// GET /users/{id}
fn get_user(w: &mut ResponseWriter, req: &Request) -> Outcome {
    let id = req.param("id").unwrap_or("unknown");
    let caller = req.extensions().get::<Caller>().map_or("anonymous", |c| c.0.as_str());
    w.write_json(&serde_json::json!({ "id": id, "requested_by": caller }))
}

// DELETE /users/{id} → 204: saying nothing is a complete answer.
fn delete_user(_: &mut ResponseWriter, _: &Request) -> Outcome {
    Outcome::not_written()
}

fn boom(_: &mut ResponseWriter, _: &Request) -> Outcome {
    panic!("handler bug");
}

// ── Server ───────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let public = || -> Vec<Box<dyn Config>> { vec![Box::new(Public)] };

    let router = Router::new(DefaultDispatcher, ["localhost", "127.0.0.1"])
        .install(StaticHeaders)
        .install(RequireAuth)
        .handle_with("/", Method::GET, home, public())
        .handle_with("/static/", Method::GET, assets, public())
        .handle("/users/{id}", Method::GET, get_user)
        .handle("/users/{id}", Method::DELETE, delete_user)
        .handle("/boom", Method::GET, boom);

    let addr: SocketAddr = ([127, 0, 0, 1], 3000).into();
    if let Err(e) = serve(addr, router).await {
        error!(error = %e, "server error");
    }
}

/// Serves `router` until Ctrl-C. Each connection gets a clone of the same
/// service; the router behind it is shared, never copied.
async fn serve(addr: SocketAddr, router: Router) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    let service = router.into_service();
    info!(%addr, "warden listening");

    loop {
        let (stream, peer) = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            accepted = listener.accept() => accepted?,
        };

        let service = service.clone();
        tokio::spawn(async move {
            let conn = ConnBuilder::new(TokioExecutor::new());
            if let Err(e) = conn.serve_connection(TokioIo::new(stream), service).await {
                error!(%peer, "connection error: {e}");
            }
        });
    }

    info!("warden stopped");
    Ok(())
}
