use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use warden::{
    CommitWriter, Config, DefaultDispatcher, Error, Interceptor, Method, Outcome, Request,
    ResponseWriter, Router, SafeHtml, StatusCode,
};

type Log = Arc<Mutex<Vec<String>>>;

fn log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// Records both phases; optionally answers in one of them.
struct Step {
    id: &'static str,
    log: Log,
    before: Option<StatusCode>,
    commit: Option<StatusCode>,
}

impl Step {
    fn new(id: &'static str, log: &Log) -> Self {
        Self { id, log: Arc::clone(log), before: None, commit: None }
    }

    fn rejects_before(mut self, code: StatusCode) -> Self {
        self.before = Some(code);
        self
    }

    fn overrides_commit(mut self, code: StatusCode) -> Self {
        self.commit = Some(code);
        self
    }
}

impl Interceptor for Step {
    fn before(&self, w: &mut ResponseWriter, _: &mut Request, _: Option<&dyn Config>) -> Outcome {
        self.log.lock().unwrap().push(format!("{}.before", self.id));
        match self.before {
            Some(code) => w.write_error(code),
            None => Outcome::not_written(),
        }
    }

    fn commit(&self, w: &mut CommitWriter<'_>, _: &Request, _: Option<&dyn Config>) -> Outcome {
        self.log.lock().unwrap().push(format!("{}.commit", self.id));
        match self.commit {
            Some(code) => w.write_error(code),
            None => Outcome::not_written(),
        }
    }
}

/// A handler that logs its call and writes a small HTML page.
fn page(log: &Log) -> impl Fn(&mut ResponseWriter, &Request) -> Outcome + Send + Sync + 'static {
    let log = Arc::clone(log);
    move |w: &mut ResponseWriter, _: &Request| {
        log.lock().unwrap().push("handler".into());
        w.write(SafeHtml::constant("ok"))
    }
}

fn get(router: &Router, uri: &str) -> http::Response<Full<Bytes>> {
    router.dispatch(
        http::Request::get(uri)
            .header("host", "example.com")
            .body(Bytes::new())
            .unwrap(),
    )
}

async fn body(res: http::Response<Full<Bytes>>) -> Bytes {
    res.into_body().collect().await.unwrap().to_bytes()
}

fn router() -> Router {
    Router::new(DefaultDispatcher, ["example.com"])
}

// ── Phase ordering ───────────────────────────────────────────────────────────

#[test]
fn commit_runs_in_reverse_installation_order() {
    let log = log();
    let router = router()
        .install(Step::new("a", &log))
        .install(Step::new("b", &log))
        .install(Step::new("c", &log))
        .handle("/", Method::GET, page(&log));

    assert_eq!(get(&router, "/").status(), StatusCode::OK);
    assert_eq!(
        entries(&log),
        ["a.before", "b.before", "c.before", "handler", "c.commit", "b.commit", "a.commit"]
    );
}

#[test]
fn before_short_circuit_skips_handler_and_commit() {
    let log = log();
    let router = router()
        .install(Step::new("a", &log))
        .install(Step::new("b", &log).rejects_before(StatusCode::FORBIDDEN))
        .install(Step::new("c", &log))
        .handle("/", Method::GET, page(&log));

    assert_eq!(get(&router, "/").status(), StatusCode::FORBIDDEN);
    assert_eq!(entries(&log), ["a.before", "b.before"]);
}

#[test]
fn first_commit_override_halts_traversal() {
    let log = log();
    let router = router()
        .install(Step::new("a", &log))
        .install(Step::new("b", &log).overrides_commit(StatusCode::FORBIDDEN))
        .install(Step::new("c", &log))
        .handle("/", Method::GET, page(&log));

    let res = get(&router, "/");
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(res.headers()["content-type"], "text/plain; charset=utf-8");
    assert_eq!(
        entries(&log),
        ["a.before", "b.before", "c.before", "handler", "c.commit", "b.commit"]
    );
}

#[test]
fn only_interceptors_installed_before_a_route_wrap_it() {
    let log = log();
    let router = router()
        .install(Step::new("a", &log))
        .handle("/early", Method::GET, page(&log))
        .install(Step::new("late", &log))
        .handle("/late", Method::GET, page(&log));

    let _ = get(&router, "/early");
    assert_eq!(entries(&log), ["a.before", "handler", "a.commit"]);

    log.lock().unwrap().clear();
    let _ = get(&router, "/late");
    assert_eq!(
        entries(&log),
        ["a.before", "late.before", "handler", "late.commit", "a.commit"]
    );
}

// ── Auth scenario ────────────────────────────────────────────────────────────

struct LoggingOnly(Log);

impl Interceptor for LoggingOnly {
    fn before(&self, _: &mut ResponseWriter, req: &mut Request, _: Option<&dyn Config>) -> Outcome {
        self.0.lock().unwrap().push(format!("saw {}", req.path()));
        Outcome::not_written()
    }

    fn commit(&self, _: &mut CommitWriter<'_>, _: &Request, _: Option<&dyn Config>) -> Outcome {
        self.0.lock().unwrap().push("logging.commit".into());
        Outcome::not_written()
    }
}

struct AuthCheck;

#[derive(Clone)]
struct User(String);

impl Interceptor for AuthCheck {
    fn before(&self, w: &mut ResponseWriter, req: &mut Request, cfg: Option<&dyn Config>) -> Outcome {
        if cfg.and_then(|c| c.downcast_ref::<SkipAuth>()).is_some() {
            return Outcome::not_written();
        }
        let Some(user) = req.header("x-user").map(str::to_owned) else {
            return w.write_error(StatusCode::FORBIDDEN);
        };
        req.extensions_mut().insert(User(user));
        Outcome::not_written()
    }
}

struct SkipAuth;

impl Config for SkipAuth {
    fn matches(&self, interceptor: &dyn Interceptor) -> bool {
        interceptor.is::<AuthCheck>()
    }
}

fn whoami(w: &mut ResponseWriter, req: &Request) -> Outcome {
    let user = req.extensions().get::<User>().map_or("nobody", |u| u.0.as_str());
    w.write_json(&user)
}

#[test]
fn missing_credential_is_forbidden_without_running_the_handler() {
    let log = log();
    let called = log.clone();
    let router = router()
        .install(LoggingOnly(log.clone()))
        .install(AuthCheck)
        .handle("/secret", Method::GET, move |w: &mut ResponseWriter, _: &Request| {
            called.lock().unwrap().push("handler".into());
            w.no_content()
        });

    assert_eq!(get(&router, "/secret").status(), StatusCode::FORBIDDEN);
    assert_eq!(entries(&log), ["saw /secret"]);
}

#[tokio::test]
async fn interceptors_hand_data_to_the_handler_through_extensions() {
    let router = router()
        .install(AuthCheck)
        .handle("/me", Method::GET, whoami);

    let res = router.dispatch(
        http::Request::get("/me")
            .header("host", "example.com")
            .header("x-user", "alice")
            .body(Bytes::new())
            .unwrap(),
    );
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(&body(res).await[..], b")]}',\n\"alice\"");
}

#[test]
fn config_reaches_only_the_interceptor_it_matches() {
    let log = log();
    let router = router()
        .install(LoggingOnly(log.clone()))
        .install(AuthCheck)
        .handle_with("/public", Method::GET, whoami, vec![Box::new(SkipAuth)]);

    assert_eq!(get(&router, "/public").status(), StatusCode::OK);
    assert_eq!(entries(&log), ["saw /public", "logging.commit"]);
}

// ── Silence and faults ───────────────────────────────────────────────────────

#[tokio::test]
async fn silent_handler_answers_no_content() {
    let router = router().handle("/", Method::GET, |_: &mut ResponseWriter, _: &Request| {
        Outcome::not_written()
    });
    let res = get(&router, "/");
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert!(body(res).await.is_empty());
}

/// Sets a header in before and another in commit.
struct Marks;

impl Interceptor for Marks {
    fn before(&self, w: &mut ResponseWriter, _: &mut Request, _: Option<&dyn Config>) -> Outcome {
        let _ = w.header().set("x-before", "1");
        Outcome::not_written()
    }

    fn commit(&self, w: &mut CommitWriter<'_>, _: &Request, _: Option<&dyn Config>) -> Outcome {
        let _ = w.header().set("x-commit", "1");
        Outcome::not_written()
    }
}

#[tokio::test]
async fn handler_panic_before_writing_is_a_generic_500() {
    let router = router()
        .install(Marks)
        .handle("/", Method::GET, |_: &mut ResponseWriter, _: &Request| -> Outcome {
            panic!("database password is hunter2");
        });

    let res = get(&router, "/");
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.headers()["x-before"], "1");
    assert!(res.headers().get("x-commit").is_none());
    assert_eq!(&body(res).await[..], b"Internal Server Error\n");
}

/// Tries to turn whatever the handler produced into a 204.
struct Silencer(Log);

impl Interceptor for Silencer {
    fn before(&self, _: &mut ResponseWriter, _: &mut Request, _: Option<&dyn Config>) -> Outcome {
        Outcome::not_written()
    }

    fn commit(&self, w: &mut CommitWriter<'_>, _: &Request, _: Option<&dyn Config>) -> Outcome {
        self.0.lock().unwrap().push("silencer.commit".into());
        w.no_content()
    }
}

#[tokio::test]
async fn serialisation_failure_cannot_be_overridden_in_commit() {
    let log = log();
    let router = router()
        .install(Silencer(log.clone()))
        .handle("/", Method::GET, |w: &mut ResponseWriter, _: &Request| {
            // Plain strings are not an accepted response value.
            w.write("not safe html")
        });

    let res = get(&router, "/");
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(entries(&log).is_empty());
    assert_eq!(&body(res).await[..], b"Internal Server Error\n");
}

#[test]
fn commit_still_runs_over_explicit_handler_errors() {
    let log = log();
    let router = router()
        .install(Silencer(log.clone()))
        .handle("/", Method::GET, |w: &mut ResponseWriter, _: &Request| {
            w.write_error(StatusCode::NOT_FOUND)
        });

    assert_eq!(get(&router, "/").status(), StatusCode::NO_CONTENT);
    assert_eq!(entries(&log), ["silencer.commit"]);
}

#[test]
fn panic_in_before_is_recovered() {
    struct Broken;
    impl Interceptor for Broken {
        fn before(&self, _: &mut ResponseWriter, _: &mut Request, _: Option<&dyn Config>) -> Outcome {
            panic!("broken interceptor");
        }
    }

    let log = log();
    let router = router().install(Broken).handle("/", Method::GET, page(&log));
    assert_eq!(get(&router, "/").status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(entries(&log).is_empty());
}

#[test]
fn double_write_propagates_the_fault() {
    let router = router().handle("/", Method::GET, |w: &mut ResponseWriter, _: &Request| {
        let _ = w.no_content();
        w.write_error(StatusCode::NOT_FOUND)
    });

    let outcome = catch_unwind(AssertUnwindSafe(|| get(&router, "/")));
    assert!(outcome.is_err());
}

#[test]
fn second_write_in_before_propagates_the_fault() {
    struct Greedy;
    impl Interceptor for Greedy {
        fn before(&self, w: &mut ResponseWriter, _: &mut Request, _: Option<&dyn Config>) -> Outcome {
            let _ = w.write_error(StatusCode::FORBIDDEN);
            w.write_error(StatusCode::UNAUTHORIZED)
        }
    }

    let log = log();
    let router = router().install(Greedy).handle("/", Method::GET, page(&log));
    assert!(catch_unwind(AssertUnwindSafe(|| get(&router, "/"))).is_err());
}

// ── Header ownership ─────────────────────────────────────────────────────────

/// Claims the CSP header and reports whether the claim held.
struct Csp {
    policy: &'static str,
    log: Log,
}

impl Interceptor for Csp {
    fn before(&self, w: &mut ResponseWriter, _: &mut Request, _: Option<&dyn Config>) -> Outcome {
        let result = w
            .header()
            .claim("content-security-policy")
            .and_then(|claim| w.header().set_claimed(&claim, self.policy));
        let line = match result {
            Ok(()) => format!("{} claimed", self.policy),
            Err(Error::HeaderClaimed(_)) => format!("{} conflict", self.policy),
            Err(e) => format!("{} {e}", self.policy),
        };
        self.log.lock().unwrap().push(line);
        Outcome::not_written()
    }
}

#[test]
fn second_claim_of_a_header_conflicts() {
    let log = log();
    let router = router()
        .install(Csp { policy: "default-src 'self'", log: log.clone() })
        .install(Csp { policy: "default-src *", log: log.clone() })
        .handle("/", Method::GET, |w: &mut ResponseWriter, _: &Request| {
            // The handler cannot quietly weaken the policy either.
            assert!(matches!(
                w.header().set("content-security-policy", "default-src *"),
                Err(Error::HeaderClaimed(_))
            ));
            w.no_content()
        });

    let res = get(&router, "/");
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert_eq!(res.headers()["content-security-policy"], "default-src 'self'");
    assert_eq!(entries(&log), ["default-src 'self' claimed", "default-src * conflict"]);
}

/// Owns the CSP header, and keeps its claim around after the request ends.
struct Hoarder {
    kept: Mutex<Option<warden::HeaderClaim>>,
    log: Log,
}

impl Interceptor for Hoarder {
    fn before(&self, w: &mut ResponseWriter, _: &mut Request, _: Option<&dyn Config>) -> Outcome {
        let mut kept = self.kept.lock().unwrap();
        if let Some(stale) = kept.as_ref() {
            let replayed = w.header().set_claimed(stale, "default-src *");
            self.log.lock().unwrap().push(format!("replay ok: {}", replayed.is_ok()));
        }
        if let Ok(claim) = w.header().claim("content-security-policy") {
            let _ = w.header().set_claimed(&claim, "default-src 'self'");
            *kept = Some(claim);
        }
        Outcome::not_written()
    }
}

#[test]
fn claims_do_not_outlive_their_request() {
    let log = log();
    let router = router()
        .install(Hoarder { kept: Mutex::new(None), log: log.clone() })
        .handle("/", Method::GET, |w: &mut ResponseWriter, _: &Request| w.no_content());

    let _ = get(&router, "/");
    let res = get(&router, "/");
    assert_eq!(res.headers()["content-security-policy"], "default-src 'self'");
    assert_eq!(entries(&log), ["replay ok: false"]);
}
