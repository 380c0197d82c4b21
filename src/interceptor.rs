//! Interceptors and their per-handler configuration.
//!
//! An [`Interceptor`] wraps every handler registered after it was installed.
//! It runs twice per request:
//!
//! ```text
//! before:  A ─▶ B ─▶ C ─▶ handler
//! commit:                  handler ─▶ C ─▶ B ─▶ A
//! ```
//!
//! `before` may end the request early with a terminal write (e.g. a 403). In
//! that case nothing after it runs, neither the handler nor any `commit`.
//! `commit` runs in reverse over the handler's response, so the interceptor
//! installed first has the last word.
//!
//! Interceptors are shared by all in-flight requests. They must not keep
//! per-request state in `self`; pass it through
//! [`Request::extensions_mut`] instead.
//!
//! # Configuration
//!
//! A handler can tune an interceptor by passing a [`Config`] at registration.
//! Each config says which interceptor it is for via
//! [`Config::matches`]; the first matching config is bound to that interceptor
//! once, at registration. An interceptor with no matching config receives
//! `None` and applies its defaults.
//!
//! ```rust
//! use warden::{Config, Interceptor, Outcome, Request, ResponseWriter, StatusCode};
//!
//! struct RequireAuth;
//!
//! /// Opt a single route out of authentication.
//! struct Public;
//!
//! impl Config for Public {
//!     fn matches(&self, interceptor: &dyn Interceptor) -> bool {
//!         interceptor.is::<RequireAuth>()
//!     }
//! }
//!
//! impl Interceptor for RequireAuth {
//!     fn before(&self, w: &mut ResponseWriter, req: &mut Request, cfg: Option<&dyn Config>) -> Outcome {
//!         let public = cfg.and_then(|c| c.downcast_ref::<Public>()).is_some();
//!         if public || req.header("authorization").is_some() {
//!             return Outcome::not_written();
//!         }
//!         w.write_error(StatusCode::UNAUTHORIZED)
//!     }
//! }
//! ```

use std::any::Any;

use crate::request::Request;
use crate::response::Outcome;
use crate::writer::{CommitWriter, ResponseWriter};

/// Runtime type access for trait objects. Implemented for every `'static`
/// type; you never implement it yourself.
#[doc(hidden)]
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A cross-cutting security check around every handler.
pub trait Interceptor: AsAny + Send + Sync + 'static {
    /// Runs before the handler, in installation order.
    fn before(&self, w: &mut ResponseWriter, req: &mut Request, cfg: Option<&dyn Config>) -> Outcome;

    /// Runs after the handler wrote a response, in reverse installation
    /// order. The default does nothing.
    fn commit(&self, w: &mut CommitWriter<'_>, req: &Request, cfg: Option<&dyn Config>) -> Outcome {
        let _ = (w, req, cfg);
        Outcome::not_written()
    }

    /// Name used in logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

impl<'a> dyn Interceptor + 'a {
    /// Whether this interceptor is a `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.as_any().is::<T>()
    }

    /// The concrete interceptor, if it is a `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

/// Interceptor-specific data supplied when a handler is registered.
pub trait Config: AsAny + Send + Sync + 'static {
    /// Whether this config is meant for `interceptor`.
    fn matches(&self, interceptor: &dyn Interceptor) -> bool;
}

impl<'a> dyn Config + 'a {
    /// The concrete config, if it is a `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Csp;
    struct Xsrf;

    impl Interceptor for Csp {
        fn before(&self, _: &mut ResponseWriter, _: &mut Request, _: Option<&dyn Config>) -> Outcome {
            Outcome::not_written()
        }
    }

    impl Interceptor for Xsrf {
        fn before(&self, _: &mut ResponseWriter, _: &mut Request, _: Option<&dyn Config>) -> Outcome {
            Outcome::not_written()
        }
    }

    struct CspReportOnly;

    impl Config for CspReportOnly {
        fn matches(&self, interceptor: &dyn Interceptor) -> bool {
            interceptor.is::<Csp>()
        }
    }

    #[test]
    fn configs_match_by_interceptor_type() {
        let csp: Box<dyn Interceptor> = Box::new(Csp);
        let xsrf: Box<dyn Interceptor> = Box::new(Xsrf);
        assert!(CspReportOnly.matches(csp.as_ref()));
        assert!(!CspReportOnly.matches(xsrf.as_ref()));
    }

    #[test]
    fn downcasts() {
        let cfg: Box<dyn Config> = Box::new(CspReportOnly);
        assert!(cfg.downcast_ref::<CspReportOnly>().is_some());

        let csp: Box<dyn Interceptor> = Box::new(Csp);
        assert!(csp.downcast_ref::<Csp>().is_some());
        assert!(csp.downcast_ref::<Xsrf>().is_none());
        assert!(csp.name().ends_with("Csp"));
    }
}
