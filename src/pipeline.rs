//! Pipeline assembly and execution.
//!
//! A [`Pipeline`] is built once per `(pattern, method)` when the route is
//! registered: every installed interceptor paired with the config bound to
//! it, plus the handler. At request time it is only iterated, never changed
//! and never searched.
//!
//! # Execution
//!
//! ```text
//! START ─▶ BEFORE(0..n) ─▶ HANDLING ─▶ COMMIT(n..0) ─▶ DONE
//!             │
//!             └─ writer written ─▶ ABORTED     (handler and commit skipped)
//!
//! HANDLING ─ writer fails to serialise ─▶ 500, commit skipped
//!
//! any stage ─ panic ─▶ FAULTED
//!                        ├─ nothing written ─▶ 500 Internal Server Error
//!                        └─ already written ─▶ panic resumed
//! ```
//!
//! Faults are caught once, here, around the whole run; never per
//! interceptor. A fault after the write cannot be turned into a clean
//! response, so it keeps unwinding into the caller.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use http::StatusCode;
use tracing::{debug, error};

use crate::dispatcher::Dispatcher;
use crate::handler::BoxedHandler;
use crate::interceptor::{Config, Interceptor};
use crate::request::Request;
use crate::response::Response;
use crate::writer::{CommitWriter, ResponseWriter};

/// One installed interceptor and the config resolved for it.
struct Stage {
    interceptor: Arc<dyn Interceptor>,
    config: Option<Arc<dyn Config>>,
}

impl Stage {
    fn config(&self) -> Option<&dyn Config> {
        self.config.as_deref()
    }
}

/// The immutable, ordered interceptor chain bound to one handler.
pub(crate) struct Pipeline {
    stages: Vec<Stage>,
    handler: BoxedHandler,
}

impl Pipeline {
    /// Binds each installed interceptor, in installation order, to the first
    /// config that matches it.
    pub(crate) fn assemble(
        installed: &[Arc<dyn Interceptor>],
        handler: BoxedHandler,
        configs: &[Arc<dyn Config>],
    ) -> Self {
        let stages = installed
            .iter()
            .map(|interceptor| Stage {
                interceptor: Arc::clone(interceptor),
                config: configs.iter().find(|c| c.matches(&**interceptor)).cloned(),
            })
            .collect();
        Self { stages, handler }
    }

    pub(crate) fn len(&self) -> usize {
        self.stages.len()
    }

    /// Runs one request through the pipeline and returns its response.
    pub(crate) fn run(&self, dispatcher: &Arc<dyn Dispatcher>, mut req: Request) -> Response {
        let mut w = ResponseWriter::new(Arc::clone(dispatcher));

        let run = panic::catch_unwind(AssertUnwindSafe(|| self.drive(&mut w, &mut req)));

        if let Err(fault) = run {
            let cause = fault_message(fault.as_ref());
            if w.is_written() {
                error!(cause, "internal fault after the response was written");
                panic::resume_unwind(fault);
            }
            error!(cause, "recovered internal fault");
            let _ = w.write_error(StatusCode::INTERNAL_SERVER_ERROR);
        }

        w.finish()
    }

    fn drive(&self, w: &mut ResponseWriter, req: &mut Request) {
        for stage in &self.stages {
            let _ = stage.interceptor.before(w, req, stage.config());
            if w.is_written() {
                debug!(interceptor = stage.interceptor.name(), "request ended in before phase");
                return;
            }
        }

        let _ = self.handler.serve(w, req);
        if !w.is_written() {
            let _ = w.no_content();
        }
        if w.is_faulted() {
            debug!("handler response failed to serialise; commit skipped");
            return;
        }

        let Some(response) = w.in_flight_mut() else {
            return;
        };
        let mut commit = CommitWriter::new(response);
        for stage in self.stages.iter().rev() {
            let _ = stage.interceptor.commit(&mut commit, req, stage.config());
            if commit.is_overridden() {
                debug!(interceptor = stage.interceptor.name(), "response overridden in commit phase");
                break;
            }
        }
    }
}

fn fault_message(fault: &(dyn Any + Send)) -> &str {
    if let Some(s) = fault.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = fault.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}
