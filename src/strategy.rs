//! The wiring object (`spec.md` §4.G): `session`, `authenticate`,
//! `wrap_error`, `new_connection`, `max_memory_receiver`, and the root
//! dispatcher. Grounded on `examples/original_source/oahttp/router.py`'s
//! `HttpStrategy` class.

use std::sync::Arc;

use crate::config::Config;
use crate::error::Error;
use crate::request::Request;
use crate::response::Response;
use crate::router::{self, Router};

/// Session and authentication are opaque hooks the core calls but never
/// implements (`spec.md` §1 "Out of scope"). Defaulting to no-ops keeps a
/// bare `Strategy` usable standalone.
pub struct Strategy {
    pub router: Router,
    pub config: Arc<Config>,
    session: Option<Box<dyn Fn(&str) -> Option<String>>>,
    authenticate: Option<Box<dyn Fn(&Request) -> bool>>,
}

impl Strategy {
    pub fn new(router: Router, config: Arc<Config>) -> Strategy {
        Strategy { router, config, session: None, authenticate: None }
    }

    pub fn with_session(mut self, f: impl Fn(&str) -> Option<String> + 'static) -> Self {
        self.session = Some(Box::new(f));
        self
    }

    pub fn with_authenticate(mut self, f: impl Fn(&Request) -> bool + 'static) -> Self {
        self.authenticate = Some(Box::new(f));
        self
    }

    pub fn session(&self, sid: &str) -> Option<String> {
        self.session.as_ref().and_then(|f| f(sid))
    }

    pub fn authenticate(&self, request: &Request) -> bool {
        self.authenticate.as_ref().map(|f| f(request)).unwrap_or(true)
    }

    pub fn max_memory_receiver(&self) -> usize {
        self.config.max_in_memory_body
    }

    /// Converts any core-level failure into a response (`spec.md` §7
    /// "HandlerException"): a raised `Response` is sent as-is; everything
    /// else is wrapped into a `5xx`.
    pub fn wrap_error(&self, err: Error) -> Response {
        match err {
            Error::Response(resp) => resp,
            Error::NotImplemented(_) => Response::not_implemented(),
            Error::HandlerTimeout => Response::service_unavailable(None),
            Error::BufferFull | Error::LimitExceeded => Response::uri_too_long(),
            Error::Syntax(_) => Response::bad_request(),
            Error::TransportLost | Error::Io(_) => Response::internal_server_error(),
        }
    }

    /// Routes one request, handling the `OPTIONS *` / `TRACE` defaults
    /// before falling through to the router (`spec.md` §4.E).
    pub async fn dispatch(&self, request: &mut Request) -> Response {
        if router::is_asterisk_options(request) {
            return router::default_asterisk_response();
        }
        if request.method == "TRACE" {
            return router::default_trace_response(request, self.config.trace_enabled);
        }
        self.router.dispatch(request).await
    }
}
