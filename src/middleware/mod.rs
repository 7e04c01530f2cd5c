//! Middleware layer.
//!
//! Middleware intercepts requests and responses and is the right place for
//! cross-cutting concerns: structured tracing, request-id injection,
//! authentication-header inspection.
//!
//! A middleware is any `async fn(Request, Next) -> impl IntoResult`. It may
//! rewrite the request, call `next.run(req)` (or not), and rewrite the
//! response that comes back:
//!
//! ```rust,no_run
//! use issac::{Error, Next, Request, Response, Router, StatusCode};
//!
//! async fn require_token(req: Request, next: Next) -> Result<Response, Error> {
//!     if req.header("authorization").is_none() {
//!         return Ok(Response::status(StatusCode::UNAUTHORIZED));
//!     }
//!     next.run(req).await
//! }
//!
//! # fn build() -> Result<(), issac::ConfigError> {
//! let mut api = Router::with_prefix("/api")?;
//! api.layer(require_token)?;
//! # Ok(()) }
//! ```
//!
//! Built-in middleware:
//! - [`trace`]: one log line per request with method, path, status and latency

mod trace;

pub use trace::trace;

use std::future::Future;

use crate::handler::{Next, Stage, stage_fn};
use crate::request::Request;
use crate::response::IntoResult;
use crate::router::Router;

/// A pipeline stage attached to a [`Router`], applied to every route in
/// its subtree.
#[derive(Clone)]
pub struct Middleware(pub(crate) Stage);

impl Middleware {
    /// Wraps a raw middleware function.
    pub fn new<F, Fut, R>(f: F) -> Self
    where
        F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoResult + 'static,
    {
        Self(stage_fn(f))
    }
}

/// Everything [`Router::layer`] and [`App::layer`](crate::App::layer) accept:
/// a router to merge or a middleware to append.
///
/// Raw functions convert into `Layer::Middleware` on the way in, so callers
/// never build this by hand.
pub enum Layer {
    Router(Router),
    Middleware(Middleware),
}

impl From<Router> for Layer {
    fn from(router: Router) -> Self {
        Self::Router(router)
    }
}

impl From<Middleware> for Layer {
    fn from(middleware: Middleware) -> Self {
        Self::Middleware(middleware)
    }
}

impl<F, Fut, R> From<F> for Layer
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResult + 'static,
{
    fn from(f: F) -> Self {
        Self::Middleware(Middleware::new(f))
    }
}
