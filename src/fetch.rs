//! The dispatch engine.
//!
//! One [`Fetcher::fetch`] call per request. Every request reaches exactly
//! one terminal state:
//!
//! ```text
//! RECEIVED ─→ upgrade check ─┬─→ UPGRADED                       (101, no routing)
//!                            └─→ ROUTED ─→ DISPATCHING ─┬─→ RESPONDED
//!                                                       └─→ FAILED ─→ ERROR_HANDLED
//! ```
//!
//! Failures from the scheduler, the handshake, middleware and handlers
//! (returned errors *and* panics) are caught here and nowhere else, then
//! handed to the [`EventHandler`]. If that fails too, the client gets a bare
//! `500`.

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;

use futures_util::FutureExt;
use http::StatusCode;
use tracing::{Instrument, debug, error, info_span};

use crate::error::{BoxError, Error};
use crate::event::EventHandler;
use crate::handler::{Handler, Next, Stage};
use crate::request::{Request, RequestInfo};
use crate::response::Response;
use crate::router::Router;
use crate::ws;

/// What an [`UpgradeScheduler`] may return: a plain `bool` or a
/// `Result<bool, E>`.
pub trait IntoDecision {
    fn into_decision(self) -> Result<bool, BoxError>;
}

impl IntoDecision for bool {
    fn into_decision(self) -> Result<bool, BoxError> {
        Ok(self)
    }
}

impl<E: Into<BoxError>> IntoDecision for Result<bool, E> {
    fn into_decision(self) -> Result<bool, BoxError> {
        self.map_err(Into::into)
    }
}

/// Decides, before routing, whether a request becomes a WebSocket.
///
/// Implemented for any `Fn(&Request) -> bool` or
/// `Fn(&Request) -> Result<bool, E>`. An error or a panic is a hard failure
/// reported as [`Error::Upgrade`]; the request is not routed.
pub trait UpgradeScheduler: Send + Sync + 'static {
    fn should_upgrade(&self, req: &Request) -> Result<bool, BoxError>;
}

impl<F, R> UpgradeScheduler for F
where
    F: Fn(&Request) -> R + Send + Sync + 'static,
    R: IntoDecision,
{
    fn should_upgrade(&self, req: &Request) -> Result<bool, BoxError> {
        self(req).into_decision()
    }
}

/// The outcome of one dispatch.
#[derive(Debug)]
pub enum Dispatch {
    /// A normal HTTP response, possibly produced by the event handler.
    Response(Response),
    /// The request was accepted for a WebSocket upgrade. `response` is the
    /// `101 Switching Protocols` to send; `request` still carries hyper's
    /// upgrade handle in its extensions.
    Upgraded { response: Response, request: Request },
}

impl Dispatch {
    pub fn response(&self) -> &Response {
        match self {
            Self::Response(response) | Self::Upgraded { response, .. } => response,
        }
    }

    pub fn is_upgrade(&self) -> bool {
        matches!(self, Self::Upgraded { .. })
    }
}

pub type DispatchFuture = Pin<Box<dyn Future<Output = Dispatch> + Send>>;

/// A type-erased request handler bound to one [`Fetcher`].
pub type FetchFn = Arc<dyn Fn(Request) -> DispatchFuture + Send + Sync>;

/// Resolves requests against a [`Router`] and centralises failure handling.
pub struct Fetcher {
    router: Router,
    error_handler: Arc<dyn EventHandler>,
    scheduler: Option<Arc<dyn UpgradeScheduler>>,
    not_found: Arc<[Stage]>,
}

impl Fetcher {
    pub fn new(
        router: Router,
        error_handler: Arc<dyn EventHandler>,
        scheduler: Option<Arc<dyn UpgradeScheduler>>,
    ) -> Self {
        async fn missing(_: Request) -> Response {
            Response::not_found()
        }

        let not_found = router
            .middlewares()
            .iter()
            .cloned()
            .chain(missing.into_stages())
            .collect();
        Self { router, error_handler, scheduler, not_found }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Returns the request-handling function for the host server.
    pub fn handler(self: Arc<Self>) -> FetchFn {
        Arc::new(move |req: Request| -> DispatchFuture {
            let this = Arc::clone(&self);
            Box::pin(async move { this.fetch(req).await })
        })
    }

    /// Dispatches one request. Never fails: every error is turned into a
    /// response here.
    pub async fn fetch(&self, req: Request) -> Dispatch {
        let info = req.info();
        let span = info_span!("request", method = %info.method, path = info.path());

        async move {
            match self.try_fetch(req).await {
                Ok(dispatch) => dispatch,
                Err(err) => Dispatch::Response(self.recover(&err, &info)),
            }
        }
        .instrument(span)
        .await
    }

    async fn try_fetch(&self, req: Request) -> Result<Dispatch, Error> {
        if let Some(scheduler) = &self.scheduler {
            let decision = panic::catch_unwind(AssertUnwindSafe(|| scheduler.should_upgrade(&req)))
                .map_err(|payload| Error::Upgrade(Box::new(Error::from_panic(payload))))?
                .map_err(Error::Upgrade)?;
            if decision {
                let response = ws::handshake(&req)?;
                debug!("upgrading to websocket");
                return Ok(Dispatch::Upgraded { response, request: req });
            }
        }

        let path = req.path().to_owned();
        let outcome = match self.router.lookup(req.method(), &path) {
            Some(matched) => {
                debug!(route = %matched.route().pattern(), "matched");
                AssertUnwindSafe(matched.run(req)).catch_unwind().await
            }
            None => {
                debug!("no route matched");
                AssertUnwindSafe(Next::new(Arc::clone(&self.not_found)).run(req))
                    .catch_unwind()
                    .await
            }
        };

        match outcome {
            Ok(result) => result.map(Dispatch::Response),
            Err(payload) => Err(Error::from_panic(payload)),
        }
    }

    fn recover(&self, err: &Error, info: &RequestInfo) -> Response {
        let failure = match panic::catch_unwind(AssertUnwindSafe(|| self.error_handler.on_error(err, info))) {
            Ok(Ok(response)) => return response,
            Ok(Err(e)) => Error::EventHandler(Box::new(e)),
            Err(payload) => Error::EventHandler(Box::new(Error::from_panic(payload))),
        };
        error!(error = %err, handler_error = %failure, "event handler failed, sending fail-safe response");
        Response::status(StatusCode::INTERNAL_SERVER_ERROR)
    }
}
