//! # issac
//!
//! A small application layer on top of hyper: an express-style router with
//! nested routers and middleware chains, one place where every failure is
//! turned into a response, and opt-in WebSocket upgrades.
//!
//! ## What it does
//!
//! - Routing on `/literal`, `/:param` and `/*wildcard` segments. The most
//!   specific route wins, independent of registration order.
//! - Middleware as ordinary handlers that receive a [`Next`]. Routers nest
//!   and carry their middleware into the parent.
//! - Errors and panics from handlers, middleware and the upgrade scheduler
//!   are caught by the [`Fetcher`] and passed to one [`EventHandler`].
//! - WebSocket upgrades decided per request, before routing, by an
//!   [`UpgradeScheduler`].
//! - Graceful shutdown on SIGTERM / Ctrl-C, draining in-flight connections.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use issac::{App, Next, Request, Response, Router, StatusCode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut users = Router::with_prefix("/users")?;
//!     users
//!         .get("/:id", get_user)?
//!         .post("/", create_user)?;
//!
//!     let mut app = App::new();
//!     app.layer(issac::middleware::trace())?
//!         .layer(require_json)?
//!         .layer(users)?;
//!
//!     app.listen(3000).await?;
//!     Ok(())
//! }
//!
//! async fn require_json(req: Request, next: Next) -> Result<Response, issac::Error> {
//!     if req.method() == issac::Method::Post && req.header("content-type") != Some("application/json") {
//!         return Ok(Response::status(StatusCode::UNSUPPORTED_MEDIA_TYPE));
//!     }
//!     next.run(req).await
//! }
//!
//! async fn get_user(req: Request) -> Response {
//!     let id = req.param("id").unwrap_or("unknown");
//!     Response::json(format!(r#"{{"id":"{id}"}}"#))
//! }
//!
//! async fn create_user(req: Request) -> Result<Response, issac::Error> {
//!     if req.body().is_empty() {
//!         return Err(issac::Error::handler("empty body"));
//!     }
//!     Ok(Response::builder()
//!         .status(StatusCode::CREATED)
//!         .header("location", "/users/99")
//!         .json(req.body().clone()))
//! }
//! ```

mod app;
mod error;
mod event;
mod fetch;
mod handler;
mod log;
mod method;
mod pattern;
mod request;
mod response;
mod router;
mod server;

pub mod middleware;
pub mod ws;

pub use app::{App, AppConfig, WsConfig};
pub use error::{BoxError, ConfigError, Error};
pub use event::{DefaultEventHandler, EventHandler};
pub use fetch::{Dispatch, DispatchFuture, FetchFn, Fetcher, IntoDecision, UpgradeScheduler};
pub use handler::{Chain, Handler, Next};
pub use http::StatusCode;
pub use log::{LogConfig, LogFormat, formatted_time};
pub use method::Method;
pub use middleware::{Layer, Middleware};
pub use request::{Request, RequestInfo};
pub use response::{ContentType, FALLBACK_STATUS, IntoResponse, IntoResult, Response, ResponseBuilder};
pub use router::{Match, Route, Router, RouterConfig};
