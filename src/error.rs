//! Unified error types.
//!
//! Two families, split by *when* they can happen:
//!
//! - [`ConfigError`] surfaces while the application is being assembled
//!   (registering routes, merging routers, building the logger). It is
//!   returned synchronously to the caller and never seen at request time.
//! - [`Error`] surfaces while a request is being dispatched. Every variant is
//!   caught at the [`Fetcher`](crate::Fetcher) boundary and handed to the
//!   configured [`EventHandler`](crate::EventHandler); none of them ever
//!   reaches hyper.

use http::StatusCode;

/// A boxed, thread-safe error produced by user code.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Raised while building the application, before it serves any traffic.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid route pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: &'static str },

    #[error("unsupported HTTP method `{0}`")]
    InvalidMethod(String),

    #[error("invalid log filter `{filter}`: {reason}")]
    InvalidLogFilter { filter: String, reason: String },
}

impl ConfigError {
    pub(crate) fn pattern(pattern: &str, reason: &'static str) -> Self {
        Self::InvalidPattern { pattern: pattern.to_owned(), reason }
    }
}

/// A failure raised while dispatching a request.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A middleware or route handler returned an error.
    #[error("handler failed: {0}")]
    Handler(#[source] BoxError),

    /// A middleware or route handler panicked.
    #[error("handler panicked: {0}")]
    Panic(String),

    /// The WebSocket upgrade scheduler failed or panicked.
    #[error("upgrade scheduler failed: {0}")]
    Upgrade(#[source] BoxError),

    /// The scheduler asked for an upgrade the request cannot satisfy.
    #[error("invalid websocket handshake: {0}")]
    Handshake(&'static str),

    /// The event handler itself failed.
    #[error("event handler failed: {0}")]
    EventHandler(#[source] BoxError),

    /// A message was sent on a WebSocket that has already closed.
    #[error("websocket connection closed")]
    Closed,

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wraps an arbitrary user error as [`Error::Handler`].
    ///
    /// Errors that already are an [`Error`] (for example a middleware
    /// propagating `next.run(req).await?`) are unwrapped instead of nested.
    pub fn handler(err: impl Into<BoxError>) -> Self {
        match err.into().downcast::<Error>() {
            Ok(inner) => *inner,
            Err(other) => Self::Handler(other),
        }
    }

    /// The status the default event handler answers with.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Handshake(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let msg = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_owned()
        };
        Self::Panic(msg)
    }
}
