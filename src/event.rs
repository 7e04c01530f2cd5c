//! Failure policy.
//!
//! The [`Fetcher`](crate::Fetcher) catches every dispatch failure in one
//! place and asks the configured [`EventHandler`] what the client should
//! see. Swapping the handler changes the policy without touching dispatch.

use tracing::error;

use crate::error::Error;
use crate::request::RequestInfo;
use crate::response::{IntoResult, Response};

/// Turns a dispatch failure into the final response.
///
/// Implemented for any `Fn(&Error, &RequestInfo) -> impl IntoResult`. When
/// the handler itself fails (returns `Err` or panics) the client receives a
/// bare `500 Internal Server Error`.
pub trait EventHandler: Send + Sync + 'static {
    fn on_error(&self, err: &Error, req: &RequestInfo) -> Result<Response, Error>;
}

impl<F, R> EventHandler for F
where
    F: Fn(&Error, &RequestInfo) -> R + Send + Sync + 'static,
    R: IntoResult,
{
    fn on_error(&self, err: &Error, req: &RequestInfo) -> Result<Response, Error> {
        self(err, req).into_result()
    }
}

/// Logs the failure and answers with [`Error::status`] and its reason
/// phrase. No error detail is sent to the client.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultEventHandler;

impl EventHandler for DefaultEventHandler {
    fn on_error(&self, err: &Error, req: &RequestInfo) -> Result<Response, Error> {
        error!(method = %req.method, path = req.path(), error = %err, "request failed");
        Ok(Response::reason(err.status()))
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http::StatusCode;

    use super::*;
    use crate::Request;

    fn info() -> RequestInfo {
        Request::from_http(http::Request::builder().uri("/x").body(Bytes::new()).unwrap())
            .unwrap()
            .info()
    }

    #[test]
    fn default_policy_hides_details() {
        let res = DefaultEventHandler
            .on_error(&Error::handler("database password is hunter2"), &info())
            .unwrap();
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.body().as_ref(), b"Internal Server Error");

        let res = DefaultEventHandler.on_error(&Error::Handshake("no key"), &info()).unwrap();
        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn closures_are_event_handlers() {
        let handler = |err: &Error, req: &RequestInfo| (StatusCode::IM_A_TEAPOT, format!("{} {err}", req.path()));
        let res = handler.on_error(&Error::Closed, &info()).unwrap();
        assert_eq!(res.status_code(), StatusCode::IM_A_TEAPOT);
        assert_eq!(res.body().as_ref(), b"/x websocket connection closed");
    }
}
