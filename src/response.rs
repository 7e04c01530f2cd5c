//! Outgoing HTTP response type and the conversion traits handlers rely on.
//!
//! Handlers return anything implementing [`IntoResult`]: a plain
//! [`IntoResponse`] value, or a `Result` whose error half is forwarded to the
//! configured [`EventHandler`](crate::EventHandler).

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use http_body_util::Full;
use tracing::warn;

use crate::error::{BoxError, Error};

/// Status of the response produced when a pipeline runs to completion
/// without any stage producing one of its own (every handler passed).
pub const FALLBACK_STATUS: StatusCode = StatusCode::NO_CONTENT;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Common content-type values for use with [`ResponseBuilder::bytes`].
pub enum ContentType {
    EventStream, // text/event-stream  (SSE)
    Html,        // text/html; charset=utf-8
    Json,        // application/json
    OctetStream, // application/octet-stream
    Text,        // text/plain; charset=utf-8
}

impl ContentType {
    fn as_str(&self) -> &'static str {
        match self {
            Self::EventStream => "text/event-stream",
            Self::Html        => "text/html; charset=utf-8",
            Self::Json        => "application/json",
            Self::OctetStream => "application/octet-stream",
            Self::Text        => "text/plain; charset=utf-8",
        }
    }
}

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
///
/// ```rust
/// use issac::{Response, StatusCode};
///
/// Response::json(br#"{"id":1}"#.to_vec());
/// Response::text("hello");
/// Response::status(StatusCode::NO_CONTENT);
///
/// Response::builder()
///     .status(StatusCode::CREATED)
///     .header("location", "/users/42")
///     .json(br#"{"id":42}"#.to_vec());
/// ```
///
/// Middleware sees the response produced downstream and may rewrite it
/// through [`set_status`](Response::set_status) and
/// [`headers_mut`](Response::headers_mut).
#[derive(Debug)]
pub struct Response {
    pub(crate) status: StatusCode,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
}

impl Response {
    /// `200 OK` with `application/json`.
    pub fn json(body: impl Into<Bytes>) -> Self {
        Self::builder().bytes(ContentType::Json, body)
    }

    /// `200 OK` with `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::builder().text(body)
    }

    /// Response with no body.
    pub fn status(code: StatusCode) -> Self {
        Self { status: code, headers: HeaderMap::new(), body: Bytes::new() }
    }

    /// Builder for responses that need a custom status or extra headers.
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { headers: HeaderMap::new(), status: StatusCode::OK }
    }

    /// The response used when no stage produced one. See [`FALLBACK_STATUS`].
    pub fn fallback() -> Self {
        Self::status(FALLBACK_STATUS)
    }

    pub(crate) fn not_found() -> Self {
        Self::builder().status(StatusCode::NOT_FOUND).text("Not Found")
    }

    /// Status-only response whose body is the canonical reason phrase.
    pub(crate) fn reason(code: StatusCode) -> Self {
        Self::builder()
            .status(code)
            .text(code.canonical_reason().unwrap_or_default())
    }

    pub fn status_code(&self) -> StatusCode { self.status }
    pub fn set_status(&mut self, code: StatusCode) { self.status = code; }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn headers_mut(&mut self) -> &mut HeaderMap { &mut self.headers }
    pub fn body(&self) -> &Bytes { &self.body }

    pub(crate) fn into_http(self) -> http::Response<Full<Bytes>> {
        let mut res = http::Response::new(Full::new(self.body));
        *res.status_mut() = self.status;
        *res.headers_mut() = self.headers;
        res
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`].
///
/// Obtain via [`Response::builder()`]. Defaults to `200 OK`.
/// Terminated by a typed body method.
pub struct ResponseBuilder {
    headers: HeaderMap,
    status: StatusCode,
}

impl ResponseBuilder {
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code;
        self
    }

    /// Appends a header. Names or values that are not valid HTTP are dropped
    /// with a warning.
    pub fn header<K, V>(mut self, name: K, value: V) -> Self
    where
        K: TryInto<HeaderName>,
        V: TryInto<HeaderValue>,
    {
        match (name.try_into(), value.try_into()) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => warn!("dropping invalid response header"),
        }
        self
    }

    /// Terminate with a JSON body (`application/json`).
    pub fn json(self, body: impl Into<Bytes>) -> Response {
        self.bytes(ContentType::Json, body)
    }

    /// Terminate with a plain-text body (`text/plain; charset=utf-8`).
    pub fn text(self, body: impl Into<String>) -> Response {
        self.bytes(ContentType::Text, body.into())
    }

    /// Terminate with a typed body.
    pub fn bytes(mut self, content_type: ContentType, body: impl Into<Bytes>) -> Response {
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static(content_type.as_str()));
        Response { status: self.status, headers: self.headers, body: body.into() }
    }

    /// Terminate with no body (e.g. `204 No Content`, `301 Moved Permanently`).
    pub fn no_body(self) -> Response {
        Response { status: self.status, headers: self.headers, body: Bytes::new() }
    }
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion into an HTTP [`Response`].
///
/// Implement on your own types to return them directly from handlers.
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for String {
    fn into_response(self) -> Response { Response::text(self) }
}

/// Return a status directly from a handler: `return StatusCode::NOT_FOUND`
impl IntoResponse for StatusCode {
    fn into_response(self) -> Response { Response::status(self) }
}

impl IntoResponse for (StatusCode, String) {
    fn into_response(self) -> Response {
        Response::builder().status(self.0).text(self.1)
    }
}

// ── IntoResult ────────────────────────────────────────────────────────────────

/// What a handler, middleware or event handler may return.
///
/// Implemented for every [`IntoResponse`] type and for
/// `Result<T: IntoResponse, E: Into<BoxError>>`; the error half becomes an
/// [`Error`] and is routed to the event handler.
pub trait IntoResult {
    fn into_result(self) -> Result<Response, Error>;
}

impl<T: IntoResponse> IntoResult for T {
    fn into_result(self) -> Result<Response, Error> {
        Ok(self.into_response())
    }
}

impl<T, E> IntoResult for Result<T, E>
where
    T: IntoResponse,
    E: Into<BoxError>,
{
    fn into_result(self) -> Result<Response, Error> {
        self.map(IntoResponse::into_response).map_err(Error::handler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_content_type_first_and_keeps_headers() {
        let res = Response::builder()
            .status(StatusCode::CREATED)
            .header("location", "/users/42")
            .header("bad header", "x")
            .json(r#"{"id":42}"#);
        assert_eq!(res.status_code(), StatusCode::CREATED);
        assert_eq!(res.headers()["content-type"], "application/json");
        assert_eq!(res.headers()["location"], "/users/42");
        assert_eq!(res.headers().len(), 2);
        assert_eq!(res.body().as_ref(), br#"{"id":42}"#);
    }

    #[test]
    fn fallback_is_empty_no_content() {
        let res = Response::fallback();
        assert_eq!(res.status_code(), StatusCode::NO_CONTENT);
        assert!(res.body().is_empty());
    }

    #[test]
    fn results_carry_errors_through() {
        let ok: Result<&'static str, Error> = Ok("fine");
        assert_eq!(ok.into_result().unwrap().body().as_ref(), b"fine");

        let err: Result<Response, &str> = Err("nope");
        assert!(matches!(err.into_result(), Err(Error::Handler(_))));

        let status = StatusCode::ACCEPTED.into_result().unwrap();
        assert_eq!(status.status_code(), StatusCode::ACCEPTED);
    }

    #[test]
    fn into_http_preserves_parts() {
        let res = Response::reason(StatusCode::BAD_REQUEST).into_http();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(res.headers()["content-type"], "text/plain; charset=utf-8");
    }
}
