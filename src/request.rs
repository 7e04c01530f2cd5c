//! Incoming HTTP request type.

use std::collections::HashMap;
use std::net::SocketAddr;

use bytes::Bytes;
use http::{Extensions, HeaderMap, Uri, Version};

use crate::method::Method;

/// An incoming HTTP request with its body fully buffered.
///
/// Middleware may rewrite headers and attach typed values through
/// [`extensions_mut`](Request::extensions_mut) before calling `next`.
#[derive(Debug)]
pub struct Request {
    pub(crate) method: Method,
    pub(crate) uri: Uri,
    pub(crate) version: Version,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
    pub(crate) params: HashMap<String, String>,
    pub(crate) extensions: Extensions,
    pub(crate) remote_addr: Option<SocketAddr>,
}

impl Request {
    /// Converts a buffered `http` request.
    ///
    /// Returns `None` when the method is not one of the nine routable verbs.
    pub fn from_http(req: http::Request<Bytes>) -> Option<Self> {
        let (parts, body) = req.into_parts();
        let method = Method::try_from(&parts.method).ok()?;
        Some(Self {
            method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            body,
            params: HashMap::new(),
            extensions: parts.extensions,
            remote_addr: None,
        })
    }

    pub(crate) fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub fn method(&self) -> Method { self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn path(&self) -> &str { self.uri.path() }
    pub fn query(&self) -> Option<&str> { self.uri.query() }
    pub fn version(&self) -> Version { self.version }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn headers_mut(&mut self) -> &mut HeaderMap { &mut self.headers }
    pub fn body(&self) -> &Bytes { &self.body }
    pub fn extensions(&self) -> &Extensions { &self.extensions }
    pub fn extensions_mut(&mut self) -> &mut Extensions { &mut self.extensions }
    pub fn remote_addr(&self) -> Option<SocketAddr> { self.remote_addr }

    /// Header lookup; values that are not visible ASCII are skipped.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/:id`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    /// Snapshot of the request line and headers, kept for error reporting
    /// after the request itself has been moved into the pipeline.
    pub fn info(&self) -> RequestInfo {
        RequestInfo {
            method: self.method,
            uri: self.uri.clone(),
            headers: self.headers.clone(),
            remote_addr: self.remote_addr,
        }
    }
}

/// The request context handed to the [`EventHandler`](crate::EventHandler)
/// and to WebSocket callbacks.
#[derive(Clone, Debug)]
pub struct RequestInfo {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub remote_addr: Option<SocketAddr>,
}

impl RequestInfo {
    pub fn path(&self) -> &str {
        self.uri.path()
    }
}
