//! Route table, router merging and match resolution.
//!
//! A [`Router`] is a flat list of routes plus the middleware attached to it.
//! Merging a child router copies its routes in, prefixed with the parent's
//! prefix, and remembers the child's middleware as part of each imported
//! route's *scope*. At lookup time the pipeline is assembled as:
//!
//! ```text
//! this router's middleware → route scope (outer → inner merges) → route handlers
//! ```
//!
//! Lookup is a linear scan over the routes of the requested method. Every
//! candidate that consumes the whole path is ranked segment by segment
//! (literal beats `:param` beats `*wildcard`) and the most specific one wins;
//! equal ranks go to the earliest registration.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use tracing::warn;

use crate::error::{ConfigError, Error};
use crate::handler::{Handler, Next, Stage};
use crate::method::Method;
use crate::middleware::{Layer, Middleware};
use crate::pattern::{self, Captured, Pattern};
use crate::request::Request;
use crate::response::Response;

/// Matching options.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Compare literal segments case-sensitively. Defaults to `true`.
    pub case_sensitive: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self { case_sensitive: true }
    }
}

/// One registration: a method, a fully resolved pattern and its pipeline.
pub struct Route {
    method: Method,
    pattern: Pattern,
    scope: Vec<Stage>,
    handlers: Vec<Stage>,
}

impl Route {
    pub fn method(&self) -> Method {
        self.method
    }

    /// The resolved pattern, e.g. `/api/users/:id`.
    pub fn pattern(&self) -> String {
        self.pattern.to_string()
    }
}

/// The application router.
///
/// Build it once at startup. Every registration method takes `&mut self`
/// and returns `Result<&mut Self, ConfigError>`, so registrations chain
/// with `?`:
///
/// ```rust,no_run
/// # use issac::{Request, Response, Router};
/// # async fn list(_: Request) -> Response { Response::text("") }
/// # async fn show(_: Request) -> Response { Response::text("") }
/// # fn build() -> Result<Router, issac::ConfigError> {
/// let mut users = Router::with_prefix("/users")?;
/// users.get("/", list)?.get("/:id", show)?;
///
/// let mut api = Router::with_prefix("/api")?;
/// api.merge(users)?;          // GET /api/users, GET /api/users/:id
/// # Ok(api) }
/// ```
#[derive(Default)]
pub struct Router {
    prefix: Pattern,
    config: RouterConfig,
    routes: Vec<Route>,
    middlewares: Vec<Stage>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// A router whose registrations all live under `prefix`.
    pub fn with_prefix(prefix: &str) -> Result<Self, ConfigError> {
        Self::with_config(prefix, RouterConfig::default())
    }

    pub fn with_config(prefix: &str, config: RouterConfig) -> Result<Self, ConfigError> {
        Ok(Self { prefix: Pattern::parse(prefix)?, config, ..Self::default() })
    }

    pub fn get<T>(&mut self, path: &str, handler: impl Handler<T>) -> Result<&mut Self, ConfigError> {
        self.route(Method::Get, path, handler)
    }

    pub fn post<T>(&mut self, path: &str, handler: impl Handler<T>) -> Result<&mut Self, ConfigError> {
        self.route(Method::Post, path, handler)
    }

    pub fn put<T>(&mut self, path: &str, handler: impl Handler<T>) -> Result<&mut Self, ConfigError> {
        self.route(Method::Put, path, handler)
    }

    pub fn delete<T>(&mut self, path: &str, handler: impl Handler<T>) -> Result<&mut Self, ConfigError> {
        self.route(Method::Delete, path, handler)
    }

    /// Registers any of the nine routable methods, including the less
    /// common ones that have no shorthand (`HEAD`, `PATCH`, `OPTIONS`, …).
    pub fn any<T>(
        &mut self,
        method: Method,
        path: &str,
        handler: impl Handler<T>,
    ) -> Result<&mut Self, ConfigError> {
        self.route(method, path, handler)
    }

    /// Registers `handler` for `method` at this router's prefix + `path`.
    ///
    /// Fails if `path` is not a valid pattern. Registering the same method
    /// and path shape twice is allowed; the first registration keeps
    /// answering and a warning is logged.
    pub fn route<T>(
        &mut self,
        method: Method,
        path: &str,
        handler: impl Handler<T>,
    ) -> Result<&mut Self, ConfigError> {
        let pattern = self.prefix.join(&Pattern::parse(path)?)?;
        self.insert(Route { method, pattern, scope: Vec::new(), handlers: handler.into_stages() });
        Ok(self)
    }

    /// Appends a middleware. It wraps every route of this router, including
    /// routes merged in from other routers, ahead of their own middleware.
    pub fn use_middleware(&mut self, middleware: Middleware) -> &mut Self {
        self.middlewares.push(middleware.0);
        self
    }

    /// Merges a router or appends a middleware, whichever `layer` is.
    pub fn layer(&mut self, layer: impl Into<Layer>) -> Result<&mut Self, ConfigError> {
        match layer.into() {
            Layer::Router(router) => self.merge(router),
            Layer::Middleware(middleware) => Ok(self.use_middleware(middleware)),
        }
    }

    /// Imports every route of `other`, prefixed with this router's prefix.
    ///
    /// `other`'s middleware runs after this router's and before the route's
    /// handlers. Nothing is imported if any resulting pattern is invalid.
    pub fn merge(&mut self, other: Router) -> Result<&mut Self, ConfigError> {
        let Router { routes, middlewares, .. } = other;

        let patterns = routes
            .iter()
            .map(|route| self.prefix.join(&route.pattern))
            .collect::<Result<Vec<_>, _>>()?;

        for (route, pattern) in routes.into_iter().zip(patterns) {
            let mut scope = middlewares.clone();
            scope.extend(route.scope);
            self.insert(Route { method: route.method, pattern, scope, handlers: route.handlers });
        }
        Ok(self)
    }

    /// Resolves `method` + `path` to the most specific route and its full
    /// pipeline, or `None` when nothing matches.
    pub fn lookup(&self, method: Method, path: &str) -> Option<Match<'_>> {
        let segments = pattern::split(path);

        let mut best: Option<(&Route, Captured)> = None;
        for route in self.routes.iter().filter(|r| r.method == method) {
            let Some(captured) = route.pattern.matches(&segments, self.config.case_sensitive) else {
                continue;
            };
            if best.as_ref().is_none_or(|(_, b)| captured.rank < b.rank) {
                best = Some((route, captured));
            }
        }

        let (route, captured) = best?;
        let pipeline = self
            .middlewares
            .iter()
            .chain(&route.scope)
            .chain(&route.handlers)
            .cloned()
            .collect();
        Some(Match { route, params: captured.params.into_iter().collect(), pipeline })
    }

    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }

    pub(crate) fn middlewares(&self) -> &[Stage] {
        &self.middlewares
    }

    fn insert(&mut self, route: Route) {
        if self
            .routes
            .iter()
            .any(|r| r.method == route.method && r.pattern.same_shape(&route.pattern))
        {
            warn!(
                method = %route.method,
                pattern = %route.pattern,
                "duplicate route, the earlier registration stays reachable"
            );
        }
        self.routes.push(route);
    }
}

/// A resolved route with its captured parameters and assembled pipeline.
pub struct Match<'r> {
    route: &'r Route,
    params: HashMap<String, String>,
    pipeline: Arc<[Stage]>,
}

impl Match<'_> {
    pub fn route(&self) -> &Route {
        self.route
    }

    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    /// Number of stages: middleware plus handlers.
    pub fn depth(&self) -> usize {
        self.pipeline.len()
    }

    /// Runs the pipeline with the captured parameters attached to `req`.
    pub async fn run(self, mut req: Request) -> Result<Response, Error> {
        req.params = self.params;
        Next::new(self.pipeline).run(req).await
    }
}
