//! The application: route registration, configuration and `listen`.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::instrument::WithSubscriber;
use tracing::{Dispatch, warn};

use crate::error::{ConfigError, Error};
use crate::event::{DefaultEventHandler, EventHandler};
use crate::fetch::{Fetcher, UpgradeScheduler};
use crate::handler::Handler;
use crate::log::LogConfig;
use crate::method::Method;
use crate::middleware::Layer;
use crate::router::{Router, RouterConfig};
use crate::server;
use crate::ws::WsHandler;

/// WebSocket support: a scheduler consulted before routing, plus the
/// callbacks that take over upgraded connections.
pub struct WsConfig {
    scheduler: Arc<dyn UpgradeScheduler>,
    handler: Option<WsHandler>,
}

impl WsConfig {
    pub fn new(scheduler: impl UpgradeScheduler) -> Self {
        Self { scheduler: Arc::new(scheduler), handler: None }
    }

    pub fn handler(mut self, handler: WsHandler) -> Self {
        self.handler = Some(handler);
        self
    }
}

/// Construction options. Every field is optional; unset fields fall back to
/// their defaults once, in [`App::with_config`].
#[derive(Default)]
pub struct AppConfig {
    pub router: Option<RouterConfig>,
    pub error_handler: Option<Arc<dyn EventHandler>>,
    /// Without a log config the app logs through the caller's subscriber.
    pub log: Option<LogConfig>,
    pub ws: Option<WsConfig>,
}

impl AppConfig {
    pub fn router(mut self, router: RouterConfig) -> Self {
        self.router = Some(router);
        self
    }

    pub fn error_handler(mut self, handler: impl EventHandler) -> Self {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    pub fn log(mut self, log: LogConfig) -> Self {
        self.log = Some(log);
        self
    }

    pub fn ws(mut self, ws: WsConfig) -> Self {
        self.ws = Some(ws);
        self
    }
}

/// An HTTP application.
///
/// Register everything, then call one of the `listen` methods. The route
/// table is moved into the server at that point and is read-only from then
/// on.
pub struct App {
    router: Router,
    error_handler: Arc<dyn EventHandler>,
    ws: Option<WsConfig>,
    log: Option<Dispatch>,
}

impl Default for App {
    fn default() -> Self {
        Self {
            router: Router::new(),
            error_handler: Arc::new(DefaultEventHandler),
            ws: None,
            log: None,
        }
    }
}

impl App {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: AppConfig) -> Result<Self, ConfigError> {
        let AppConfig { router, error_handler, log, ws } = config;
        Ok(Self {
            router: Router::with_config("/", router.unwrap_or_default())?,
            error_handler: error_handler.unwrap_or_else(|| Arc::new(DefaultEventHandler)),
            ws,
            log: log.map(|log| log.dispatch()).transpose()?,
        })
    }

    pub fn get<T>(&mut self, path: &str, handler: impl Handler<T>) -> Result<&mut Self, ConfigError> {
        self.router.get(path, handler)?;
        Ok(self)
    }

    pub fn post<T>(&mut self, path: &str, handler: impl Handler<T>) -> Result<&mut Self, ConfigError> {
        self.router.post(path, handler)?;
        Ok(self)
    }

    pub fn put<T>(&mut self, path: &str, handler: impl Handler<T>) -> Result<&mut Self, ConfigError> {
        self.router.put(path, handler)?;
        Ok(self)
    }

    pub fn delete<T>(&mut self, path: &str, handler: impl Handler<T>) -> Result<&mut Self, ConfigError> {
        self.router.delete(path, handler)?;
        Ok(self)
    }

    /// Registers one of the less common methods without a shorthand.
    pub fn any<T>(
        &mut self,
        method: Method,
        path: &str,
        handler: impl Handler<T>,
    ) -> Result<&mut Self, ConfigError> {
        self.router.any(method, path, handler)?;
        Ok(self)
    }

    /// Appends global middleware or merges a router.
    pub fn layer(&mut self, layer: impl Into<Layer>) -> Result<&mut Self, ConfigError> {
        self.router.layer(layer)?;
        Ok(self)
    }

    /// Overrides WebSocket callbacks; callbacks set on `handler` replace the
    /// configured ones. The scheduler itself cannot be changed here.
    pub fn ws(&mut self, handler: WsHandler) -> &mut Self {
        match &mut self.ws {
            Some(ws) => ws.handler = Some(ws.handler.take().unwrap_or_default().merge(handler)),
            None => warn!("no websocket scheduler configured, ignoring websocket handler"),
        }
        self
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Freezes the route table into a dispatch engine, for hosts that run
    /// their own accept loop. WebSocket callbacks are not carried over.
    pub fn into_fetcher(self) -> Fetcher {
        self.into_parts().0
    }

    /// Binds `0.0.0.0:port`, prints a notice and serves until SIGTERM or
    /// Ctrl-C.
    pub async fn listen(self, port: u16) -> Result<(), Error> {
        self.listen_with(port, |addr| println!("Now server is listening on {}", addr.port()))
            .await
    }

    /// Like [`listen`](App::listen) with a custom callback, invoked once,
    /// right after the socket is bound.
    pub async fn listen_with(self, port: u16, on_listen: impl FnOnce(SocketAddr)) -> Result<(), Error> {
        let listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port))).await?;
        self.serve(listener, on_listen, server::shutdown_signal()).await
    }

    /// Serves on an already bound listener until `shutdown` resolves, then
    /// drains in-flight connections.
    pub async fn serve(
        self,
        listener: TcpListener,
        on_listen: impl FnOnce(SocketAddr),
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        on_listen(listener.local_addr()?);

        let log = self
            .log
            .clone()
            .unwrap_or_else(|| tracing::dispatcher::get_default(Dispatch::clone));
        let (fetcher, ws) = self.into_parts();
        server::run(listener, Arc::new(fetcher), ws, log.clone(), shutdown)
            .with_subscriber(log)
            .await
    }

    fn into_parts(self) -> (Fetcher, Option<Arc<WsHandler>>) {
        let (scheduler, handler) = match self.ws {
            Some(ws) => (Some(ws.scheduler), Some(Arc::new(ws.handler.unwrap_or_default()))),
            None => (None, None),
        };
        (Fetcher::new(self.router, self.error_handler, scheduler), handler)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http::StatusCode;

    use super::*;
    use crate::{Request, Response};

    fn request(path: &str) -> Request {
        Request::from_http(http::Request::builder().uri(path).body(Bytes::new()).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn defaults_are_filled_in() {
        let mut app = App::with_config(AppConfig::default()).unwrap();
        app.get("/boom", |_: Request| async { Err::<Response, _>("x") }).unwrap();
        let dispatch = app.into_fetcher().fetch(request("/boom")).await;
        assert_eq!(dispatch.response().status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn configured_parts_are_used() {
        let config = AppConfig::default()
            .router(RouterConfig { case_sensitive: false })
            .error_handler(|_: &crate::Error, _: &crate::RequestInfo| StatusCode::BAD_GATEWAY);
        let mut app = App::with_config(config).unwrap();
        app.get("/Upper", |_: Request| async { "hi" })
            .unwrap()
            .get("/fail", |_: Request| async { Err::<Response, _>("x") })
            .unwrap();

        let fetcher = app.into_fetcher();
        assert_eq!(fetcher.fetch(request("/upper")).await.response().body().as_ref(), b"hi");
        let failed = fetcher.fetch(request("/fail")).await;
        assert_eq!(failed.response().status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn invalid_log_config_fails_construction() {
        // RUST_LOG takes precedence over `level`; only meaningful without it.
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let log = LogConfig { level: "issac=notalevel".to_owned(), ..LogConfig::default() };
        let err = App::with_config(AppConfig::default().log(log)).err().unwrap();
        assert!(matches!(err, ConfigError::InvalidLogFilter { .. }));
    }

    #[test]
    fn ws_override_merges_over_configured_handler() {
        let config = AppConfig::default()
            .ws(WsConfig::new(|_: &Request| false).handler(WsHandler::new().on_close(|_, _| {})));
        let mut app = App::with_config(config).unwrap();
        app.ws(WsHandler::new().on_open(|_| {}));

        let (_, handler) = app.into_parts();
        assert_eq!(handler.unwrap().callbacks(), (true, false, true));
    }

    #[test]
    fn ws_override_without_config_is_ignored() {
        let mut app = App::new();
        app.ws(WsHandler::new().on_open(|_| {}));
        let (_, handler) = app.into_parts();
        assert!(handler.is_none());
    }

    #[tokio::test]
    async fn merged_routers_are_reachable_through_the_app() {
        let mut users = Router::with_prefix("/users").unwrap();
        users.get("/:id", |req: Request| async move { req.param("id").unwrap_or_default().to_owned() }).unwrap();

        let mut app = App::new();
        app.layer(users).unwrap();
        let res = app.into_fetcher().fetch(request("/users/9")).await;
        assert_eq!(res.response().body().as_ref(), b"9");
    }
}
