//! HTTP server glue and graceful shutdown.
//!
//! Each accepted connection gets its own task. Requests are buffered,
//! converted into a [`Request`] and handed to the application's
//! [`FetchFn`]; upgraded requests are answered with the `101` and their
//! connection is passed on to the WebSocket loop.
//!
//! On shutdown the server:
//! 1. Stops `listener.accept()` immediately, so no new connections are made.
//! 2. Asks every connection to shut down gracefully: idle keep-alive
//!    connections close, in-flight requests finish first.
//! 3. Sends `1001 Going Away` to every upgraded WebSocket.
//! 4. Returns from [`App::serve`](crate::App::serve) once all of the above
//!    have ended.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::instrument::WithSubscriber;
use tracing::{Dispatch, error, info, warn};

use crate::error::Error;
use crate::fetch::{Dispatch as Outcome, FetchFn, Fetcher};
use crate::request::Request;
use crate::response::Response;
use crate::ws::{self, WsHandler};

pub(crate) async fn run(
    listener: TcpListener,
    fetcher: Arc<Fetcher>,
    ws: Option<Arc<WsHandler>>,
    log: Dispatch,
    shutdown: impl Future<Output = ()>,
) -> Result<(), Error> {
    let fetch = fetcher.handler();
    info!(addr = %listener.local_addr()?, "issac listening");

    let mut tasks = tokio::task::JoinSet::new();
    // Every connection and WebSocket session holds a receiver; the sender
    // reports `closed` once the last of them is gone.
    let (stop_tx, _) = watch::channel(false);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            // Shutdown first, so a signal stops accepting even with a
            // backlog of queued connections.
            biased;

            () = &mut shutdown => {
                info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                break;
            }

            res = listener.accept() => {
                let (stream, remote_addr) = match res {
                    Ok(v) => v,
                    Err(e) => {
                        error!("accept error: {e}");
                        continue;
                    }
                };

                let fetch = Arc::clone(&fetch);
                let ws = ws.clone();
                let mut stop = stop_tx.subscribe();
                let io = TokioIo::new(stream);

                tasks.spawn(
                    async move {
                        let session_stop = stop.clone();
                        let svc = service_fn(move |req| {
                            let fetch = Arc::clone(&fetch);
                            let ws = ws.clone();
                            let stop = session_stop.clone();
                            async move { Ok::<_, Infallible>(respond(fetch, ws, stop, req, remote_addr).await) }
                        });

                        let builder = ConnBuilder::new(TokioExecutor::new());
                        let conn = builder.serve_connection_with_upgrades(io, svc);
                        tokio::pin!(conn);

                        let mut stopping = false;
                        let result = loop {
                            tokio::select! {
                                res = conn.as_mut() => break res,
                                _ = stop.changed(), if !stopping => {
                                    stopping = true;
                                    conn.as_mut().graceful_shutdown();
                                }
                            }
                        };
                        if let Err(e) = result {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    }
                    .with_subscriber(log.clone()),
                );
            }

            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
        }
    }

    stop_tx.send_replace(true);
    while tasks.join_next().await.is_some() {}
    stop_tx.closed().await;

    info!("issac stopped");
    Ok(())
}

/// One request in, one response out. Never fails: every problem below the
/// transport has already been turned into a response by the fetcher.
async fn respond(
    fetch: FetchFn,
    ws: Option<Arc<WsHandler>>,
    stop: watch::Receiver<bool>,
    req: hyper::Request<Incoming>,
    remote_addr: SocketAddr,
) -> http::Response<Full<Bytes>> {
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(peer = %remote_addr, "failed to read request body: {e}");
            return Response::reason(StatusCode::BAD_REQUEST).into_http();
        }
    };

    let Some(req) = Request::from_http(http::Request::from_parts(parts, body)) else {
        return Response::reason(StatusCode::METHOD_NOT_ALLOWED).into_http();
    };

    match fetch(req.with_remote_addr(remote_addr)).await {
        Outcome::Response(res) => res.into_http(),
        Outcome::Upgraded { response, mut request } => {
            // Only HTTP/1.1 connections carry an upgrade handle.
            let Some(on_upgrade) = request.extensions_mut().remove::<OnUpgrade>() else {
                warn!(peer = %remote_addr, "connection does not support upgrades");
                return Response::reason(StatusCode::BAD_REQUEST).into_http();
            };
            let handler = ws.unwrap_or_default();
            tokio::spawn(ws::serve(on_upgrade, handler, request.info(), stop).with_current_subscriber());
            response.into_http()
        }
    }
}

/// Resolves on the first shutdown signal the process receives: SIGTERM or
/// Ctrl-C on Unix, Ctrl-C elsewhere. A signal that cannot be installed is
/// logged and never fires.
pub(crate) async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = sigterm => {}
    }
}
