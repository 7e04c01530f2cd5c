//! WebSocket upgrades.
//!
//! The [`Fetcher`](crate::Fetcher) asks the configured upgrade scheduler
//! about every request before routing. When the answer is yes, [`handshake`]
//! validates the request and builds the `101 Switching Protocols` response;
//! the server then waits for hyper to release the raw connection and hands
//! it to [`serve`], which drives the callbacks of a [`WsHandler`].
//!
//! ```text
//! client ──frames──→ reader loop ──→ on_message(&socket, msg)
//! client ←─frames─── writer task ←── socket.send(msg)   (any task, any time)
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures_util::{SinkExt, StreamExt};
use http::StatusCode;
use http::header::{CONNECTION, HeaderMap, HeaderName, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_KEY, SEC_WEBSOCKET_VERSION, UPGRADE};
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::Role;
use tracing::{debug, warn};

pub use tokio_tungstenite::tungstenite::Message;
pub use tokio_tungstenite::tungstenite::protocol::CloseFrame;

use crate::error::Error;
use crate::method::Method;
use crate::request::{Request, RequestInfo};
use crate::response::Response;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

type OpenFn = Arc<dyn Fn(&WebSocket) + Send + Sync>;
type MessageFn = Arc<dyn Fn(&WebSocket, Message) + Send + Sync>;
type CloseFn = Arc<dyn Fn(&WebSocket, Option<CloseFrame>) + Send + Sync>;

/// Callbacks for upgraded connections. Every callback is optional.
///
/// ```rust
/// use issac::ws::{Message, WsHandler};
///
/// let echo = WsHandler::new().on_message(|socket, msg| {
///     let _ = socket.send(msg);
/// });
/// let logged = echo.merge(WsHandler::new().on_open(|socket| {
///     println!("socket {} opened", socket.id());
/// }));
/// ```
#[derive(Clone, Default)]
pub struct WsHandler {
    open: Option<OpenFn>,
    message: Option<MessageFn>,
    close: Option<CloseFn>,
}

impl WsHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_open(mut self, f: impl Fn(&WebSocket) + Send + Sync + 'static) -> Self {
        self.open = Some(Arc::new(f));
        self
    }

    /// Called for every text or binary frame. Ping/pong is answered
    /// automatically and never reaches this callback.
    pub fn on_message(mut self, f: impl Fn(&WebSocket, Message) + Send + Sync + 'static) -> Self {
        self.message = Some(Arc::new(f));
        self
    }

    /// Called once when the connection ends, with the peer's close frame
    /// when it sent one.
    pub fn on_close(mut self, f: impl Fn(&WebSocket, Option<CloseFrame>) + Send + Sync + 'static) -> Self {
        self.close = Some(Arc::new(f));
        self
    }

    /// Shallow merge: every callback set on `over` replaces the one in `self`.
    pub fn merge(self, over: WsHandler) -> Self {
        Self {
            open: over.open.or(self.open),
            message: over.message.or(self.message),
            close: over.close.or(self.close),
        }
    }

    #[cfg(test)]
    pub(crate) fn callbacks(&self) -> (bool, bool, bool) {
        (self.open.is_some(), self.message.is_some(), self.close.is_some())
    }
}

/// Handle to one upgraded connection. Cheap to clone and safe to move into
/// other tasks; sends are queued to the connection's writer.
#[derive(Clone)]
pub struct WebSocket {
    id: u64,
    info: Arc<RequestInfo>,
    tx: mpsc::UnboundedSender<Message>,
}

impl WebSocket {
    /// Process-unique connection id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The request that was upgraded.
    pub fn request(&self) -> &RequestInfo {
        &self.info
    }

    pub fn send(&self, msg: impl Into<Message>) -> Result<(), Error> {
        self.tx.send(msg.into()).map_err(|_| Error::Closed)
    }

    /// Starts the closing handshake.
    pub fn close(&self) -> Result<(), Error> {
        self.send(Message::Close(None))
    }
}

/// Validates an upgrade request and builds the `101` response.
pub(crate) fn handshake(req: &Request) -> Result<Response, Error> {
    if req.method() != Method::Get {
        return Err(Error::Handshake("method must be GET"));
    }
    if !has_token(req.headers(), UPGRADE, "websocket") {
        return Err(Error::Handshake("missing `upgrade: websocket`"));
    }
    if !has_token(req.headers(), CONNECTION, "upgrade") {
        return Err(Error::Handshake("missing `connection: upgrade`"));
    }
    let mut versions = req.headers().get_all(SEC_WEBSOCKET_VERSION).iter();
    match (versions.next(), versions.next()) {
        (Some(version), None) if version.as_bytes() == b"13" => {}
        _ => return Err(Error::Handshake("unsupported websocket version")),
    }
    let key = req
        .headers()
        .get(SEC_WEBSOCKET_KEY)
        .ok_or(Error::Handshake("missing `sec-websocket-key`"))?;
    // RFC 6455 §4.1: a base64-encoded 16-byte nonce.
    if !BASE64.decode(key.as_bytes()).is_ok_and(|nonce| nonce.len() == 16) {
        return Err(Error::Handshake("malformed `sec-websocket-key`"));
    }

    Ok(Response::builder()
        .status(StatusCode::SWITCHING_PROTOCOLS)
        .header(UPGRADE, "websocket")
        .header(CONNECTION, "upgrade")
        .header(SEC_WEBSOCKET_ACCEPT, derive_accept_key(key.as_bytes()))
        .no_body())
}

fn has_token(headers: &HeaderMap, name: HeaderName, token: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|t| t.trim().eq_ignore_ascii_case(token))
}

/// Completes the hyper upgrade and runs the connection to its end, or until
/// `stop` changes, in which case the peer gets a `1001 Going Away` close.
pub(crate) async fn serve(
    on_upgrade: OnUpgrade,
    handler: Arc<WsHandler>,
    info: RequestInfo,
    stop: watch::Receiver<bool>,
) {
    let upgraded = match on_upgrade.await {
        Ok(upgraded) => upgraded,
        Err(e) => {
            warn!(path = info.path(), "websocket upgrade failed: {e}");
            return;
        }
    };
    let stream = WebSocketStream::from_raw_socket(TokioIo::new(upgraded), Role::Server, None).await;
    run(stream, handler, info, stop).await;
}

async fn run<S>(
    stream: WebSocketStream<S>,
    handler: Arc<WsHandler>,
    info: RequestInfo,
    mut stop: watch::Receiver<bool>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sink, mut source) = stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let (done_tx, mut done_rx) = oneshot::channel::<()>();
    let socket = WebSocket { id: NEXT_ID.fetch_add(1, Ordering::Relaxed), info: Arc::new(info), tx };
    debug!(id = socket.id, path = socket.request().path(), "websocket opened");

    // Sole owner of the sink. Handles may outlive the connection, so the
    // reader signals `done` instead of relying on every sender being dropped.
    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                // Queued frames go out before `done` is honoured.
                biased;

                msg = rx.recv() => {
                    let Some(msg) = msg else { break };
                    let closing = msg.is_close();
                    if sink.send(msg).await.is_err() || closing {
                        break;
                    }
                }
                _ = &mut done_rx => break,
            }
        }
        let _ = sink.close().await;
    });

    if let Some(open) = &handler.open {
        open(&socket);
    }

    let mut close_frame = None;
    loop {
        let frame = tokio::select! {
            frame = source.next() => frame,
            _ = stop.changed() => {
                let _ = socket.send(Message::Close(Some(CloseFrame {
                    code: CloseCode::Away,
                    reason: "server shutting down".into(),
                })));
                break;
            }
        };
        let Some(frame) = frame else { break };
        match frame {
            Ok(Message::Close(frame)) => {
                close_frame = frame;
                break;
            }
            Ok(msg @ (Message::Text(_) | Message::Binary(_))) => {
                if let Some(on_message) = &handler.message {
                    on_message(&socket, msg);
                }
            }
            Ok(_) => {}
            Err(e) => {
                debug!(id = socket.id, "websocket read failed: {e}");
                break;
            }
        }
    }

    if let Some(close) = &handler.close {
        close(&socket, close_frame);
    }
    let _ = done_tx.send(());
    let _ = writer.await;
    debug!(id = socket.id, "websocket closed");
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use bytes::Bytes;

    use super::*;

    // Sample key and accept value from RFC 6455 §1.3.
    const KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";

    fn upgrade_request_with(version: &str, key: &str) -> http::request::Builder {
        http::Request::builder()
            .uri("/ws")
            .header("upgrade", "websocket")
            .header("connection", "keep-alive, Upgrade")
            .header("sec-websocket-version", version)
            .header("sec-websocket-key", key)
    }

    fn upgrade_request() -> http::request::Builder {
        upgrade_request_with("13", KEY)
    }

    fn request(builder: http::request::Builder) -> Request {
        Request::from_http(builder.body(Bytes::new()).unwrap()).unwrap()
    }

    #[test]
    fn handshake_derives_accept_key() {
        let res = handshake(&request(upgrade_request())).unwrap();
        assert_eq!(res.status_code(), StatusCode::SWITCHING_PROTOCOLS);
        assert_eq!(res.headers()[SEC_WEBSOCKET_ACCEPT], "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
        assert_eq!(res.headers()[UPGRADE], "websocket");
    }

    #[test]
    fn handshake_rejects_plain_requests() {
        let plain = request(http::Request::builder().uri("/ws"));
        assert!(matches!(handshake(&plain), Err(Error::Handshake(_))));

        let post = request(upgrade_request().method("POST"));
        assert!(matches!(handshake(&post), Err(Error::Handshake("method must be GET"))));

        let old = request(upgrade_request_with("8", KEY));
        assert!(matches!(handshake(&old), Err(Error::Handshake("unsupported websocket version"))));
    }

    #[test]
    fn handshake_requires_a_single_version_13() {
        let repeated = request(upgrade_request().header("sec-websocket-version", "8"));
        assert_eq!(repeated.headers().get_all("sec-websocket-version").iter().count(), 2);
        assert!(matches!(handshake(&repeated), Err(Error::Handshake("unsupported websocket version"))));

        let missing = request(
            http::Request::builder()
                .uri("/ws")
                .header("upgrade", "websocket")
                .header("connection", "upgrade")
                .header("sec-websocket-key", KEY),
        );
        assert!(matches!(handshake(&missing), Err(Error::Handshake("unsupported websocket version"))));
    }

    #[test]
    fn handshake_requires_a_16_byte_base64_key() {
        for key in ["not a key", "AAAAAAAAAAA=", "dGhlIHNhbXBsZSBub25jZQ"] {
            let req = request(upgrade_request_with("13", key));
            assert!(
                matches!(handshake(&req), Err(Error::Handshake("malformed `sec-websocket-key`"))),
                "{key}"
            );
        }
        assert!(handshake(&request(upgrade_request_with("13", "AAAAAAAAAAAAAAAAAAAAAA=="))).is_ok());
    }

    #[test]
    fn merge_is_per_callback_and_later_wins() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let (a, b) = (Arc::clone(&calls), Arc::clone(&calls));
        let base = WsHandler::new()
            .on_open(move |_| a.lock().unwrap().push("base-open"))
            .on_close(|_, _| {});
        let merged = base.merge(WsHandler::new().on_open(move |_| b.lock().unwrap().push("over-open")));

        assert!(merged.close.is_some());
        assert!(merged.message.is_none());

        let (tx, _rx) = mpsc::unbounded_channel();
        let info = request(http::Request::builder().uri("/ws")).info();
        let socket = WebSocket { id: 0, info: Arc::new(info), tx };
        (merged.open.unwrap())(&socket);
        assert_eq!(*calls.lock().unwrap(), ["over-open"]);
    }

    #[tokio::test]
    async fn send_after_close_reports_closed() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let info = request(http::Request::builder().uri("/ws")).info();
        let socket = WebSocket { id: 0, info: Arc::new(info), tx };
        assert!(matches!(socket.send("late"), Err(Error::Closed)));
    }

    #[tokio::test]
    async fn drives_callbacks_over_a_live_stream() {
        let (server_io, client_io) = tokio::io::duplex(4096);
        let closed = Arc::new(Mutex::new(None));
        let seen = Arc::clone(&closed);

        let handler = WsHandler::new()
            .on_open(|socket| {
                let _ = socket.send(format!("hello {}", socket.request().path()));
            })
            .on_message(|socket, msg| {
                let _ = socket.send(msg);
            })
            .on_close(move |_, frame| {
                *seen.lock().unwrap() = Some(frame.is_some());
            });

        let info = request(http::Request::builder().uri("/chat")).info();
        let (_stop_tx, stop) = watch::channel(false);
        let server = tokio::spawn(async move {
            let stream = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
            run(stream, Arc::new(handler), info, stop).await;
        });

        let mut client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
        let greeting = client.next().await.unwrap().unwrap();
        assert_eq!(greeting.into_text().unwrap().as_str(), "hello /chat");

        client.send(Message::text("ping")).await.unwrap();
        let echo = client.next().await.unwrap().unwrap();
        assert_eq!(echo.into_text().unwrap().as_str(), "ping");

        client.close(None).await.unwrap();
        while let Some(Ok(_)) = client.next().await {}
        server.await.unwrap();
        assert_eq!(*closed.lock().unwrap(), Some(false));
    }

    #[tokio::test]
    async fn stop_signal_closes_the_session_as_going_away() {
        let (server_io, client_io) = tokio::io::duplex(4096);
        let closed = Arc::new(Mutex::new(false));
        let seen = Arc::clone(&closed);
        let handler = WsHandler::new().on_close(move |_, _| *seen.lock().unwrap() = true);

        let info = request(http::Request::builder().uri("/ws")).info();
        let (stop_tx, stop) = watch::channel(false);
        let server = tokio::spawn(async move {
            let stream = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
            run(stream, Arc::new(handler), info, stop).await;
        });

        let mut client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
        stop_tx.send_replace(true);

        let frame = match client.next().await.unwrap().unwrap() {
            Message::Close(Some(frame)) => frame,
            other => panic!("expected a close frame, got {other:?}"),
        };
        assert_eq!(frame.code, CloseCode::Away);
        server.await.unwrap();
        assert!(*closed.lock().unwrap());
    }
}
