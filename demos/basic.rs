//! Minimal issac example: JSON endpoints under a nested router, request
//! tracing and a WebSocket echo.
//!
//! Run with:
//!   RUST_LOG=issac=debug,info cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/users/42
//!   curl -X POST http://localhost:3000/users \
//!        -H 'content-type: application/json' \
//!        -d '{"name":"alice"}'
//!   curl -X DELETE http://localhost:3000/users/42
//!   websocat ws://localhost:3000/ws

use issac::ws::WsHandler;
use issac::{App, AppConfig, LogConfig, Next, Request, Response, Router, StatusCode, WsConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let ws = WsConfig::new(|req: &Request| req.path() == "/ws").handler(
        WsHandler::new()
            .on_open(|socket| {
                let _ = socket.send(format!("welcome, socket {}", socket.id()));
            })
            .on_message(|socket, msg| {
                let _ = socket.send(msg);
            }),
    );

    let mut app = App::with_config(AppConfig::default().log(LogConfig::default()).ws(ws))?;

    let mut users = Router::with_prefix("/users")?;
    users
        .layer(require_json)?
        .get("/:id", get_user)?
        .post("/", create_user)?
        .delete("/:id", delete_user)?;

    app.layer(issac::middleware::trace())?.layer(users)?;

    app.listen(3000).await?;
    Ok(())
}

// Only applies to POSTs; everything else passes straight through.
async fn require_json(req: Request, next: Next) -> Result<Response, issac::Error> {
    if req.method() == issac::Method::Post && req.header("content-type") != Some("application/json") {
        return Ok(Response::status(StatusCode::UNSUPPORTED_MEDIA_TYPE));
    }
    next.run(req).await
}

// GET /users/:id
async fn get_user(req: Request) -> Response {
    let id = req.param("id").unwrap_or("unknown");
    Response::json(format!(r#"{{"id":"{id}","name":"alice"}}"#))
}

// POST /users
//
// req.body() is raw bytes; parse them with whatever deserialiser you use.
async fn create_user(req: Request) -> Response {
    if req.body().is_empty() {
        return Response::status(StatusCode::BAD_REQUEST);
    }

    Response::builder()
        .status(StatusCode::CREATED)
        .header("location", "/users/99")
        .json(r#"{"id":"99","name":"new_user"}"#)
}

// DELETE /users/:id → 204 No Content
async fn delete_user(_req: Request) -> StatusCode {
    StatusCode::NO_CONTENT
}
