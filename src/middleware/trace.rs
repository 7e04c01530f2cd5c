use std::time::Instant;

use tracing::{info, warn};

use super::Middleware;

/// Logs one line per request: method, path, status and latency.
///
/// Failures are logged at `WARN` and propagated unchanged, so the event
/// handler still decides the response.
pub fn trace() -> Middleware {
    Middleware::new(|req, next| async move {
        let method = req.method();
        let path = req.path().to_owned();
        let started = Instant::now();

        let result = next.run(req).await;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        match &result {
            Ok(res) => info!(%method, %path, status = res.status_code().as_u16(), latency_ms, "request"),
            Err(e) => warn!(%method, %path, error = %e, latency_ms, "request failed"),
        }
        result
    })
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http::StatusCode;

    use crate::{Error, Request, Router};

    use super::*;

    #[tokio::test]
    async fn passes_responses_and_errors_through() {
        let mut router = Router::new();
        router.layer(trace()).unwrap();
        router.get("/ok", |_: Request| async { StatusCode::ACCEPTED }).unwrap();
        router
            .get("/err", |_: Request| async { Err::<&'static str, _>("broken") })
            .unwrap();

        let req = |path: &str| {
            Request::from_http(http::Request::builder().uri(path).body(Bytes::new()).unwrap()).unwrap()
        };

        let res = router.lookup(crate::Method::Get, "/ok").unwrap().run(req("/ok")).await.unwrap();
        assert_eq!(res.status_code(), StatusCode::ACCEPTED);

        let err = router.lookup(crate::Method::Get, "/err").unwrap().run(req("/err")).await;
        assert!(matches!(err, Err(Error::Handler(_))));
    }
}
