//! HTTP exposition of the Prometheus sink: `GET /metrics` and `GET /health`.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use hyper::header::{CONTENT_TYPE, HeaderValue};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use obs_core::cancel::CancelSignal;
use obs_core::sink::PrometheusSink;
use tracing::{error, info};

/// Serve until `shutdown` fires.
pub async fn serve(addr: SocketAddr, sink: Arc<PrometheusSink>, shutdown: CancelSignal) -> Result<()> {
    let make_svc = make_service_fn(move |_conn| {
        let sink = sink.clone();
        async move { Ok::<_, Infallible>(service_fn(move |req| handle(req, sink.clone()))) }
    });

    let server = Server::try_bind(&addr).with_context(|| format!("binding metrics server to {addr}"))?.serve(make_svc);
    info!("[metrics] listening on http://{addr}/metrics");

    server.with_graceful_shutdown(async move { shutdown.cancelled().await }).await.context("metrics server")?;
    info!("[metrics] server stopped");
    Ok(())
}

async fn handle(req: Request<Body>, sink: Arc<PrometheusSink>) -> Result<Response<Body>, Infallible> {
    let resp = match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => match sink.encode_text() {
            Ok(text) => {
                let mut resp = respond(StatusCode::OK, text);
                resp.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static(prometheus::TEXT_FORMAT));
                resp
            }
            Err(e) => {
                error!("[metrics] encoding failed: {e}");
                respond(StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics")
            }
        },
        (&Method::GET, "/health") => respond(StatusCode::OK, "OK"),
        _ => respond(StatusCode::NOT_FOUND, "Not Found"),
    };
    Ok(resp)
}

fn respond(status: StatusCode, body: impl Into<Body>) -> Response<Body> {
    let mut resp = Response::new(body.into());
    *resp.status_mut() = status;
    resp
}

#[cfg(test)]
mod tests {
    use obs_core::LabelTuple;
    use obs_core::sink::{MetricSink, SeriesSpec};
    use prometheus::Registry;

    use super::*;

    const SERIES: SeriesSpec =
        SeriesSpec { namespace: "binance", name: "price", help: "price", labels: &["tradeType", "asset", "fiat"] };

    fn get(path: &str) -> Request<Body> {
        Request::builder().method(Method::GET).uri(path).body(Body::empty()).unwrap()
    }

    async fn body_text(resp: Response<Body>) -> String {
        let bytes = hyper::body::to_bytes(resp.into_body()).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn serves_metrics_text() {
        let sink = Arc::new(PrometheusSink::new(Registry::new()).unwrap());
        sink.record(&SERIES, &LabelTuple::from(["BUY", "USDT", "RUB"]), 92.5).unwrap();

        let resp = handle(get("/metrics"), sink).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[CONTENT_TYPE], prometheus::TEXT_FORMAT);
        let text = body_text(resp).await;
        assert!(text.contains("binance_price_count"));
        assert!(text.contains(r#"asset="USDT""#));
    }

    #[tokio::test]
    async fn health_and_unknown_paths() {
        let sink = Arc::new(PrometheusSink::new(Registry::new()).unwrap());
        let health = handle(get("/health"), sink.clone()).await.unwrap();
        assert_eq!(health.status(), StatusCode::OK);
        assert_eq!(body_text(health).await, "OK");

        let missing = handle(get("/nope"), sink).await.unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }
}
