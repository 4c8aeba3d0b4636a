use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use log::{info, warn};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::telemetry::Telemetry;

/// Scrape endpoint. Owns the listening socket until [`MetricsServer::serve`]
/// returns.
pub struct MetricsServer {
    listener: TcpListener,
    telemetry: Arc<Telemetry>,
}

impl MetricsServer {
    pub async fn bind(host: &str, port: u16, telemetry: Arc<Telemetry>) -> Result<Self> {
        let listener = TcpListener::bind((host, port))
            .await
            .with_context(|| format!("Failed to bind metrics listener on {}:{}", host, port))?;
        Ok(Self {
            listener,
            telemetry,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("Failed to read metrics listener address")
    }

    /// Serves scrapes until `shutdown` fires, then drops the listener.
    pub async fn serve(self, shutdown: CancellationToken) {
        if let Ok(addr) = self.local_addr() {
            info!("Serving metrics at http://{}/metrics", addr);
        }

        let app = router(self.telemetry);
        if let Err(e) = axum::serve(self.listener, app)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
        {
            warn!("Metrics server failed: {}", e);
        }

        info!("Metrics server stopped");
    }
}

// `get` also answers HEAD and turns other methods into 405.
fn router(telemetry: Arc<Telemetry>) -> Router {
    Router::new()
        .route("/metrics", get(scrape))
        .route("/", get(scrape))
        .fallback(not_found)
        .with_state(telemetry)
}

async fn scrape(State(telemetry): State<Arc<Telemetry>>) -> Response {
    match telemetry.encode() {
        Ok((content_type, body)) => ([(header::CONTENT_TYPE, content_type)], body).into_response(),
        Err(e) => {
            warn!("Failed to render metrics: {:#}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error\n").into_response()
        }
    }
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not Found\n")
}

/// Sends a raw request and returns the whole response. Requests should ask
/// for `Connection: close` so the read ends.
#[cfg(test)]
pub(crate) async fn http_request(addr: SocketAddr, raw: &str) -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw.as_bytes()).await.unwrap();
    let mut out = String::new();
    stream.read_to_string(&mut out).await.unwrap();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probes::{ProbeProtocol, Target};
    use crate::state::HealthState;
    use crate::telemetry::{HEALTHY_GAUGE, sample_value};

    fn telemetry() -> Arc<Telemetry> {
        let state = Arc::new(HealthState::default());
        Arc::new(
            Telemetry::new(&Target::new("127.0.0.1", 19132), ProbeProtocol::Raknet, state).unwrap(),
        )
    }

    async fn running_server() -> (SocketAddr, CancellationToken, tokio::task::JoinHandle<()>) {
        let server = MetricsServer::bind("127.0.0.1", 0, telemetry()).await.unwrap();
        let addr = server.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(server.serve(shutdown.clone()));
        (addr, shutdown, handle)
    }

    fn request(method: &str, path: &str) -> String {
        format!(
            "{} {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
            method, path
        )
    }

    fn body_of(response: &str) -> &str {
        response.split_once("\r\n\r\n").map(|(_, body)| body).unwrap_or("")
    }

    #[tokio::test]
    async fn test_get_metrics_returns_exposition() {
        let (addr, shutdown, handle) = running_server().await;

        let response = http_request(addr, &request("GET", "/metrics")).await;
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "{}", response);
        assert!(response.to_ascii_lowercase().contains("content-type: text/plain"));
        assert_eq!(sample_value(body_of(&response), HEALTHY_GAUGE), Some(0.0));

        let response = http_request(addr, &request("GET", "/")).await;
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "{}", response);
        assert!(response.contains(HEALTHY_GAUGE));

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_head_has_headers_only() {
        let (addr, shutdown, handle) = running_server().await;

        let response = http_request(addr, &request("HEAD", "/metrics")).await;
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "{}", response);
        assert!(body_of(&response).is_empty());

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_path_and_method() {
        let (addr, shutdown, handle) = running_server().await;

        let response = http_request(addr, &request("GET", "/favicon.ico")).await;
        assert!(response.starts_with("HTTP/1.1 404"), "{}", response);

        let response = http_request(addr, &request("POST", "/metrics")).await;
        assert!(response.starts_with("HTTP/1.1 405"), "{}", response);
        assert!(response.to_ascii_lowercase().contains("\r\nallow: get"));

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_releases_socket() {
        let (addr, shutdown, handle) = running_server().await;
        shutdown.cancel();
        handle.await.unwrap();

        // Port is free again.
        let rebound = TcpListener::bind(addr).await;
        assert!(rebound.is_ok());
    }

    #[tokio::test]
    async fn test_bind_conflict_is_an_error() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();

        let result = MetricsServer::bind("127.0.0.1", port, telemetry()).await;
        assert!(result.is_err());
    }
}
