use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use serde_json::json;
use std::{net::SocketAddr, sync::Arc, time::Instant};
use tokio::sync::broadcast;
use tracing::info;

use crate::plugin::RedisPlugin;

/// HTTP server for liveness and readiness checks
pub struct HttpServer {
    plugin: Arc<RedisPlugin>,
    bind_addr: SocketAddr,
}

impl HttpServer {
    pub fn new(plugin: Arc<RedisPlugin>, bind_addr: SocketAddr) -> Self {
        Self { plugin, bind_addr }
    }

    /// Start the HTTP server; returns once `shutdown_rx` fires.
    pub async fn start(
        self,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let app = router(self.plugin);

        info!("Starting HTTP server on {}", self.bind_addr);
        let listener = tokio::net::TcpListener::bind(self.bind_addr).await?;

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("HTTP server received shutdown signal");
            })
            .await?;

        Ok(())
    }
}

#[derive(Clone)]
struct AppState {
    plugin: Arc<RedisPlugin>,
    startup_time: Instant,
}

pub fn router(plugin: Arc<RedisPlugin>) -> Router {
    let state = AppState {
        plugin,
        startup_time: Instant::now(),
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .with_state(state)
}

/// Liveness: the process is up and serving HTTP
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "zones": state.plugin.zones().len(),
            "uptime_seconds": state.startup_time.elapsed().as_secs(),
        })),
    )
}

/// Readiness: the record store answers
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    if state.plugin.ready().await {
        (StatusCode::OK, Json(json!({"status": "ready"})))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "unavailable"})),
        )
    }
}
