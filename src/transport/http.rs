//! Client-facing HTTP server: the WebSocket gateway and the queue API

use crate::metrics::MetricsCollector;
use crate::queue::EngineHandle;
use crate::transport::handler::{EngineMessageHandler, MessageHandler};
use crate::transport::websocket::ws_handler;
use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Gateway server configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub port: u16,
    pub host: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            host: "0.0.0.0".to_string(),
        }
    }
}

/// Shared state for gateway handlers
#[derive(Clone)]
pub struct GatewayState {
    pub engine: EngineHandle,
    pub handler: Arc<dyn MessageHandler>,
    pub metrics: Option<Arc<MetricsCollector>>,
}

impl GatewayState {
    /// State that routes every client message straight to `engine`
    pub fn new(engine: EngineHandle, metrics: Option<Arc<MetricsCollector>>) -> Self {
        let handler = match &metrics {
            Some(metrics) => {
                EngineMessageHandler::new(engine.clone()).with_metrics(metrics.clone())
            }
            None => EngineMessageHandler::new(engine.clone()),
        };

        Self {
            engine,
            handler: Arc::new(handler),
            metrics,
        }
    }
}

/// Server accepting player WebSocket connections and queue queries
pub struct GatewayServer {
    config: GatewayConfig,
    state: GatewayState,
    shutdown_tx: broadcast::Sender<()>,
}

impl GatewayServer {
    pub fn new(config: GatewayConfig, state: GatewayState) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            state,
            shutdown_tx,
        }
    }

    /// Serve until [`GatewayServer::stop`] is called
    pub async fn start(&self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .context("Invalid gateway address")?;

        let app = self.create_router();
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind gateway to {}", addr))?;

        info!("Gateway listening on http://{} (WebSocket at /ws)", addr);

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("Gateway shutdown signal received");
            })
            .await?;

        info!("Gateway stopped");
        Ok(())
    }

    pub fn create_router(&self) -> Router {
        Router::new()
            .route("/", get(root_handler))
            .route("/ws", get(ws_handler))
            .route("/api/queue", get(queue_handler))
            .route("/api/players/{player_id}", get(player_handler))
            .with_state(self.state.clone())
    }

    pub async fn stop(&self) -> Result<()> {
        info!("Stopping gateway...");

        if let Err(e) = self.shutdown_tx.send(()) {
            warn!("Failed to send shutdown signal to gateway: {}", e);
        }

        Ok(())
    }
}

async fn root_handler() -> impl IntoResponse {
    Json(json!({
        "service": "wager-match",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": ["/ws", "/api/queue", "/api/players/{playerId}"]
    }))
}

/// Current queue, oldest entry first
async fn queue_handler(State(state): State<GatewayState>) -> impl IntoResponse {
    debug!("Queue listing requested");

    match state.engine.snapshot() {
        Ok(queue) => (StatusCode::OK, Json(json!({ "queue": queue }))),
        Err(e) => {
            error!("Failed to read queue: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to read queue" })),
            )
        }
    }
}

/// State and retry count of one player
async fn player_handler(
    State(state): State<GatewayState>,
    Path(player_id): Path<String>,
) -> impl IntoResponse {
    debug!("State requested for player '{}'", player_id);

    match state.engine.player_state(&player_id) {
        Ok(status) => (StatusCode::OK, Json(json!(status))),
        Err(e) => {
            error!("Failed to read state for player '{}': {}", player_id, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to read player state" })),
            )
        }
    }
}
