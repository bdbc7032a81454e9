//! Operations HTTP server: health checks, Prometheus scrape endpoint and stats
//!
//! Runs on its own port so the player gateway can be firewalled separately.

use crate::metrics::collector::MetricsCollector;
use crate::service::health::{HealthCheck, HealthStatus, ServiceMonitor};
use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

const SERVICE_NAME: &str = "wager-match";

/// Bind address of the operations server
#[derive(Debug, Clone)]
pub struct HealthServerConfig {
    pub port: u16,
    pub host: String,
}

impl Default for HealthServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".to_string(),
        }
    }
}

#[derive(Clone)]
pub struct HealthServerState {
    pub metrics_collector: Arc<MetricsCollector>,
    pub monitor: Option<ServiceMonitor>,
}

/// Serves `/health`, `/ready`, `/alive`, `/metrics` and `/stats`
pub struct HealthServer {
    config: HealthServerConfig,
    state: HealthServerState,
    shutdown_tx: broadcast::Sender<()>,
}

impl HealthServer {
    pub fn new(config: HealthServerConfig, metrics_collector: Arc<MetricsCollector>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            state: HealthServerState {
                metrics_collector,
                monitor: None,
            },
            shutdown_tx,
        }
    }

    /// Attach the components health checks look at
    pub fn with_monitor(mut self, monitor: ServiceMonitor) -> Self {
        self.state.monitor = Some(monitor);
        self
    }

    /// Serve until [`HealthServer::stop`] is called
    pub async fn start(&self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .context("Invalid operations server address")?;

        let app = self.create_router();
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind operations server to {}", addr))?;

        info!("Operations server listening on http://{}", addr);

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("Operations server received shutdown signal");
            })
            .await?;

        info!("Operations server stopped");
        Ok(())
    }

    fn create_router(&self) -> Router {
        Router::new()
            .route("/", get(root_handler))
            .route("/health", get(health_handler))
            .route("/ready", get(ready_handler))
            .route("/alive", get(alive_handler))
            .route("/metrics", get(metrics_handler))
            .route("/stats", get(stats_handler))
            .with_state(self.state.clone())
    }

    pub async fn stop(&self) -> Result<()> {
        info!("Stopping operations server...");

        if let Err(e) = self.shutdown_tx.send(()) {
            warn!("Operations server shutdown signal not delivered: {}", e);
        }

        Ok(())
    }
}

async fn root_handler() -> impl IntoResponse {
    Json(json!({
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": [
            "/health",
            "/ready",
            "/alive",
            "/metrics",
            "/stats"
        ]
    }))
}

/// Cheap check: is the service running and the engine reachable
async fn health_handler(State(state): State<HealthServerState>) -> impl IntoResponse {
    debug!("GET /health");

    let Some(monitor) = &state.monitor else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "unhealthy",
                "service": SERVICE_NAME,
                "version": env!("CARGO_PKG_VERSION"),
                "error": "Service not initialized"
            })),
        );
    };

    let (code, status) = match HealthCheck::liveness_check(monitor).await {
        Ok(HealthStatus::Healthy) => (StatusCode::OK, "healthy"),
        Ok(HealthStatus::Degraded) => (StatusCode::OK, "degraded"),
        Ok(HealthStatus::Unhealthy) | Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "unhealthy"),
    };

    (
        code,
        Json(json!({
            "status": status,
            "service": SERVICE_NAME,
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// Ready once started with every required component up
async fn ready_handler(State(state): State<HealthServerState>) -> impl IntoResponse {
    debug!("GET /ready");

    match &state.monitor {
        Some(monitor) => match HealthCheck::readiness_check(monitor).await {
            Ok(HealthStatus::Healthy) => (StatusCode::OK, "Ready"),
            Ok(HealthStatus::Degraded) => (StatusCode::OK, "Degraded but ready"),
            Ok(HealthStatus::Unhealthy) => (StatusCode::SERVICE_UNAVAILABLE, "Not ready"),
            Err(e) => {
                error!("Readiness check failed: {}", e);
                (StatusCode::SERVICE_UNAVAILABLE, "Not ready")
            }
        },
        None => (StatusCode::SERVICE_UNAVAILABLE, "Service not initialized"),
    }
}

async fn alive_handler(State(state): State<HealthServerState>) -> impl IntoResponse {
    debug!("GET /alive");

    match &state.monitor {
        Some(monitor) => match HealthCheck::liveness_check(monitor).await {
            Ok(HealthStatus::Healthy) => (StatusCode::OK, "Alive"),
            _ => (StatusCode::SERVICE_UNAVAILABLE, "Not alive"),
        },
        None => (StatusCode::SERVICE_UNAVAILABLE, "Service not initialized"),
    }
}

/// Prometheus text exposition
async fn metrics_handler(State(state): State<HealthServerState>) -> Response {
    debug!("GET /metrics");

    let metric_families = state.metrics_collector.registry().gather();
    let encoder = TextEncoder::new();

    match encoder.encode_to_string(&metric_families) {
        Ok(metrics_output) => {
            debug!("Encoded {} metric families", metric_families.len());
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, encoder.format_type().to_string())],
                metrics_output,
            )
                .into_response()
        }
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to encode metrics".to_string(),
            )
                .into_response()
        }
    }
}

/// Queue sizes, totals and per-component health as JSON
async fn stats_handler(State(state): State<HealthServerState>) -> impl IntoResponse {
    debug!("GET /stats");

    let error_response = |error: &str| {
        json!({
            "service": {
                "name": SERVICE_NAME,
                "version": env!("CARGO_PKG_VERSION"),
                "status": "error"
            },
            "error": error,
            "timestamp": chrono::Utc::now()
        })
    };

    let Some(monitor) = &state.monitor else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(error_response("Service not initialized")),
        );
    };

    match HealthCheck::check(monitor).await {
        Ok(health) => {
            state
                .metrics_collector
                .update_health_status(health.status.as_gauge());

            let stats = json!({
                "service": {
                    "name": health.service,
                    "version": health.version,
                    "status": health.status,
                    "uptime_seconds": health.stats.uptime_seconds
                },
                "queue": {
                    "waiting": health.stats.players_waiting,
                    "on_cooldown": health.stats.players_on_cooldown
                },
                "totals": {
                    "joins": health.stats.total_joins,
                    "matches": health.stats.total_matches,
                    "cooldowns": health.stats.total_cooldowns,
                    "timeouts": health.stats.total_timeouts
                },
                "components": health.checks,
                "timestamp": health.timestamp
            });

            (StatusCode::OK, Json(stats))
        }
        Err(e) => {
            error!("Stats health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(error_response("Failed to get service stats")),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{EngineHandle, MatchmakingEngine, QueueConfig};
    use crate::scheduler::ManualScheduler;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use tokio::sync::RwLock;
    use tower::ServiceExt; // for oneshot

    fn server_with_monitor(running: bool) -> HealthServer {
        let collector = Arc::new(MetricsCollector::new().unwrap());
        let engine = EngineHandle::new(MatchmakingEngine::new(
            QueueConfig::default(),
            Arc::new(ManualScheduler::new()),
        ));
        let monitor = ServiceMonitor::new("wager-match", engine, Arc::new(RwLock::new(running)));
        HealthServer::new(HealthServerConfig::default(), collector).with_monitor(monitor)
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_root_lists_endpoints() {
        let collector = Arc::new(MetricsCollector::new().unwrap());
        let server = HealthServer::new(HealthServerConfig::default(), collector);

        let (status, body) = get(server.create_router(), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("wager-match"));
    }

    #[tokio::test]
    async fn test_metrics_exposes_queue_counters() {
        let collector = Arc::new(MetricsCollector::new().unwrap());
        collector.record_join("joined");
        collector.update_health_status(2);

        let server = HealthServer::new(HealthServerConfig::default(), collector);
        let response = server
            .create_router()
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
        assert!(content_type.starts_with("text/plain"));

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("wager_match_joins_total"));
    }

    #[tokio::test]
    async fn test_health_endpoints_without_monitor() {
        let collector = Arc::new(MetricsCollector::new().unwrap());
        let app = HealthServer::new(HealthServerConfig::default(), collector).create_router();

        for uri in ["/health", "/ready", "/alive", "/stats"] {
            let (status, _) = get(app.clone(), uri).await;
            assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE, "{}", uri);
        }
    }

    #[tokio::test]
    async fn test_health_endpoints_with_running_service() {
        let app = server_with_monitor(true).create_router();

        for uri in ["/health", "/ready", "/alive"] {
            let (status, _) = get(app.clone(), uri).await;
            assert_eq!(status, StatusCode::OK, "{}", uri);
        }

        let (status, body) = get(app, "/stats").await;
        assert_eq!(status, StatusCode::OK);
        let stats: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(stats["service"]["status"], "healthy");
        assert_eq!(stats["queue"]["waiting"], 0);
    }

    #[tokio::test]
    async fn test_stopped_service_reports_unavailable() {
        let app = server_with_monitor(false).create_router();

        let (status, body) = get(app.clone(), "/health").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body.contains("unhealthy"));

        let (status, _) = get(app, "/ready").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_default_config_binds_all_interfaces() {
        let config = HealthServerConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.host, "0.0.0.0");
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let app = server_with_monitor(true).create_router();
        let (status, _) = get(app, "/nonexistent").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
