//! Health checks and monitoring
//!
//! This module provides health check functionality for the wager matchmaking
//! service, including readiness and liveness checks.

use crate::amqp::AmqpConnection;
use crate::queue::EngineHandle;
use crate::storage::InMemoryQueueStore;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, error};

/// Health check status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Gauge value exported to Prometheus
    pub fn as_gauge(&self) -> u8 {
        match self {
            HealthStatus::Healthy => 2,
            HealthStatus::Degraded => 1,
            HealthStatus::Unhealthy => 0,
        }
    }

    fn combine(&mut self, component: &HealthStatus) {
        match component {
            HealthStatus::Unhealthy => *self = HealthStatus::Unhealthy,
            HealthStatus::Degraded if *self == HealthStatus::Healthy => {
                *self = HealthStatus::Degraded
            }
            _ => {}
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "✅ healthy"),
            HealthStatus::Degraded => write!(f, "⚠️  degraded"),
            HealthStatus::Unhealthy => write!(f, "❌ unhealthy"),
        }
    }
}

/// Everything a health check needs to look at
#[derive(Clone)]
pub struct ServiceMonitor {
    pub service_name: String,
    pub engine: EngineHandle,
    pub is_running: Arc<RwLock<bool>>,
    pub store: Option<Arc<InMemoryQueueStore>>,
    pub amqp_connection: Option<Arc<AmqpConnection>>,
    pub started_at: Instant,
}

impl ServiceMonitor {
    pub fn new(
        service_name: impl Into<String>,
        engine: EngineHandle,
        is_running: Arc<RwLock<bool>>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            engine,
            is_running,
            store: None,
            amqp_connection: None,
            started_at: Instant::now(),
        }
    }

    pub fn with_store(mut self, store: Arc<InMemoryQueueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_amqp(mut self, connection: Arc<AmqpConnection>) -> Self {
        self.amqp_connection = Some(connection);
        self
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Overall service status
    pub status: HealthStatus,
    /// Service name
    pub service: String,
    /// Service version
    pub version: String,
    /// Current timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Detailed component checks
    pub checks: Vec<ComponentCheck>,
    /// Service statistics
    pub stats: ServiceStats,
}

/// Individual component health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCheck {
    /// Component name
    pub name: String,
    /// Component status
    pub status: HealthStatus,
    /// Optional detail, set when not healthy
    pub message: Option<String>,
    /// Check duration in milliseconds
    pub duration_ms: u64,
}

/// Service statistics for health reporting
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceStats {
    pub players_waiting: usize,
    pub players_on_cooldown: usize,
    pub total_joins: u64,
    pub total_matches: u64,
    pub total_cooldowns: u64,
    pub total_timeouts: u64,
    pub uptime_seconds: u64,
}

impl HealthCheck {
    /// Perform a full health check of the service
    pub async fn check(monitor: &ServiceMonitor) -> Result<Self> {
        let mut checks = Vec::new();
        let mut overall_status = HealthStatus::Healthy;

        checks.push(Self::check_service_running(monitor).await);
        checks.push(Self::check_engine(monitor));
        if let Some(check) = Self::check_store(monitor) {
            checks.push(check);
        }
        if let Some(check) = Self::check_amqp(monitor) {
            checks.push(check);
        }

        for check in &checks {
            overall_status.combine(&check.status);
        }

        let stats = Self::gather_service_stats(monitor);

        Ok(HealthCheck {
            status: overall_status,
            service: monitor.service_name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono::Utc::now(),
            checks,
            stats,
        })
    }

    /// Simple liveness check - just verify service is running
    pub async fn liveness_check(monitor: &ServiceMonitor) -> Result<HealthStatus> {
        if monitor.is_running().await {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Unhealthy)
        }
    }

    /// Readiness check - verify service can accept players
    pub async fn readiness_check(monitor: &ServiceMonitor) -> Result<HealthStatus> {
        if !monitor.is_running().await {
            return Ok(HealthStatus::Unhealthy);
        }

        Ok(Self::check_engine(monitor).status)
    }

    async fn check_service_running(monitor: &ServiceMonitor) -> ComponentCheck {
        let start = Instant::now();

        let (status, message) = if monitor.is_running().await {
            (HealthStatus::Healthy, None)
        } else {
            (
                HealthStatus::Unhealthy,
                Some("Service is not running".to_string()),
            )
        };

        ComponentCheck {
            name: "service_running".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// The engine is healthy as long as its lock can be taken
    fn check_engine(monitor: &ServiceMonitor) -> ComponentCheck {
        let start = Instant::now();

        let (status, message) = match monitor.engine.stats() {
            Ok(_) => (HealthStatus::Healthy, None),
            Err(e) => {
                error!("Engine health check failed: {}", e);
                (HealthStatus::Unhealthy, Some(e.to_string()))
            }
        };

        ComponentCheck {
            name: "engine".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Store problems only degrade the service; the engine keeps running without it
    fn check_store(monitor: &ServiceMonitor) -> Option<ComponentCheck> {
        let store = monitor.store.as_ref()?;
        let start = Instant::now();

        let (status, message) = match store.len() {
            Ok(_) => (HealthStatus::Healthy, None),
            Err(e) => (HealthStatus::Degraded, Some(e.to_string())),
        };

        Some(ComponentCheck {
            name: "queue_store".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    fn check_amqp(monitor: &ServiceMonitor) -> Option<ComponentCheck> {
        let connection = monitor.amqp_connection.as_ref()?;
        let start = Instant::now();

        let (status, message) = if connection.is_alive() {
            (HealthStatus::Healthy, None)
        } else {
            (
                HealthStatus::Degraded,
                Some("AMQP connection closed, match events are not published".to_string()),
            )
        };

        Some(ComponentCheck {
            name: "amqp_connection".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    fn gather_service_stats(monitor: &ServiceMonitor) -> ServiceStats {
        let uptime_seconds = monitor.started_at.elapsed().as_secs();

        match monitor.engine.stats() {
            Ok(stats) => ServiceStats {
                players_waiting: stats.players_waiting,
                players_on_cooldown: stats.players_on_cooldown,
                total_joins: stats.total_joins,
                total_matches: stats.total_matches,
                total_cooldowns: stats.total_cooldowns,
                total_timeouts: stats.total_timeouts,
                uptime_seconds,
            },
            Err(e) => {
                debug!("Failed to get engine stats for health check: {}", e);
                ServiceStats {
                    uptime_seconds,
                    ..ServiceStats::default()
                }
            }
        }
    }

    /// Convert health check to JSON string
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize health check: {}", e))
    }
}
