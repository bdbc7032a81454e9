//! Metrics and monitoring for the wager matchmaking service
//!
//! This module provides Prometheus metrics collection and the HTTP server
//! that exposes them alongside health checks.

pub mod collector;
pub mod health;

pub use collector::{
    ConnectionMetrics, MetricsCollector, MetricsTimer, PerformanceMetrics, QueueMetrics,
    ServiceMetrics,
};
pub use health::{HealthServer, HealthServerConfig};

use std::sync::Arc;

/// Collector plus the operations server that exposes it
#[derive(Clone)]
pub struct MetricsService {
    collector: Arc<MetricsCollector>,
    health_server: Arc<HealthServer>,
}

impl MetricsService {
    pub fn new(collector: Arc<MetricsCollector>, health_server: Arc<HealthServer>) -> Self {
        Self {
            collector,
            health_server,
        }
    }

    pub fn collector(&self) -> Arc<MetricsCollector> {
        self.collector.clone()
    }

    /// Serve health checks and `/metrics` until stopped
    pub async fn start(&self) -> anyhow::Result<()> {
        self.health_server.start().await
    }

    pub async fn stop(&self) -> anyhow::Result<()> {
        self.health_server.stop().await
    }
}
