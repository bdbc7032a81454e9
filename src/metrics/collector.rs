//! Metrics collection using Prometheus
//!
//! This module provides metrics collection for the wager matchmaking service
//! using Prometheus metrics.

use crate::queue::EngineStats;
use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

const WAIT_TIME_BUCKETS: &[f64] = &[0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0];

/// Main metrics collector for the matchmaking service
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Client connection metrics
    connection_metrics: ConnectionMetrics,

    /// Queue and matching metrics
    queue_metrics: QueueMetrics,

    /// Performance metrics
    performance_metrics: PerformanceMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Total AMQP messages published
    pub amqp_messages_total: IntCounterVec,

    /// AMQP publish errors
    pub amqp_errors_total: IntCounterVec,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,

    /// Component health status
    pub component_health: IntGaugeVec,
}

/// Client connection metrics
#[derive(Clone)]
pub struct ConnectionMetrics {
    /// Currently open WebSocket connections
    pub ws_connections_active: IntGauge,

    /// WebSocket connections accepted since start
    pub ws_connections_total: IntCounter,

    /// Inbound messages by event
    pub ws_messages_total: IntCounterVec,
}

/// Queue and matching metrics
#[derive(Clone)]
pub struct QueueMetrics {
    /// Join requests by result
    pub joins_total: IntCounterVec,

    /// Explicit leaves
    pub leaves_total: IntCounter,

    /// Pairs formed
    pub matches_total: IntCounter,

    /// Unmatched passes recorded against queued players
    pub retry_misses_total: IntCounter,

    /// Cooldowns applied
    pub cooldowns_total: IntCounter,

    /// Players dropped by the match timer
    pub timeouts_total: IntCounter,

    /// Players currently waiting in queue
    pub players_waiting: IntGauge,

    /// Players currently on cooldown
    pub players_on_cooldown: IntGauge,

    /// Time spent queued, by how the wait ended
    pub queue_wait_time_seconds: HistogramVec,
}

/// Performance metrics
#[derive(Clone)]
pub struct PerformanceMetrics {
    /// Matching pass duration
    pub matching_pass_duration: Histogram,

    /// AMQP operation durations
    pub amqp_operation_duration: HistogramVec,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let connection_metrics = ConnectionMetrics::new(&registry)?;
        let queue_metrics = QueueMetrics::new(&registry)?;
        let performance_metrics = PerformanceMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            connection_metrics,
            queue_metrics,
            performance_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    pub fn connections(&self) -> &ConnectionMetrics {
        &self.connection_metrics
    }

    pub fn queue(&self) -> &QueueMetrics {
        &self.queue_metrics
    }

    pub fn performance(&self) -> &PerformanceMetrics {
        &self.performance_metrics
    }

    /// Refresh gauges from an engine snapshot
    pub fn update_from_engine_stats(&self, stats: &EngineStats) {
        self.queue_metrics
            .players_waiting
            .set(stats.players_waiting as i64);
        self.queue_metrics
            .players_on_cooldown
            .set(stats.players_on_cooldown as i64);
    }

    /// Record a join request; `result` is "joined", "updated" or "rejected_cooldown"
    pub fn record_join(&self, result: &str) {
        self.queue_metrics
            .joins_total
            .with_label_values(&[result])
            .inc();
    }

    pub fn record_leave(&self) {
        self.queue_metrics.leaves_total.inc();
    }

    /// Record a pair, with how long each side waited
    pub fn record_match(&self, waits: &[Duration]) {
        self.queue_metrics.matches_total.inc();
        for wait in waits {
            self.queue_metrics
                .queue_wait_time_seconds
                .with_label_values(&["matched"])
                .observe(wait.as_secs_f64());
        }
    }

    pub fn record_retry_miss(&self) {
        self.queue_metrics.retry_misses_total.inc();
    }

    pub fn record_cooldown(&self) {
        self.queue_metrics.cooldowns_total.inc();
    }

    /// Record a player dropped by its match timer after `waited`
    pub fn record_timeout(&self, waited: Duration) {
        self.queue_metrics.timeouts_total.inc();
        self.queue_metrics
            .queue_wait_time_seconds
            .with_label_values(&["timed_out"])
            .observe(waited.as_secs_f64());
    }

    pub fn set_players_waiting(&self, count: usize) {
        self.queue_metrics.players_waiting.set(count as i64);
    }

    /// Record matching pass duration
    pub fn record_matching_pass(&self, duration: Duration) {
        self.performance_metrics
            .matching_pass_duration
            .observe(duration.as_secs_f64());
    }

    pub fn record_ws_connection_opened(&self) {
        self.connection_metrics.ws_connections_total.inc();
        self.connection_metrics.ws_connections_active.inc();
    }

    pub fn record_ws_connection_closed(&self) {
        self.connection_metrics.ws_connections_active.dec();
    }

    /// Record an inbound client message
    pub fn record_ws_message(&self, event: &str) {
        self.connection_metrics
            .ws_messages_total
            .with_label_values(&[event])
            .inc();
    }

    /// Record AMQP operation
    pub fn record_amqp_operation(&self, operation: &str, success: bool, duration: Duration) {
        let status = if success { "success" } else { "error" };

        self.service_metrics
            .amqp_messages_total
            .with_label_values(&[operation, status])
            .inc();

        if !success {
            self.service_metrics
                .amqp_errors_total
                .with_label_values(&[operation])
                .inc();
        }

        self.performance_metrics
            .amqp_operation_duration
            .with_label_values(&[operation, status])
            .observe(duration.as_secs_f64());
    }

    pub fn update_uptime(&self, uptime: Duration) {
        self.service_metrics
            .uptime_seconds
            .set(uptime.as_secs() as i64);
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }

    /// Update component health
    pub fn update_component_health(&self, component: &str, healthy: bool) {
        let status = if healthy { 1 } else { 0 };
        self.service_metrics
            .component_health
            .with_label_values(&[component])
            .set(status);
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::new()
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get the elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds =
            IntGauge::new("wager_match_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let amqp_messages_total = IntCounterVec::new(
            Opts::new(
                "wager_match_amqp_messages_total",
                "Total AMQP messages published",
            ),
            &["operation", "status"],
        )?;
        registry.register(Box::new(amqp_messages_total.clone()))?;

        let amqp_errors_total = IntCounterVec::new(
            Opts::new("wager_match_amqp_errors_total", "Total AMQP errors"),
            &["operation"],
        )?;
        registry.register(Box::new(amqp_errors_total.clone()))?;

        let health_status = IntGauge::new(
            "wager_match_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        let component_health = IntGaugeVec::new(
            Opts::new("wager_match_component_health", "Component health status"),
            &["component"],
        )?;
        registry.register(Box::new(component_health.clone()))?;

        Ok(Self {
            uptime_seconds,
            amqp_messages_total,
            amqp_errors_total,
            health_status,
            component_health,
        })
    }
}

impl ConnectionMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let ws_connections_active = IntGauge::new(
            "wager_match_ws_connections_active",
            "Open WebSocket connections",
        )?;
        registry.register(Box::new(ws_connections_active.clone()))?;

        let ws_connections_total = IntCounter::new(
            "wager_match_ws_connections_total",
            "WebSocket connections accepted",
        )?;
        registry.register(Box::new(ws_connections_total.clone()))?;

        let ws_messages_total = IntCounterVec::new(
            Opts::new("wager_match_ws_messages_total", "Inbound client messages"),
            &["event"],
        )?;
        registry.register(Box::new(ws_messages_total.clone()))?;

        Ok(Self {
            ws_connections_active,
            ws_connections_total,
            ws_messages_total,
        })
    }
}

impl QueueMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let joins_total = IntCounterVec::new(
            Opts::new("wager_match_joins_total", "Join requests by result"),
            &["result"],
        )?;
        registry.register(Box::new(joins_total.clone()))?;

        let leaves_total =
            IntCounter::new("wager_match_leaves_total", "Players that left the queue")?;
        registry.register(Box::new(leaves_total.clone()))?;

        let matches_total = IntCounter::new("wager_match_matches_total", "Pairs formed")?;
        registry.register(Box::new(matches_total.clone()))?;

        let retry_misses_total = IntCounter::new(
            "wager_match_retry_misses_total",
            "Unmatched passes recorded against queued players",
        )?;
        registry.register(Box::new(retry_misses_total.clone()))?;

        let cooldowns_total =
            IntCounter::new("wager_match_cooldowns_total", "Cooldowns applied")?;
        registry.register(Box::new(cooldowns_total.clone()))?;

        let timeouts_total = IntCounter::new(
            "wager_match_timeouts_total",
            "Players removed by the match timer",
        )?;
        registry.register(Box::new(timeouts_total.clone()))?;

        let players_waiting = IntGauge::new(
            "wager_match_players_waiting",
            "Players currently waiting in queue",
        )?;
        registry.register(Box::new(players_waiting.clone()))?;

        let players_on_cooldown = IntGauge::new(
            "wager_match_players_on_cooldown",
            "Players currently on cooldown",
        )?;
        registry.register(Box::new(players_on_cooldown.clone()))?;

        let queue_wait_time_seconds = HistogramVec::new(
            HistogramOpts::new("wager_match_queue_wait_time_seconds", "Player queue wait time")
                .buckets(WAIT_TIME_BUCKETS.to_vec()),
            &["outcome"],
        )?;
        registry.register(Box::new(queue_wait_time_seconds.clone()))?;

        Ok(Self {
            joins_total,
            leaves_total,
            matches_total,
            retry_misses_total,
            cooldowns_total,
            timeouts_total,
            players_waiting,
            players_on_cooldown,
            queue_wait_time_seconds,
        })
    }
}

impl PerformanceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let matching_pass_duration = Histogram::with_opts(
            HistogramOpts::new(
                "wager_match_matching_pass_duration_seconds",
                "Matching pass duration",
            )
            .buckets(vec![0.00001, 0.0001, 0.001, 0.005, 0.01, 0.05, 0.1]),
        )?;
        registry.register(Box::new(matching_pass_duration.clone()))?;

        let amqp_operation_duration = HistogramVec::new(
            HistogramOpts::new(
                "wager_match_amqp_operation_duration_seconds",
                "AMQP operation duration",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["operation", "status"],
        )?;
        registry.register(Box::new(amqp_operation_duration.clone()))?;

        Ok(Self {
            matching_pass_duration,
            amqp_operation_duration,
        })
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new().expect("Failed to create default metrics collector")
    }
}
