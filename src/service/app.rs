//! Main application state and service coordination
//!
//! This module contains the production AppState that wires the scheduler,
//! engine, transports, optional AMQP publishing and background tasks.

use crate::amqp::connection::{AmqpConfig, AmqpConnection};
use crate::amqp::publisher::{
    forward_match_events, AmqpEventPublisher, EventPublisher, PublisherConfig,
};
use crate::config::AppConfig;
use crate::metrics::{HealthServer, HealthServerConfig, MetricsCollector, MetricsService};
use crate::queue::{run_timer_dispatch, EngineHandle, MatchmakingEngine};
use crate::scheduler::{TimerEvent, TokioScheduler};
use crate::service::health::{HealthCheck, HealthStatus, ServiceMonitor};
use crate::storage::InMemoryQueueStore;
use crate::transport::{GatewayConfig, GatewayServer, GatewayState};
use crate::types::MatchEvent;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("AMQP connection error: {message}")]
    AmqpConnection { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },

    #[error("Background task error: {message}")]
    BackgroundTask { message: String },
}

/// Outbound publishing wired up when AMQP is enabled
struct AmqpPublishing {
    connection: Arc<AmqpConnection>,
    publisher: Arc<dyn EventPublisher>,
}

/// Main application state containing all service components
pub struct AppState {
    /// Application configuration
    config: AppConfig,

    /// Shared matchmaking engine
    engine: EngineHandle,

    /// Fired timers, consumed by the dispatch task once started
    timer_events: Option<mpsc::UnboundedReceiver<TimerEvent>>,

    /// Match events, consumed by the AMQP forwarder once started
    match_events: Option<mpsc::UnboundedReceiver<MatchEvent>>,

    /// Write-through queue mirror
    store: Option<Arc<InMemoryQueueStore>>,

    /// AMQP connection and publisher, when enabled
    amqp: Option<AmqpPublishing>,

    /// WebSocket gateway and queue API
    gateway: Arc<GatewayServer>,

    /// Metrics service for monitoring and health checks
    metrics_service: Arc<MetricsService>,

    /// Background task handles
    background_tasks: Vec<JoinHandle<()>>,

    /// Service status
    is_running: Arc<RwLock<bool>>,
}

impl AppState {
    /// Initialize the application with all dependencies.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn new(config: AppConfig) -> Result<Self, ServiceError> {
        info!("Initializing wager matchmaking service");
        info!(
            "Configuration: service={}, match_timeout={}s, max_retries={}, cooldown={}s, amqp={}",
            config.service.name,
            config.matchmaking.match_timeout_seconds,
            config.matchmaking.max_retries,
            config.matchmaking.cooldown_seconds,
            if config.amqp.enabled { "enabled" } else { "disabled" }
        );

        let metrics_collector = MetricsCollector::new().map_err(|e| ServiceError::Initialization {
            message: format!("Failed to create metrics collector: {}", e),
        })?;
        let metrics_collector = Arc::new(metrics_collector);

        let amqp = if config.amqp.enabled {
            Some(Self::initialize_amqp(&config).await?)
        } else {
            info!("AMQP publishing disabled - match events stay in process");
            None
        };

        let (scheduler, timer_events) = TokioScheduler::new();
        let mut engine = MatchmakingEngine::new(config.queue_config(), Arc::new(scheduler))
            .with_metrics(metrics_collector.clone());

        let store = if config.matchmaking.enable_store {
            let store = Arc::new(InMemoryQueueStore::new(
                config.matchmaking.store_max_entries,
            ));
            engine = engine.with_store(store.clone());
            Some(store)
        } else {
            None
        };

        let match_events = if amqp.is_some() {
            let (events_tx, events_rx) = mpsc::unbounded_channel();
            engine = engine.with_event_sink(events_tx);
            Some(events_rx)
        } else {
            None
        };

        let engine = EngineHandle::new(engine);
        let is_running = Arc::new(RwLock::new(false));

        let service_name = config.service.name.clone();
        let mut monitor = ServiceMonitor::new(service_name, engine.clone(), is_running.clone());
        if let Some(store) = &store {
            monitor = monitor.with_store(store.clone());
        }
        if let Some(amqp) = &amqp {
            monitor = monitor.with_amqp(amqp.connection.clone());
        }

        let metrics_service = Self::initialize_metrics(&config, metrics_collector.clone(), monitor);

        let gateway = Arc::new(GatewayServer::new(
            GatewayConfig {
                port: config.service.http_port,
                host: config.service.host.clone(),
            },
            GatewayState::new(engine.clone(), Some(metrics_collector)),
        ));

        Ok(Self {
            config,
            engine,
            timer_events: Some(timer_events),
            match_events,
            store,
            amqp,
            gateway,
            metrics_service,
            background_tasks: Vec::new(),
            is_running,
        })
    }

    /// Start servers and background tasks
    pub async fn start(&mut self) -> Result<(), ServiceError> {
        info!("Starting wager matchmaking service");

        *self.is_running.write().await = true;

        self.start_timer_dispatch()?;
        self.start_event_forwarding();
        self.start_metrics_service().await;
        self.start_gateway().await;
        self.start_background_tasks();

        info!("✅ Wager matchmaking service started successfully");
        Ok(())
    }

    /// Perform graceful shutdown
    pub async fn shutdown(&mut self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of wager matchmaking service");

        *self.is_running.write().await = false;

        if let Err(e) = self.gateway.stop().await {
            warn!("Failed to stop gateway: {}", e);
        }

        info!("Stopping metrics service...");
        if let Err(e) = self.metrics_service.stop().await {
            warn!("Failed to stop metrics service: {}", e);
        }

        self.stop_background_tasks().await;

        if let Some(amqp) = &self.amqp {
            match amqp.connection.close().await {
                Ok(_) => info!("✅ AMQP connection closed"),
                Err(e) => warn!("Failed to close AMQP connection: {}", e),
            }
        }

        let final_stats = self
            .engine
            .stats()
            .map_err(|e| ServiceError::BackgroundTask {
                message: format!("Failed to get final stats: {}", e),
            })?;

        info!("Final service statistics: {:?}", final_stats);
        info!("✅ Wager matchmaking service shutdown completed");

        Ok(())
    }

    /// Get service configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Check if service is running
    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    /// Handle to the matchmaking engine
    pub fn engine(&self) -> EngineHandle {
        self.engine.clone()
    }

    /// Get metrics service
    pub fn metrics_service(&self) -> Arc<MetricsService> {
        self.metrics_service.clone()
    }

    /// Queue store mirror, if enabled
    pub fn store(&self) -> Option<Arc<InMemoryQueueStore>> {
        self.store.clone()
    }

    fn initialize_metrics(
        config: &AppConfig,
        metrics_collector: Arc<MetricsCollector>,
        monitor: ServiceMonitor,
    ) -> Arc<MetricsService> {
        info!(
            "Initializing metrics service on port {}",
            config.service.metrics_port
        );

        let health_config = HealthServerConfig {
            port: config.service.metrics_port,
            host: config.service.host.clone(),
        };

        let health_server = Arc::new(
            HealthServer::new(health_config, metrics_collector.clone()).with_monitor(monitor),
        );
        Arc::new(MetricsService::new(metrics_collector, health_server))
    }

    /// Connect to the broker and declare the events exchange
    async fn initialize_amqp(config: &AppConfig) -> Result<AmqpPublishing, ServiceError> {
        info!("Connecting to AMQP broker: {}", config.amqp.url);

        let amqp_config =
            AmqpConfig::from_settings(&config.amqp).map_err(|e| ServiceError::Configuration {
                message: format!("Failed to parse AMQP URL: {}", e),
            })?;

        let connection =
            AmqpConnection::new(amqp_config)
                .await
                .map_err(|e| ServiceError::AmqpConnection {
                    message: format!("Failed to connect to AMQP: {}", e),
                })?;

        let channel = connection
            .open_channel()
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to open publisher channel: {}", e),
            })?;

        let publisher_config = PublisherConfig {
            exchange_name: config.amqp.exchange_name.clone(),
            max_retries: config.amqp.max_retry_attempts,
            retry_delay_ms: config.amqp.retry_delay_ms,
            ..PublisherConfig::default()
        };
        let publisher = AmqpEventPublisher::new(channel, publisher_config)
            .await
            .map_err(|e| ServiceError::Initialization {
                message: format!("Failed to initialize event publisher: {}", e),
            })?;

        Ok(AmqpPublishing {
            connection: Arc::new(connection),
            publisher: Arc::new(publisher),
        })
    }

    fn start_timer_dispatch(&mut self) -> Result<(), ServiceError> {
        let timer_events = self
            .timer_events
            .take()
            .ok_or_else(|| ServiceError::BackgroundTask {
                message: "Timer dispatch already started".to_string(),
            })?;

        let task = tokio::spawn(run_timer_dispatch(self.engine.clone(), timer_events));
        self.background_tasks.push(task);
        Ok(())
    }

    fn start_event_forwarding(&mut self) {
        let (Some(amqp), Some(match_events)) = (&self.amqp, self.match_events.take()) else {
            debug!("Match event forwarding not configured");
            return;
        };

        let task = tokio::spawn(forward_match_events(
            amqp.publisher.clone(),
            match_events,
            Some(self.metrics_service.collector()),
        ));
        self.background_tasks.push(task);
    }

    async fn start_metrics_service(&mut self) {
        let metrics_service = self.metrics_service.clone();
        let port = self.config.service.metrics_port;

        let task = tokio::spawn(async move {
            if let Err(e) = metrics_service.start().await {
                error!("Metrics service failed: {}", e);
            }
        });
        self.background_tasks.push(task);

        // Give the server a moment to bind
        tokio::time::sleep(Duration::from_millis(100)).await;
        info!("✅ Metrics service started on port {}", port);
    }

    async fn start_gateway(&mut self) {
        let gateway = self.gateway.clone();
        let port = self.config.service.http_port;

        let task = tokio::spawn(async move {
            if let Err(e) = gateway.start().await {
                error!("Gateway failed: {}", e);
            }
        });
        self.background_tasks.push(task);

        tokio::time::sleep(Duration::from_millis(100)).await;
        info!("✅ Gateway started on port {}", port);
    }

    /// Periodically refresh gauges and health metrics
    fn start_background_tasks(&mut self) {
        let stats_interval = self.config.stats_interval();
        info!(
            "Starting metrics refresh task ({}s interval)...",
            stats_interval.as_secs()
        );

        let engine = self.engine.clone();
        let metrics_collector = self.metrics_service.collector();
        let is_running = self.is_running.clone();
        let mut monitor = ServiceMonitor::new(
            self.config.service.name.clone(),
            engine.clone(),
            is_running.clone(),
        );
        if let Some(store) = &self.store {
            monitor = monitor.with_store(store.clone());
        }
        if let Some(amqp) = &self.amqp {
            monitor = monitor.with_amqp(amqp.connection.clone());
        }

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(stats_interval);
            let start_time = tokio::time::Instant::now();
            info!("Metrics refresh task started");

            while *is_running.read().await {
                interval.tick().await;

                match engine.stats() {
                    Ok(stats) => {
                        debug!(
                            "Updating metrics - waiting: {}, on cooldown: {}, matches: {}",
                            stats.players_waiting, stats.players_on_cooldown, stats.total_matches
                        );
                        metrics_collector.update_from_engine_stats(&stats);
                    }
                    Err(e) => warn!("Failed to get engine stats for metrics update: {}", e),
                }

                metrics_collector.update_uptime(start_time.elapsed());

                match HealthCheck::check(&monitor).await {
                    Ok(health) => {
                        metrics_collector.update_health_status(health.status.as_gauge());
                        for check in &health.checks {
                            metrics_collector.update_component_health(
                                &check.name,
                                check.status == HealthStatus::Healthy,
                            );
                        }
                    }
                    Err(e) => warn!("Health check for metrics failed: {}", e),
                }
            }

            info!("Metrics refresh task stopped");
        });

        self.background_tasks.push(task);
    }

    /// Stop all background tasks
    async fn stop_background_tasks(&mut self) {
        let task_count = self.background_tasks.len();
        if task_count == 0 {
            info!("No background tasks to stop");
            return;
        }

        info!("Stopping {} background tasks...", task_count);

        for (i, task) in self.background_tasks.drain(..).enumerate() {
            debug!("Aborting background task {}/{}", i + 1, task_count);
            task.abort();
        }

        info!("✅ All {} background tasks stopped", task_count);
    }
}
