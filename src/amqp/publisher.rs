//! AMQP event publisher for outbound match events

use crate::amqp::messages::{MessageEnvelope, MessageUtils};
use crate::error::{MatchmakingError, Result};
use crate::metrics::MetricsCollector;
use crate::types::{CooldownApplied, MatchEvent, MatchFound};
use amqprs::{
    channel::{BasicPublishArguments, Channel, ExchangeDeclareArguments},
    BasicProperties,
};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Trait for publishing matchmaking events
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a pairing
    async fn publish_match_found(&self, event: MatchFound) -> Result<()>;

    /// Publish a player being put on cooldown
    async fn publish_cooldown_applied(&self, event: CooldownApplied) -> Result<()>;

    /// Publish any match event under its own routing key
    async fn publish(&self, event: MatchEvent) -> Result<()> {
        match event {
            MatchEvent::MatchFound(found) => self.publish_match_found(found).await,
            MatchEvent::CooldownApplied(cooldown) => self.publish_cooldown_applied(cooldown).await,
        }
    }
}

/// Configuration for event publishing
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub exchange_name: String,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub enable_deduplication: bool,
    /// Deduplication cache is cleared once it holds this many ids
    pub dedup_cache_limit: usize,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            exchange_name: crate::amqp::messages::MATCH_EVENTS_EXCHANGE.to_string(),
            max_retries: 3,
            retry_delay_ms: 500,
            enable_deduplication: true,
            dedup_cache_limit: 10000,
        }
    }
}

/// AMQP-based event publisher implementation
pub struct AmqpEventPublisher {
    channel: Channel,
    config: PublisherConfig,
    published_messages: Mutex<HashSet<String>>,
}

impl AmqpEventPublisher {
    /// Create a new event publisher and declare its exchange
    pub async fn new(channel: Channel, config: PublisherConfig) -> Result<Self> {
        let publisher = Self {
            channel,
            config,
            published_messages: Mutex::new(HashSet::new()),
        };

        publisher.setup_exchange().await?;

        Ok(publisher)
    }

    async fn setup_exchange(&self) -> Result<()> {
        let args = ExchangeDeclareArguments::new(&self.config.exchange_name, "topic");
        self.channel.exchange_declare(args).await.map_err(|e| {
            MatchmakingError::AmqpConnectionFailed {
                message: format!(
                    "Failed to declare exchange {}: {}",
                    self.config.exchange_name, e
                ),
            }
        })?;

        info!(
            "Successfully declared AMQP exchange '{}'",
            self.config.exchange_name
        );
        Ok(())
    }

    fn already_published(&self, correlation_id: &str) -> Result<bool> {
        let published = self
            .published_messages
            .lock()
            .map_err(|_| MatchmakingError::InternalError {
                message: "Failed to acquire published messages lock".to_string(),
            })?;
        Ok(published.contains(correlation_id))
    }

    fn remember_published(&self, correlation_id: &str) -> Result<()> {
        let mut published = self
            .published_messages
            .lock()
            .map_err(|_| MatchmakingError::InternalError {
                message: "Failed to acquire published messages lock".to_string(),
            })?;
        if published.len() >= self.config.dedup_cache_limit {
            published.clear();
        }
        published.insert(correlation_id.to_string());
        Ok(())
    }

    /// Publish to the configured exchange with retry logic
    async fn publish_envelope<T>(&self, envelope: &MessageEnvelope<T>) -> Result<()>
    where
        T: serde::Serialize + serde::de::DeserializeOwned,
    {
        if self.config.enable_deduplication && self.already_published(&envelope.correlation_id)? {
            debug!(
                "Message {} already published, skipping",
                envelope.correlation_id
            );
            return Ok(());
        }

        let mut retry_count = 0;
        let mut delay = Duration::from_millis(self.config.retry_delay_ms);

        loop {
            match self.try_publish(envelope).await {
                Ok(_) => {
                    if self.config.enable_deduplication {
                        self.remember_published(&envelope.correlation_id)?;
                    }

                    debug!(
                        "Successfully published message {} with routing key {}",
                        envelope.correlation_id, envelope.routing_key
                    );
                    return Ok(());
                }
                Err(e) => {
                    retry_count += 1;
                    if retry_count > self.config.max_retries {
                        error!(
                            "Failed to publish message {} after {} retries: {}",
                            envelope.correlation_id, self.config.max_retries, e
                        );
                        return Err(e);
                    }

                    warn!(
                        "Publish attempt {} failed for message {}: {}. Retrying in {:?}",
                        retry_count, envelope.correlation_id, e, delay
                    );

                    sleep(delay).await;
                    delay = Duration::from_millis((delay.as_millis() as u64 * 2).min(5000));
                }
            }
        }
    }

    /// Single publish attempt
    async fn try_publish<T>(&self, envelope: &MessageEnvelope<T>) -> Result<()>
    where
        T: serde::Serialize + serde::de::DeserializeOwned,
    {
        let payload = envelope.to_bytes()?;

        let args = BasicPublishArguments::new(&self.config.exchange_name, &envelope.routing_key);
        let mut properties = BasicProperties::default();
        properties
            .with_message_id(&envelope.correlation_id)
            .with_timestamp(envelope.timestamp.timestamp() as u64)
            .with_content_type("application/json");

        self.channel
            .basic_publish(properties, payload, args)
            .await
            .map_err(|e| MatchmakingError::AmqpConnectionFailed {
                message: format!("Failed to publish message: {}", e),
            })?;

        Ok(())
    }
}

#[async_trait]
impl EventPublisher for AmqpEventPublisher {
    async fn publish_match_found(&self, event: MatchFound) -> Result<()> {
        let envelope = MessageUtils::envelope(MatchEvent::MatchFound(event));
        self.publish_envelope(&envelope).await
    }

    async fn publish_cooldown_applied(&self, event: CooldownApplied) -> Result<()> {
        let envelope = MessageUtils::envelope(MatchEvent::CooldownApplied(event));
        self.publish_envelope(&envelope).await
    }
}

/// Publish every event from `events` until the engine drops its sender
pub async fn forward_match_events(
    publisher: Arc<dyn EventPublisher>,
    mut events: mpsc::UnboundedReceiver<MatchEvent>,
    metrics: Option<Arc<MetricsCollector>>,
) {
    info!("Match event forwarder started");

    while let Some(event) = events.recv().await {
        let operation = MessageUtils::routing_key(&event);
        let timer = metrics.as_ref().map(|m| m.start_timer());

        let result = publisher.publish(event).await;
        if let Err(e) = &result {
            error!("Failed to publish {} event: {}", operation, e);
        }

        if let (Some(metrics), Some(timer)) = (&metrics, timer) {
            metrics.record_amqp_operation(operation, result.is_ok(), timer.stop());
        }
    }

    info!("Match event forwarder stopped");
}

/// Mock event publisher for testing
#[derive(Debug, Default)]
pub struct MockEventPublisher {
    published_events: Mutex<Vec<String>>,
}

impl MockEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all published routing keys (for testing)
    pub fn get_published_events(&self) -> Vec<String> {
        self.published_events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Clear published events (for testing)
    pub fn clear_events(&self) {
        if let Ok(mut events) = self.published_events.lock() {
            events.clear();
        }
    }

    fn push(&self, routing_key: &str) {
        if let Ok(mut events) = self.published_events.lock() {
            events.push(routing_key.to_string());
        }
    }
}

#[async_trait]
impl EventPublisher for MockEventPublisher {
    async fn publish_match_found(&self, _event: MatchFound) -> Result<()> {
        self.push(crate::amqp::messages::MATCH_FOUND_ROUTING_KEY);
        Ok(())
    }

    async fn publish_cooldown_applied(&self, _event: CooldownApplied) -> Result<()> {
        self.push(crate::amqp::messages::PLAYER_COOLDOWN_ROUTING_KEY);
        Ok(())
    }
}
