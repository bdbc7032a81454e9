//! Dispatch of decoded client events to the engine

use crate::error::{ProtocolError, Result};
use crate::metrics::MetricsCollector;
use crate::queue::{EngineHandle, JoinStatus, Outcome, ReplyHandle};
use crate::transport::messages::{parse_inbound, InboundEvent};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Trait defining the interface for handling client messages
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle a validated event from a connection
    async fn handle_event(&self, event: InboundEvent, reply: ReplyHandle) -> Result<()>;

    /// Handle a message that could not be decoded
    async fn handle_error(&self, error: ProtocolError, reply: ReplyHandle);
}

/// Decode one text frame and route it through `handler`.
///
/// Decoding failures go to [`MessageHandler::handle_error`]; internal failures
/// are logged and reported to the sender as a generic error.
pub async fn dispatch_frame(handler: &dyn MessageHandler, text: &str, reply: ReplyHandle) {
    match parse_inbound(text) {
        Ok(event) => {
            let event_name = event.event_name();
            if let Err(e) = handler.handle_event(event, reply.clone()).await {
                error!("Failed to handle {} event: {}", event_name, e);
                reply.deliver(Outcome::error("Internal server error"));
            }
        }
        Err(e) => handler.handle_error(e, reply).await,
    }
}

/// Handler that applies client events to the matchmaking engine
pub struct EngineMessageHandler {
    engine: EngineHandle,
    metrics: Option<Arc<MetricsCollector>>,
}

impl EngineMessageHandler {
    pub fn new(engine: EngineHandle) -> Self {
        Self {
            engine,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn record(&self, event: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_ws_message(event);
        }
    }
}

#[async_trait]
impl MessageHandler for EngineMessageHandler {
    async fn handle_event(&self, event: InboundEvent, reply: ReplyHandle) -> Result<()> {
        self.record(event.event_name());

        match event {
            InboundEvent::JoinQueue { player_id, stake } => {
                let status = self.engine.join(player_id.clone(), stake, reply)?;
                if status == JoinStatus::RejectedOnCooldown {
                    debug!("Join from player '{}' rejected, on cooldown", player_id);
                }
            }
            InboundEvent::LeaveQueue { player_id } => {
                // The sender is told it left even if it was not queued
                self.engine.leave(&player_id)?;
                reply.deliver(Outcome::left_queue());
            }
        }
        Ok(())
    }

    async fn handle_error(&self, error: ProtocolError, reply: ReplyHandle) {
        warn!("Rejected client message: {}", error);
        self.record("invalid");
        reply.deliver(Outcome::error(error.to_string()));
    }
}
