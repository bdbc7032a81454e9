//! Inbound client message definitions and parsing

use crate::error::ProtocolError;
use crate::types::{PlayerId, Stake};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::value::RawValue;
use serde_json::{Map, Value};
use std::str::FromStr;

/// Event names accepted from clients
pub const JOIN_QUEUE_EVENT: &str = "join_queue";
pub const LEAVE_QUEUE_EVENT: &str = "leave_queue";

/// A validated request from a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    JoinQueue { player_id: PlayerId, stake: Stake },
    LeaveQueue { player_id: PlayerId },
}

impl InboundEvent {
    pub fn player_id(&self) -> &str {
        match self {
            InboundEvent::JoinQueue { player_id, .. } => player_id,
            InboundEvent::LeaveQueue { player_id } => player_id,
        }
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            InboundEvent::JoinQueue { .. } => JOIN_QUEUE_EVENT,
            InboundEvent::LeaveQueue { .. } => LEAVE_QUEUE_EVENT,
        }
    }
}

/// Source text of `betAmount`, kept so numeric amounts never pass through f64
#[derive(Deserialize)]
struct RawStake<'a> {
    #[serde(rename = "betAmount", borrow, default)]
    bet_amount: Option<&'a RawValue>,
}

/// Parse and validate one JSON text frame
pub fn parse_inbound(text: &str) -> Result<InboundEvent, ProtocolError> {
    let value: Value = serde_json::from_str(text).map_err(|e| ProtocolError::MalformedInput {
        reason: format!("not valid JSON: {}", e),
    })?;

    let Value::Object(message) = value else {
        return Err(ProtocolError::MalformedInput {
            reason: "expected a JSON object".to_string(),
        });
    };

    let event = match message.get("event") {
        Some(Value::String(event)) => event.as_str(),
        Some(_) => {
            return Err(ProtocolError::MalformedInput {
                reason: "event must be a string".to_string(),
            })
        }
        None => {
            return Err(ProtocolError::MalformedInput {
                reason: "missing event".to_string(),
            })
        }
    };

    match event {
        JOIN_QUEUE_EVENT => parse_join(&message, text),
        LEAVE_QUEUE_EVENT => {
            let player_id =
                player_id_field(&message)?.ok_or_else(|| ProtocolError::MissingField {
                    event: LEAVE_QUEUE_EVENT.to_string(),
                    fields: vec!["playerId"],
                })?;
            Ok(InboundEvent::LeaveQueue { player_id })
        }
        other => Err(ProtocolError::UnknownEvent {
            event: other.to_string(),
        }),
    }
}

fn parse_join(message: &Map<String, Value>, text: &str) -> Result<InboundEvent, ProtocolError> {
    let player_id = player_id_field(message)?;
    let stake = stake_field(message, text)?;

    match (player_id, stake) {
        (Some(player_id), Some(stake)) => Ok(InboundEvent::JoinQueue { player_id, stake }),
        (player_id, stake) => {
            let mut fields = Vec::new();
            if player_id.is_none() {
                fields.push("playerId");
            }
            if stake.is_none() {
                fields.push("betAmount");
            }
            Err(ProtocolError::MissingField {
                event: JOIN_QUEUE_EVENT.to_string(),
                fields,
            })
        }
    }
}

/// `Ok(None)` when the field is absent, null or empty
fn player_id_field(message: &Map<String, Value>) -> Result<Option<PlayerId>, ProtocolError> {
    match message.get("playerId") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(id)) if id.trim().is_empty() => Ok(None),
        Some(Value::String(id)) => Ok(Some(id.clone())),
        Some(_) => Err(ProtocolError::MalformedInput {
            reason: "playerId must be a string".to_string(),
        }),
    }
}

/// `Ok(None)` when the field is absent or null. Accepts JSON numbers and
/// numeric strings; the value must be strictly positive. Numbers are read
/// from their source digits so no precision is lost.
fn stake_field(message: &Map<String, Value>, text: &str) -> Result<Option<Stake>, ProtocolError> {
    let raw = match message.get("betAmount") {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(amount)) if amount.trim().is_empty() => return Ok(None),
        Some(Value::String(amount)) => amount.trim().to_string(),
        Some(Value::Number(number)) => serde_json::from_str::<RawStake>(text)
            .ok()
            .and_then(|raw| raw.bet_amount)
            .map(|amount| amount.get().trim().to_string())
            .unwrap_or_else(|| number.to_string()),
        Some(_) => {
            return Err(ProtocolError::MalformedInput {
                reason: "betAmount must be a number".to_string(),
            })
        }
    };

    let stake = Decimal::from_str(&raw)
        .or_else(|_| Decimal::from_scientific(&raw))
        .map_err(|_| ProtocolError::MalformedInput {
            reason: format!("betAmount '{}' is not a valid amount", raw),
        })?;

    if stake <= Decimal::ZERO {
        return Err(ProtocolError::MalformedInput {
            reason: "betAmount must be positive".to_string(),
        });
    }

    Ok(Some(stake.normalize()))
}
