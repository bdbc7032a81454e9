//! Error types for the matchmaking service
//!
//! This module defines all error types using anyhow for consistent error handling
//! throughout the application.

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific matchmaking scenarios
#[derive(Debug, thiserror::Error)]
pub enum MatchmakingError {
    #[error("AMQP connection failed: {message}")]
    AmqpConnectionFailed { message: String },

    #[error("Queue store operation failed: {message}")]
    StorageFailed { message: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}

/// Errors raised while decoding an inbound client message.
///
/// These never reach the engine; the transport reports them back to the
/// connection that sent the message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Invalid message format: {reason}")]
    MalformedInput { reason: String },

    #[error("{} required for {event}", describe_fields(.fields))]
    MissingField {
        event: String,
        fields: Vec<&'static str>,
    },

    #[error("Unknown event: {event}")]
    UnknownEvent { event: String },
}

fn describe_fields(fields: &[&'static str]) -> String {
    match fields {
        [] => "fields are".to_string(),
        [only] => format!("{} is", only),
        [init @ .., last] => format!("{} and {} are", init.join(", "), last),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_field_messages() {
        let single = ProtocolError::MissingField {
            event: "leave_queue".to_string(),
            fields: vec!["playerId"],
        };
        assert_eq!(single.to_string(), "playerId is required for leave_queue");

        let pair = ProtocolError::MissingField {
            event: "join_queue".to_string(),
            fields: vec!["playerId", "betAmount"],
        };
        assert_eq!(
            pair.to_string(),
            "playerId and betAmount are required for join_queue"
        );
    }

    #[test]
    fn test_unknown_event_message() {
        let err = ProtocolError::UnknownEvent {
            event: "spectate".to_string(),
        };
        assert_eq!(err.to_string(), "Unknown event: spectate");
    }
}
