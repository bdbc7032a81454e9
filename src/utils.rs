//! Utility functions for the matchmaking service

use chrono::{DateTime, Utc};
use std::time::Duration;
use uuid::Uuid;

/// Generate a new unique match ID
pub fn generate_match_id() -> Uuid {
    Uuid::new_v4()
}

/// Generate a new unique connection ID
pub fn generate_connection_id() -> Uuid {
    Uuid::new_v4()
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Wall-clock instant `delay` from now, saturating on overflow
pub fn timestamp_after(delay: Duration) -> DateTime<Utc> {
    let now = current_timestamp();
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_unique_ids() {
        let id1 = generate_match_id();
        let id2 = generate_match_id();
        assert_ne!(id1, id2);

        let conn1 = generate_connection_id();
        let conn2 = generate_connection_id();
        assert_ne!(conn1, conn2);
    }

    #[test]
    fn test_timestamp_after() {
        let before = current_timestamp();
        let later = timestamp_after(Duration::from_secs(60));
        assert!(later >= before + chrono::Duration::seconds(60));
    }
}
