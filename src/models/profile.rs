//! Per-user profile and notification records.

use serde::{Deserialize, Serialize};

/// Usage counters stored in Firestore (keyed by user id).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: String,
    /// Number of successful title generations
    #[serde(default)]
    pub usage_count: u64,
    pub updated_at: String,
}

/// A marketplace push notification as received.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: String,
    /// `metadata.topic` from the payload, when present
    pub topic: Option<String>,
    pub received_at: String,
    pub payload: serde_json::Value,
}
