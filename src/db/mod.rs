//! Database layer (Firestore, with an in-memory backend for tests).

pub mod firestore;
pub mod memory;

pub use firestore::{Database, UsageStrategy};
pub use memory::MemoryStore;

/// Collection names as constants.
pub mod collections {
    /// eBay OAuth credentials (keyed by user id)
    pub const CREDENTIALS: &str = "ebay_credentials";
    pub const LISTINGS: &str = "listings";
    /// Usage counters (keyed by user id)
    pub const PROFILES: &str = "profiles";
    pub const NOTIFICATIONS: &str = "ebay_notifications";
}
