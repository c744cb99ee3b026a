// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process document store with the same semantics as the Firestore
//! collections. Used by tests and by `DATASTORE=memory` local runs.

use crate::models::{Listing, NotificationRecord, Profile, StoredCredential};
use dashmap::DashMap;

/// One map per collection, keyed by document ID.
#[derive(Default)]
pub struct MemoryStore {
    pub(crate) credentials: DashMap<String, StoredCredential>,
    pub(crate) listings: DashMap<String, Listing>,
    pub(crate) profiles: DashMap<String, Profile>,
    pub(crate) notifications: DashMap<String, NotificationRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored listings across all users.
    pub fn listing_count(&self) -> usize {
        self.listings.len()
    }

    pub fn notification_count(&self) -> usize {
        self.notifications.len()
    }

    /// All listings for a user ordered by import position.
    pub(crate) fn listings_for_user(&self, user_id: &str) -> Vec<Listing> {
        let mut rows: Vec<Listing> = self
            .listings
            .iter()
            .filter(|entry| entry.user_id == user_id)
            .map(|entry| entry.value().clone())
            .collect();
        rows.sort_by_key(|l| l.sort_index);
        rows
    }
}
