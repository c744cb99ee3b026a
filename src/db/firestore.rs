// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Credentials (encrypted eBay OAuth tokens)
//! - Listings (titles being optimized, upserted by document ID)
//! - Profiles (usage counters)
//! - Notifications (raw marketplace events)

use crate::db::collections;
use crate::db::memory::MemoryStore;
use crate::error::AppError;
use crate::models::{
    Listing, ListingStatus, NotificationRecord, Profile, StoredCredential,
};
use crate::time_utils::format_utc_rfc3339;
use firestore::errors::BackoffError;
use futures_util::{stream, FutureExt, StreamExt};
use std::sync::Arc;

const MAX_CONCURRENT_DB_OPS: usize = 50;
// Firestore limits batch/transaction writes to 500 operations.
// We use a safe limit of 400 to allow headroom.
const BATCH_SIZE: usize = 400;

/// How `increment_usage` guarantees (or fails to guarantee) atomicity.
///
/// Chosen once when the database is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageStrategy {
    /// Increment inside a transaction (Firestore) or under the entry lock
    /// (memory).
    Atomic,
    /// Read the counter, add one, write it back. Loses increments when two
    /// generations for the same user finish at the same time.
    ReadThenWrite,
}

enum UploadMark {
    Missing,
    TitleChanged,
    Marked(Listing),
}

#[derive(Clone)]
enum Backend {
    Firestore(firestore::FirestoreDb),
    Memory(Arc<MemoryStore>),
}

/// Datastore handle shared by all services.
#[derive(Clone)]
pub struct Database {
    backend: Backend,
    usage_strategy: UsageStrategy,
}

impl Database {
    /// Connect to Firestore.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        let client = if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            Self::create_emulator_client(project_id).await?
        } else {
            firestore::FirestoreDb::new(project_id).await.map_err(|e| {
                AppError::Persistence(format!("Failed to connect to Firestore: {}", e))
            })?
        };

        tracing::info!(project = project_id, "Connected to Firestore");

        let usage_strategy = Self::probe_usage_strategy(&client).await;
        tracing::info!(strategy = ?usage_strategy, "Usage counter strategy selected");

        Ok(Self {
            backend: Backend::Firestore(client),
            usage_strategy,
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<firestore::FirestoreDb, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        firestore::FirestoreDb::with_options_token_source(
            firestore::FirestoreDbOptions::new(project_id.to_string()),
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Persistence(format!("Failed to connect to Firestore Emulator: {}", e))
        })
    }

    /// Check once whether transactions are usable for the usage counter.
    async fn probe_usage_strategy(client: &firestore::FirestoreDb) -> UsageStrategy {
        match client.begin_transaction().await {
            Ok(transaction) => {
                let _ = transaction.rollback().await;
                UsageStrategy::Atomic
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Transactions unavailable; usage counter falls back to read-then-write \
                     and can lose increments under concurrent generations"
                );
                UsageStrategy::ReadThenWrite
            }
        }
    }

    /// Open a database backed by process memory.
    pub fn in_memory() -> Self {
        Self::with_memory_store(Arc::new(MemoryStore::new()))
    }

    /// Open a database over an existing memory store (tests inspect it).
    pub fn with_memory_store(store: Arc<MemoryStore>) -> Self {
        Self {
            backend: Backend::Memory(store),
            usage_strategy: UsageStrategy::Atomic,
        }
    }

    /// Override the usage counter strategy.
    pub fn with_usage_strategy(mut self, strategy: UsageStrategy) -> Self {
        self.usage_strategy = strategy;
        self
    }

    pub fn usage_strategy(&self) -> UsageStrategy {
        self.usage_strategy
    }

    // ─── Credential Operations ───────────────────────────────────

    /// Get the encrypted credential for a user.
    pub async fn get_credential(
        &self,
        user_id: &str,
    ) -> Result<Option<StoredCredential>, AppError> {
        match &self.backend {
            Backend::Memory(store) => Ok(store.credentials.get(user_id).map(|c| c.clone())),
            Backend::Firestore(client) => client
                .fluent()
                .select()
                .by_id_in(collections::CREDENTIALS)
                .obj()
                .one(user_id)
                .await
                .map_err(|e| AppError::Persistence(e.to_string())),
        }
    }

    /// Store the encrypted credential for a user (one document per user).
    pub async fn set_credential(&self, credential: &StoredCredential) -> Result<(), AppError> {
        match &self.backend {
            Backend::Memory(store) => {
                store
                    .credentials
                    .insert(credential.user_id.clone(), credential.clone());
            }
            Backend::Firestore(client) => {
                let _: () = client
                    .fluent()
                    .update()
                    .in_col(collections::CREDENTIALS)
                    .document_id(&credential.user_id)
                    .object(credential)
                    .execute()
                    .await
                    .map_err(|e| AppError::Persistence(e.to_string()))?;
            }
        }
        Ok(())
    }

    // ─── Listing Operations ──────────────────────────────────────

    /// Get one listing, only if it belongs to `user_id`.
    pub async fn get_listing(
        &self,
        user_id: &str,
        listing_id: &str,
    ) -> Result<Option<Listing>, AppError> {
        let listing: Option<Listing> = match &self.backend {
            Backend::Memory(store) => store.listings.get(listing_id).map(|l| l.clone()),
            Backend::Firestore(client) => client
                .fluent()
                .select()
                .by_id_in(collections::LISTINGS)
                .obj()
                .one(listing_id)
                .await
                .map_err(|e| AppError::Persistence(e.to_string()))?,
        };

        Ok(listing
            .filter(|l| l.user_id == user_id)
            .map(|mut l| {
                l.id = Some(listing_id.to_string());
                l
            }))
    }

    /// All listings for a user in import order.
    pub async fn list_listings(&self, user_id: &str) -> Result<Vec<Listing>, AppError> {
        match &self.backend {
            Backend::Memory(store) => Ok(store.listings_for_user(user_id)),
            Backend::Firestore(client) => {
                let user_id = user_id.to_string();
                client
                    .fluent()
                    .select()
                    .from(collections::LISTINGS)
                    .filter(move |q| q.for_all([q.field("user_id").eq(user_id.clone())]))
                    .order_by([("sort_index", firestore::FirestoreQueryDirection::Ascending)])
                    .obj()
                    .query()
                    .await
                    .map_err(|e| AppError::Persistence(e.to_string()))
            }
        }
    }

    /// Insert or update a listing keyed by its ID.
    ///
    /// A listing without an ID gets a new one; the stored row is returned.
    pub async fn upsert_listing(&self, listing: &Listing) -> Result<Listing, AppError> {
        let mut row = listing.clone();
        let id = row
            .id
            .get_or_insert_with(|| uuid::Uuid::new_v4().to_string())
            .clone();
        row.updated_at = format_utc_rfc3339(chrono::Utc::now());

        match &self.backend {
            Backend::Memory(store) => {
                store.listings.insert(id, row.clone());
            }
            Backend::Firestore(client) => {
                let _: () = client
                    .fluent()
                    .update()
                    .in_col(collections::LISTINGS)
                    .document_id(&id)
                    .object(&row)
                    .execute()
                    .await
                    .map_err(|e| AppError::Persistence(e.to_string()))?;
            }
        }

        Ok(row)
    }

    /// Upsert many listings; results keep the input order.
    ///
    /// Uses concurrent writes with a limit to avoid overloading Firestore.
    pub async fn upsert_listings(&self, listings: &[Listing]) -> Result<Vec<Listing>, AppError> {
        let futures: Vec<_> = listings
            .iter()
            .map(|listing| self.upsert_listing(listing).boxed())
            .collect();
        stream::iter(futures)
            .buffered(MAX_CONCURRENT_DB_OPS)
            .collect::<Vec<Result<Listing, AppError>>>()
            .await
            .into_iter()
            .collect()
    }

    /// Mark a listing uploaded, but only while its stored optimized title is
    /// still `pushed_title`.
    ///
    /// Returns `None` when the title was changed after the push started;
    /// the row is left as it is.
    pub async fn mark_listing_uploaded(
        &self,
        user_id: &str,
        listing_id: &str,
        pushed_title: &str,
    ) -> Result<Option<Listing>, AppError> {
        let now = format_utc_rfc3339(chrono::Utc::now());

        match &self.backend {
            Backend::Memory(store) => {
                let mut entry = store
                    .listings
                    .get_mut(listing_id)
                    .filter(|l| l.user_id == user_id)
                    .ok_or_else(|| AppError::NotFound(format!("Listing {}", listing_id)))?;
                if entry.optimized_title != pushed_title {
                    return Ok(None);
                }
                entry.status = ListingStatus::Uploaded;
                entry.updated_at = now;
                let mut listing = entry.value().clone();
                listing.id = Some(listing_id.to_string());
                Ok(Some(listing))
            }
            Backend::Firestore(client) => {
                let outcome = client
                    .run_transaction(|db, transaction| {
                        let now = now.clone();
                        let user_id = user_id.to_string();
                        let listing_id = listing_id.to_string();
                        let pushed_title = pushed_title.to_string();
                        async move {
                            let stored: Option<Listing> = db
                                .fluent()
                                .select()
                                .by_id_in(collections::LISTINGS)
                                .obj()
                                .one(&listing_id)
                                .await?;
                            let Some(mut listing) = stored.filter(|l| l.user_id == user_id) else {
                                return Ok(UploadMark::Missing);
                            };
                            if listing.optimized_title != pushed_title {
                                return Ok(UploadMark::TitleChanged);
                            }
                            listing.status = ListingStatus::Uploaded;
                            listing.updated_at = now;
                            db.fluent()
                                .update()
                                .in_col(collections::LISTINGS)
                                .document_id(&listing_id)
                                .object(&listing)
                                .add_to_transaction(transaction)?;
                            Ok::<_, BackoffError<firestore::errors::FirestoreError>>(
                                UploadMark::Marked(listing),
                            )
                        }
                        .boxed()
                    })
                    .await
                    .map_err(|e| AppError::Persistence(format!("Status transaction failed: {}", e)))?;

                match outcome {
                    UploadMark::Missing => {
                        Err(AppError::NotFound(format!("Listing {}", listing_id)))
                    }
                    UploadMark::TitleChanged => Ok(None),
                    UploadMark::Marked(mut listing) => {
                        listing.id = Some(listing_id.to_string());
                        Ok(Some(listing))
                    }
                }
            }
        }
    }

    /// Delete every listing owned by a user. Returns how many were removed.
    pub async fn delete_listings(&self, user_id: &str) -> Result<usize, AppError> {
        match &self.backend {
            Backend::Memory(store) => {
                let before = store.listings.len();
                store.listings.retain(|_, l| l.user_id != user_id);
                Ok(before - store.listings.len())
            }
            Backend::Firestore(client) => {
                let listings = self.list_listings(user_id).await?;
                let ids: Vec<String> = listings.into_iter().filter_map(|l| l.id).collect();

                for chunk in ids.chunks(BATCH_SIZE) {
                    let mut transaction = client.begin_transaction().await.map_err(|e| {
                        AppError::Persistence(format!("Failed to begin transaction: {}", e))
                    })?;

                    for id in chunk {
                        client
                            .fluent()
                            .delete()
                            .from(collections::LISTINGS)
                            .document_id(id)
                            .add_to_transaction(&mut transaction)
                            .map_err(|e| {
                                AppError::Persistence(format!(
                                    "Failed to add deletion to transaction: {}",
                                    e
                                ))
                            })?;
                    }

                    transaction.commit().await.map_err(|e| {
                        AppError::Persistence(format!("Failed to commit batch deletion: {}", e))
                    })?;
                }

                tracing::info!(user_id, count = ids.len(), "Deleted listings");
                Ok(ids.len())
            }
        }
    }

    // ─── Profile / Usage Operations ──────────────────────────────

    pub async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>, AppError> {
        match &self.backend {
            Backend::Memory(store) => Ok(store.profiles.get(user_id).map(|p| p.clone())),
            Backend::Firestore(client) => client
                .fluent()
                .select()
                .by_id_in(collections::PROFILES)
                .obj()
                .one(user_id)
                .await
                .map_err(|e| AppError::Persistence(e.to_string())),
        }
    }

    async fn set_profile(&self, profile: &Profile) -> Result<(), AppError> {
        match &self.backend {
            Backend::Memory(store) => {
                store
                    .profiles
                    .insert(profile.user_id.clone(), profile.clone());
            }
            Backend::Firestore(client) => {
                let _: () = client
                    .fluent()
                    .update()
                    .in_col(collections::PROFILES)
                    .document_id(&profile.user_id)
                    .object(profile)
                    .execute()
                    .await
                    .map_err(|e| AppError::Persistence(e.to_string()))?;
            }
        }
        Ok(())
    }

    /// Count one successful generation for a user. Returns the new count.
    ///
    /// Not idempotent: call exactly once per generation.
    pub async fn increment_usage(&self, user_id: &str) -> Result<u64, AppError> {
        let now = format_utc_rfc3339(chrono::Utc::now());

        match (self.usage_strategy, &self.backend) {
            (UsageStrategy::Atomic, Backend::Memory(store)) => {
                let mut entry = store
                    .profiles
                    .entry(user_id.to_string())
                    .or_insert_with(|| Profile {
                        user_id: user_id.to_string(),
                        ..Profile::default()
                    });
                entry.usage_count += 1;
                entry.updated_at = now;
                Ok(entry.usage_count)
            }
            (UsageStrategy::Atomic, Backend::Firestore(client)) => {
                // The read goes through the transaction, so a concurrent
                // increment makes the commit fail and the closure re-run.
                let profile = client
                    .run_transaction(|db, transaction| {
                        let now = now.clone();
                        let user_id = user_id.to_string();
                        async move {
                            let stored: Option<Profile> = db
                                .fluent()
                                .select()
                                .by_id_in(collections::PROFILES)
                                .obj()
                                .one(&user_id)
                                .await?;
                            let mut profile = stored.unwrap_or_else(|| Profile {
                                user_id: user_id.clone(),
                                ..Profile::default()
                            });
                            profile.usage_count += 1;
                            profile.updated_at = now;

                            db.fluent()
                                .update()
                                .in_col(collections::PROFILES)
                                .document_id(&user_id)
                                .object(&profile)
                                .add_to_transaction(transaction)?;
                            Ok::<_, BackoffError<firestore::errors::FirestoreError>>(profile)
                        }
                        .boxed()
                    })
                    .await
                    .map_err(|e| AppError::Persistence(format!("Usage transaction failed: {}", e)))?;

                Ok(profile.usage_count)
            }
            (UsageStrategy::ReadThenWrite, _) => {
                let mut profile = self.get_profile(user_id).await?.unwrap_or_else(|| Profile {
                    user_id: user_id.to_string(),
                    ..Profile::default()
                });
                profile.usage_count += 1;
                profile.updated_at = now;
                self.set_profile(&profile).await?;
                Ok(profile.usage_count)
            }
        }
    }

    // ─── Notification Operations ─────────────────────────────────

    /// Store a received marketplace notification.
    pub async fn record_notification(&self, record: &NotificationRecord) -> Result<(), AppError> {
        match &self.backend {
            Backend::Memory(store) => {
                store
                    .notifications
                    .insert(record.id.clone(), record.clone());
            }
            Backend::Firestore(client) => {
                let _: () = client
                    .fluent()
                    .update()
                    .in_col(collections::NOTIFICATIONS)
                    .document_id(&record.id)
                    .object(record)
                    .execute()
                    .await
                    .map_err(|e| AppError::Persistence(e.to_string()))?;
            }
        }
        Ok(())
    }
}
