// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Debounced per-row persistence for the listing editor.
//!
//! Rows are addressed by a `RowKey` assigned when they enter the pipeline,
//! never by position. Each row carries:
//! - an edit sequence number, bumped on every in-memory change
//! - the sequence number last written to the datastore
//! - the abort handle of its pending debounce timer
//! - an async mutex so at most one upsert per row is in flight
//!
//! A row gets its datastore id when it enters the pipeline, so a retried
//! first write updates the same document instead of creating another one.
//! A persist snapshots the row only after taking the row mutex, so a
//! waiter always writes the newest content.

use crate::db::Database;
use crate::error::AppError;
use crate::models::{Listing, ListingStatus};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::AbortHandle;

/// Where editor rows are written.
#[async_trait]
pub trait ListingSink: Send + Sync {
    /// Insert or update one row keyed by its id; returns the stored row.
    async fn upsert(&self, listing: &Listing) -> Result<Listing, AppError>;

    /// Batch form of `upsert`; output order matches input order.
    async fn upsert_many(&self, listings: &[Listing]) -> Result<Vec<Listing>, AppError>;
}

#[async_trait]
impl ListingSink for Database {
    async fn upsert(&self, listing: &Listing) -> Result<Listing, AppError> {
        self.upsert_listing(listing).await
    }

    async fn upsert_many(&self, listings: &[Listing]) -> Result<Vec<Listing>, AppError> {
        self.upsert_listings(listings).await
    }
}

/// Stable in-memory identity of an editor row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowKey(uuid::Uuid);

impl RowKey {
    fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl std::fmt::Display for RowKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A row as shown to the editor.
#[derive(Debug, Clone, Serialize)]
pub struct EditorRow {
    pub key: RowKey,
    #[serde(flatten)]
    pub listing: Listing,
    /// True when memory holds content the datastore does not
    pub dirty: bool,
}

struct RowSlot {
    row: Listing,
    edit_seq: u64,
    saved_seq: u64,
    timer: Option<AbortHandle>,
    persist_lock: Arc<tokio::sync::Mutex<()>>,
}

impl RowSlot {
    /// A row read back from the datastore starts clean; a new one starts
    /// dirty with a fresh id.
    fn new(mut row: Listing) -> Self {
        let stored = row.id.is_some();
        if !stored {
            row.id = Some(uuid::Uuid::new_v4().to_string());
        }
        Self {
            row,
            edit_seq: u64::from(!stored),
            saved_seq: 0,
            timer: None,
            persist_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    fn is_clean(&self) -> bool {
        self.edit_seq == self.saved_seq
    }

    fn set_title(&mut self, title: &str) {
        self.row.optimized_title = title.to_string();
        self.row.status = ListingStatus::for_title(title);
        self.edit_seq += 1;
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    /// Fold a datastore result back in. Content is clean only if nothing
    /// changed while the write was in flight.
    fn reconcile(&mut self, saved: &Listing, written_seq: u64) {
        self.row.updated_at = saved.updated_at.clone();
        self.saved_seq = self.saved_seq.max(written_seq);
    }

    fn view(&self, key: RowKey) -> EditorRow {
        EditorRow {
            key,
            listing: self.row.clone(),
            dirty: !self.is_clean(),
        }
    }
}

#[derive(Default)]
struct Rows {
    order: Vec<RowKey>,
    slots: HashMap<RowKey, RowSlot>,
    /// Set by `close`; no write starts afterwards
    closed: bool,
}

fn closed_error() -> AppError {
    AppError::Conflict("Editor session was cleared".to_string())
}

struct Inner {
    sink: Arc<dyn ListingSink>,
    debounce: Duration,
    rows: Mutex<Rows>,
}

/// Editor state for one user plus its persistence protocol.
#[derive(Clone)]
pub struct AutosavePipeline {
    inner: Arc<Inner>,
}

impl AutosavePipeline {
    pub fn new(sink: Arc<dyn ListingSink>, debounce: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                sink,
                debounce,
                rows: Mutex::new(Rows::default()),
            }),
        }
    }

    fn rows_lock(&self) -> MutexGuard<'_, Rows> {
        // A poisoned lock only means another thread panicked mid-update of
        // plain data; the rows are still usable.
        self.inner
            .rows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append rows and return their keys in input order.
    pub fn load(&self, listings: Vec<Listing>) -> Vec<RowKey> {
        let mut rows = self.rows_lock();
        listings
            .into_iter()
            .map(|listing| {
                let key = RowKey::new();
                rows.order.push(key);
                rows.slots.insert(key, RowSlot::new(listing));
                key
            })
            .collect()
    }

    /// Shut the pipeline down: cancel pending timers, wait for writes
    /// already in flight, then drop every row.
    ///
    /// Once this returns nothing more reaches the datastore through this
    /// pipeline; later edits and persists fail with `Conflict`.
    pub async fn close(&self) {
        let locks: Vec<Arc<tokio::sync::Mutex<()>>> = {
            let mut rows = self.rows_lock();
            rows.closed = true;
            for slot in rows.slots.values_mut() {
                slot.cancel_timer();
            }
            rows.slots.values().map(|s| s.persist_lock.clone()).collect()
        };
        for lock in locks {
            drop(lock.lock().await);
        }

        let mut rows = self.rows_lock();
        rows.order.clear();
        rows.slots.clear();
    }

    /// True when no row holds unsaved content and no write is pending.
    pub fn is_idle(&self) -> bool {
        let rows = self.rows_lock();
        rows.slots.values().all(|slot| {
            slot.is_clean()
                && slot.timer.as_ref().map_or(true, |t| t.is_finished())
                && slot.persist_lock.try_lock().is_ok()
        })
    }

    pub fn len(&self) -> usize {
        self.rows_lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All rows in load order.
    pub fn rows(&self) -> Vec<EditorRow> {
        let rows = self.rows_lock();
        rows.order
            .iter()
            .filter_map(|key| rows.slots.get(key).map(|slot| slot.view(*key)))
            .collect()
    }

    pub fn row(&self, key: RowKey) -> Option<EditorRow> {
        self.rows_lock().slots.get(&key).map(|slot| slot.view(key))
    }

    /// Key of the row persisted under `listing_id`.
    pub fn key_for_listing(&self, listing_id: &str) -> Option<RowKey> {
        let rows = self.rows_lock();
        rows.order.iter().copied().find(|key| {
            rows.slots
                .get(key)
                .is_some_and(|slot| slot.row.id.as_deref() == Some(listing_id))
        })
    }

    /// Record an edit now and persist it once the row has been quiet for
    /// the debounce window. A newer edit discards the older timer.
    pub fn schedule_edit(&self, key: RowKey, optimized_title: &str) -> Result<EditorRow, AppError> {
        let mut rows = self.rows_lock();
        if rows.closed {
            return Err(closed_error());
        }
        let slot = rows
            .slots
            .get_mut(&key)
            .ok_or_else(|| AppError::NotFound(format!("Row {}", key)))?;

        slot.set_title(optimized_title);
        slot.cancel_timer();

        let pipeline = self.clone();
        let debounce = self.inner.debounce;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            // Detach the write so a later edit cannot abort it mid-flight.
            tokio::spawn(async move {
                if let Err(e) = pipeline.persist_row(key).await {
                    tracing::warn!(row = %key, error = %e, "Autosave failed; edit kept in memory");
                }
            });
        });
        slot.timer = Some(timer.abort_handle());

        Ok(slot.view(key))
    }

    /// Write one row now, waiting for any write already in flight.
    ///
    /// A row that is already stored with its latest content is not
    /// written again.
    pub async fn persist_row(&self, key: RowKey) -> Result<Listing, AppError> {
        let lock = {
            let rows = self.rows_lock();
            let slot = rows
                .slots
                .get(&key)
                .ok_or_else(|| AppError::NotFound(format!("Row {}", key)))?;
            slot.persist_lock.clone()
        };
        let _guard = lock.lock().await;

        let (snapshot, seq) = {
            let rows = self.rows_lock();
            if rows.closed {
                return Err(closed_error());
            }
            let Some(slot) = rows.slots.get(&key) else {
                return Err(AppError::NotFound(format!("Row {}", key)));
            };
            if slot.is_clean() {
                return Ok(slot.row.clone());
            }
            (slot.row.clone(), slot.edit_seq)
        };

        let saved = self.inner.sink.upsert(&snapshot).await?;

        let mut rows = self.rows_lock();
        if let Some(slot) = rows.slots.get_mut(&key) {
            slot.reconcile(&saved, seq);
        }
        tracing::debug!(row = %key, id = ?saved.id, "Row persisted");
        Ok(saved)
    }

    /// Write every row that is dirty or has never been stored, in one batch.
    ///
    /// Holds every row mutex for the duration, taken in load order.
    pub async fn persist_all(&self) -> Result<Vec<EditorRow>, AppError> {
        let locks: Vec<Arc<tokio::sync::Mutex<()>>> = {
            let rows = self.rows_lock();
            rows.order
                .iter()
                .filter_map(|key| rows.slots.get(key).map(|s| s.persist_lock.clone()))
                .collect()
        };
        let mut guards = Vec::with_capacity(locks.len());
        for lock in locks {
            guards.push(lock.lock_owned().await);
        }

        let pending: Vec<(RowKey, Listing, u64)> = {
            let rows = self.rows_lock();
            if rows.closed {
                return Err(closed_error());
            }
            rows.order
                .iter()
                .filter_map(|key| {
                    let slot = rows.slots.get(key)?;
                    (!slot.is_clean()).then(|| (*key, slot.row.clone(), slot.edit_seq))
                })
                .collect()
        };

        if !pending.is_empty() {
            let batch: Vec<Listing> = pending.iter().map(|(_, row, _)| row.clone()).collect();
            let saved = self.inner.sink.upsert_many(&batch).await?;

            let mut rows = self.rows_lock();
            for ((key, _, seq), stored) in pending.iter().zip(saved.iter()) {
                if let Some(slot) = rows.slots.get_mut(key) {
                    slot.reconcile(stored, *seq);
                }
            }
            tracing::info!(count = pending.len(), "Persisted editor rows");
        }

        drop(guards);
        Ok(self.rows())
    }

    /// Store a generated title and write it immediately.
    pub async fn apply_rewrite(&self, key: RowKey, optimized_title: &str) -> Result<Listing, AppError> {
        {
            let mut rows = self.rows_lock();
            if rows.closed {
                return Err(closed_error());
            }
            let slot = rows
                .slots
                .get_mut(&key)
                .ok_or_else(|| AppError::NotFound(format!("Row {}", key)))?;
            slot.cancel_timer();
            slot.set_title(optimized_title);
        }
        self.persist_row(key).await
    }

    /// Reflect a successful push of `pushed_title`.
    ///
    /// Returns false, changing nothing, if no row has that id or the row's
    /// title was edited after the push started. The caller writes the
    /// status to the datastore.
    pub fn mark_uploaded(&self, listing_id: &str, pushed_title: &str) -> bool {
        let mut rows = self.rows_lock();
        let Some(slot) = rows
            .slots
            .values_mut()
            .find(|slot| slot.row.id.as_deref() == Some(listing_id))
        else {
            return false;
        };
        if slot.row.optimized_title != pushed_title {
            return false;
        }
        slot.row.status = ListingStatus::Uploaded;
        true
    }
}
