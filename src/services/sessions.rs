// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-user editor sessions.

use crate::db::Database;
use crate::error::AppError;
use crate::services::autosave::{AutosavePipeline, ListingSink};
use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// How long an untouched session with nothing left to save stays loaded.
pub const SESSION_IDLE_TTL: Duration = Duration::from_secs(30 * 60);

/// Idle sessions are looked for at most this often.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

struct Session {
    pipeline: AutosavePipeline,
    last_used: Instant,
}

/// One `AutosavePipeline` per user, loaded from the datastore on first use
/// and dropped again once it has been idle for `SESSION_IDLE_TTL`.
pub struct EditorSessions {
    db: Database,
    debounce: Duration,
    idle_ttl: Duration,
    sessions: DashMap<String, Session>,
    last_sweep: Mutex<Instant>,
    running_bulk: Arc<DashMap<String, ()>>,
}

/// Marks a bulk rewrite as running for a user until dropped.
pub struct BulkRunGuard {
    user_id: String,
    running: Arc<DashMap<String, ()>>,
}

impl Drop for BulkRunGuard {
    fn drop(&mut self) {
        self.running.remove(&self.user_id);
    }
}

impl EditorSessions {
    pub fn new(db: Database, debounce: Duration) -> Self {
        Self {
            db,
            debounce,
            idle_ttl: SESSION_IDLE_TTL,
            sessions: DashMap::new(),
            last_sweep: Mutex::new(Instant::now()),
            running_bulk: Arc::new(DashMap::new()),
        }
    }

    fn new_pipeline(&self) -> AutosavePipeline {
        let sink: Arc<dyn ListingSink> = Arc::new(self.db.clone());
        AutosavePipeline::new(sink, self.debounce)
    }

    /// The user's pipeline, loading stored listings the first time.
    pub async fn pipeline(&self, user_id: &str) -> Result<AutosavePipeline, AppError> {
        self.evict_idle();

        if let Some(mut session) = self.sessions.get_mut(user_id) {
            session.last_used = Instant::now();
            return Ok(session.pipeline.clone());
        }

        let pipeline = self.new_pipeline();
        let stored = self.db.list_listings(user_id).await?;
        tracing::debug!(user_id, rows = stored.len(), "Loaded editor session");
        pipeline.load(stored);

        // Two first requests may race; the first insert wins.
        let mut session = self
            .sessions
            .entry(user_id.to_string())
            .or_insert(Session {
                pipeline,
                last_used: Instant::now(),
            });
        session.last_used = Instant::now();
        Ok(session.pipeline.clone())
    }

    /// Whether a user's rows are currently held in memory.
    pub fn is_loaded(&self, user_id: &str) -> bool {
        self.sessions.contains_key(user_id)
    }

    /// Drop sessions past the idle TTL that have nothing left to write and
    /// no bulk run. Dropped users are reloaded from the datastore on their
    /// next request.
    fn evict_idle(&self) {
        let now = Instant::now();
        {
            let mut last_sweep = self
                .last_sweep
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if now.duration_since(*last_sweep) < SWEEP_INTERVAL {
                return;
            }
            *last_sweep = now;
        }

        let before = self.sessions.len();
        self.sessions.retain(|user_id, session| {
            now.duration_since(session.last_used) < self.idle_ttl
                || !session.pipeline.is_idle()
                || self.running_bulk.contains_key(user_id)
        });
        let evicted = before.saturating_sub(self.sessions.len());
        if evicted > 0 {
            tracing::debug!(evicted, "Evicted idle editor sessions");
        }
    }

    /// Close and forget a user's session.
    ///
    /// Returns once no pending or in-flight autosave for the user can
    /// still reach the datastore, so callers may delete afterwards.
    pub async fn reset(&self, user_id: &str) {
        if let Some((_, session)) = self.sessions.remove(user_id) {
            session.pipeline.close().await;
        }
    }

    /// Claim the bulk-rewrite slot for a user; `None` if one is running.
    pub fn try_start_bulk(&self, user_id: &str) -> Option<BulkRunGuard> {
        match self.running_bulk.entry(user_id.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => None,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(());
                Some(BulkRunGuard {
                    user_id: user_id.to_string(),
                    running: self.running_bulk.clone(),
                })
            }
        }
    }

    pub fn is_bulk_running(&self, user_id: &str) -> bool {
        self.running_bulk.contains_key(user_id)
    }
}
