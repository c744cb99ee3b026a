// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Sequential bulk rewrite under the generator's requests-per-minute limit.

use crate::db::Database;
use crate::services::autosave::{AutosavePipeline, RowKey};
use crate::services::rewrite::RewriteEngine;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Releases at most one caller per interval.
///
/// The first `acquire` returns immediately; each later one waits until a
/// full interval has passed since the previous release.
pub struct IntervalGate {
    interval: Duration,
    next_release: Mutex<Option<Instant>>,
}

impl IntervalGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_release: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub async fn acquire(&self) {
        let mut next = self.next_release.lock().await;
        if let Some(at) = *next {
            tokio::time::sleep_until(at).await;
        }
        *next = Some(Instant::now() + self.interval);
    }
}

/// Outcome of one bulk run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct BulkReport {
    /// Generation calls made
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Rows edited or removed while the run was waiting for them
    pub skipped: usize,
}

/// Runs rewrites one at a time through a shared gate.
pub struct BulkScheduler {
    engine: RewriteEngine,
    db: Database,
    gate: IntervalGate,
}

impl BulkScheduler {
    pub fn new(engine: RewriteEngine, db: Database, interval: Duration) -> Self {
        Self {
            engine,
            db,
            gate: IntervalGate::new(interval),
        }
    }

    /// Rewrite every row without a meaningful optimized title.
    ///
    /// Rows are taken in editor order and looked up by key when their turn
    /// comes. One row failing does not stop the run.
    pub async fn rewrite_all(&self, user_id: &str, pipeline: &AutosavePipeline) -> BulkReport {
        let queue: Vec<RowKey> = pipeline
            .rows()
            .into_iter()
            .filter(|row| row.listing.needs_rewrite())
            .map(|row| row.key)
            .collect();

        tracing::info!(user_id, queued = queue.len(), "Starting bulk rewrite");

        let mut report = BulkReport::default();
        for key in queue {
            // Rows edited since the queue was built don't take a slot
            if !pipeline
                .row(key)
                .is_some_and(|row| row.listing.needs_rewrite())
            {
                report.skipped += 1;
                continue;
            }

            self.gate.acquire().await;

            // The row may have been edited or cleared while we waited
            let Some(original_title) = pipeline
                .row(key)
                .filter(|row| row.listing.needs_rewrite())
                .map(|row| row.listing.original_title)
            else {
                report.skipped += 1;
                continue;
            };

            report.attempted += 1;

            let title = match self.engine.optimize_title(&original_title, None).await {
                Ok(title) => title,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(user_id, row = %key, error = %e, "Rewrite failed; skipping row");
                    continue;
                }
            };

            report.succeeded += 1;
            if let Err(e) = self.db.increment_usage(user_id).await {
                tracing::error!(user_id, error = %e, "Failed to count generation");
            }
            if let Err(e) = pipeline.apply_rewrite(key, &title).await {
                tracing::warn!(user_id, row = %key, error = %e, "Rewritten title not saved yet");
            }
        }

        tracing::info!(
            user_id,
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.skipped,
            "Bulk rewrite finished"
        );
        report
    }
}
