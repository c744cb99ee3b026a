// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Bulk rewrite scheduling tests (paused clock).

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use resell_seo::db::{Database, MemoryStore};
use resell_seo::models::{Listing, ListingStatus};
use resell_seo::services::{AutosavePipeline, BulkReport, BulkScheduler, RewriteEngine};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

mod common;

use common::{ScriptedGenerator, USER_ID};

const INTERVAL: Duration = Duration::from_secs(4);

fn csv_listing(index: u32, title: &str) -> Listing {
    let row = json!({"Title": title, "SKU": format!("SKU-{}", index)});
    Listing::from_csv_row(USER_ID, index, row.as_object().cloned().unwrap()).unwrap()
}

struct Fixture {
    db: Database,
    pipeline: AutosavePipeline,
    generator: Arc<ScriptedGenerator>,
    scheduler: BulkScheduler,
}

async fn fixture(titles: &[&str], generator: ScriptedGenerator) -> Fixture {
    let db = Database::with_memory_store(Arc::new(MemoryStore::new()));
    let generator = Arc::new(generator);
    let pipeline = AutosavePipeline::new(Arc::new(db.clone()), Duration::from_millis(1500));

    pipeline.load(
        titles
            .iter()
            .enumerate()
            .map(|(i, t)| csv_listing(i as u32, t))
            .collect(),
    );
    pipeline.persist_all().await.unwrap();

    let scheduler = BulkScheduler::new(RewriteEngine::new(generator.clone()), db.clone(), INTERVAL);
    Fixture {
        db,
        pipeline,
        generator,
        scheduler,
    }
}

#[tokio::test(start_paused = true)]
async fn test_failure_in_the_middle_is_skipped() {
    let f = fixture(
        &["levis jeans 34", "nike shoe 10", "pyrex bowl"],
        ScriptedGenerator::new("unused").with_replies(vec![
            Ok("Levi's 501 Jeans 34x32"),
            Err("quota exceeded"),
            Ok("\"Vintage Pyrex Mixing Bowl\""),
        ]),
    )
    .await;

    let report = f.scheduler.rewrite_all(USER_ID, &f.pipeline).await;
    assert_eq!(
        report,
        BulkReport {
            attempted: 3,
            succeeded: 2,
            failed: 1,
            skipped: 0,
        }
    );

    let rows = f.pipeline.rows();
    assert_eq!(rows[0].listing.optimized_title, "Levi's 501 Jeans 34x32");
    assert_eq!(rows[0].listing.status, ListingStatus::Optimized);
    assert_eq!(rows[1].listing.optimized_title, "");
    assert_eq!(rows[1].listing.status, ListingStatus::Pending);
    assert_eq!(rows[2].listing.optimized_title, "Vintage Pyrex Mixing Bowl");

    // Rewrites are saved, not just held in the editor
    let stored = f.db.list_listings(USER_ID).await.unwrap();
    assert_eq!(stored[2].optimized_title, "Vintage Pyrex Mixing Bowl");
    assert!(rows.iter().all(|r| !r.dirty));

    let profile = f.db.get_profile(USER_ID).await.unwrap().unwrap();
    assert_eq!(profile.usage_count, 2);
}

#[tokio::test(start_paused = true)]
async fn test_calls_are_spaced_by_interval() {
    let f = fixture(
        &["a", "b", "c", "d"],
        ScriptedGenerator::new("Rewritten Title"),
    )
    .await;

    let started = tokio::time::Instant::now();
    f.scheduler.rewrite_all(USER_ID, &f.pipeline).await;

    let times = f.generator.call_times();
    assert_eq!(times.len(), 4);
    assert_eq!(times[0], started);
    for pair in times.windows(2) {
        assert!(pair[1] - pair[0] >= INTERVAL);
    }
}

#[tokio::test(start_paused = true)]
async fn test_already_optimized_rows_are_not_queued() {
    let f = fixture(&["a", "b"], ScriptedGenerator::new("Rewritten Title")).await;
    let first = f.pipeline.rows()[0].key;
    f.pipeline.apply_rewrite(first, "Done Already").await.unwrap();

    let report = f.scheduler.rewrite_all(USER_ID, &f.pipeline).await;
    assert_eq!(report.attempted, 1);
    assert_eq!(f.generator.calls(), 1);
    assert_eq!(f.pipeline.row(first).unwrap().listing.optimized_title, "Done Already");
}

#[tokio::test(start_paused = true)]
async fn test_rows_edited_while_waiting_are_skipped() {
    let f = fixture(&["a", "b"], ScriptedGenerator::new("Rewritten Title")).await;
    let second = f.pipeline.rows()[1].key;

    let run = f.scheduler.rewrite_all(USER_ID, &f.pipeline);
    let edit = async {
        // First call goes out at t=0; the second waits on the gate
        tokio::time::sleep(Duration::from_secs(1)).await;
        f.pipeline.schedule_edit(second, "Typed By Hand").unwrap();
    };
    let (report, ()) = tokio::join!(run, edit);

    assert_eq!(report.attempted, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(f.pipeline.row(second).unwrap().listing.optimized_title, "Typed By Hand");
}

#[tokio::test(start_paused = true)]
async fn test_skipped_rows_do_not_use_a_slot() {
    let f = fixture(
        &["a", "b", "c", "d"],
        ScriptedGenerator::new("Rewritten Title"),
    )
    .await;
    let third = f.pipeline.rows()[2].key;

    let started = tokio::time::Instant::now();
    let run = f.scheduler.rewrite_all(USER_ID, &f.pipeline);
    let edit = async {
        // Before "c" reaches the front of the queue
        tokio::time::sleep(Duration::from_secs(1)).await;
        f.pipeline.schedule_edit(third, "Typed By Hand").unwrap();
    };
    let (report, ()) = tokio::join!(run, edit);

    assert_eq!(report.attempted, 3);
    assert_eq!(report.skipped, 1);

    let times = f.generator.call_times();
    assert_eq!(times.len(), 3);
    assert_eq!(times[2] - started, INTERVAL * 2);
}

#[tokio::test(start_paused = true)]
async fn test_bulk_route_runs_in_background() {
    let app = common::create_test_app();
    let bearer = app.bearer();

    let import = app
        .router
        .clone()
        .oneshot(
            Request::post("/api/listings/import")
                .header(header::AUTHORIZATION, &bearer)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({"rows": [{"Title": "a"}, {"Title": "b"}, {"Title": "c"}]}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(import.status(), StatusCode::OK);

    let start = || {
        Request::post("/api/listings/rewrite")
            .header(header::AUTHORIZATION, &bearer)
            .body(Body::empty())
            .unwrap()
    };

    let response = app.router.clone().oneshot(start()).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(common::body_json(response).await["queued"], 3);

    let response = app.router.clone().oneshot(start()).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let clear = app
        .router
        .clone()
        .oneshot(
            Request::delete("/api/listings")
                .header(header::AUTHORIZATION, &bearer)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(clear.status(), StatusCode::CONFLICT);

    tokio::time::sleep(INTERVAL * 3).await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::get("/api/listings")
                .header(header::AUTHORIZATION, &bearer)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = common::body_json(response).await;
    assert_eq!(body["bulk_running"], false);
    let rows = body["rows"].as_array().unwrap();
    assert!(rows.iter().all(|r| r["optimized_title"] == "Optimized Title"));
    assert!(rows.iter().all(|r| r["status"] == "optimized"));
    assert_eq!(app.generator.calls(), 3);
}
