// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Editor flows over HTTP: import, edit with autosave, rewrite, export, clear.

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::time::Duration;
use tower::ServiceExt;

mod common;

use common::{ScriptedGenerator, USER_ID};

async fn call(router: &Router, bearer: &str, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, bearer);
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = router
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    (status, common::body_json(response).await)
}

fn import_body() -> Value {
    json!({
        "rows": [
            {"Item Name": "levis jeans", "SKU": "A1", "Price": "25.00"},
            {"Price": "3.00"},
            {"Title": "pyrex bowl", "SKU": "A2"}
        ]
    })
}

#[tokio::test]
async fn test_import_skips_rows_without_title() {
    let app = common::create_test_app();
    let bearer = app.bearer();

    let (status, body) = call(
        &app.router,
        &bearer,
        Method::POST,
        "/api/listings/import",
        Some(import_body()),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["imported"], 2);
    assert_eq!(body["skipped"], 1);
    let rows = body["rows"].as_array().unwrap();
    assert_eq!(rows[0]["original_title"], "levis jeans");
    assert_eq!(rows[0]["sort_index"], 0);
    assert_eq!(rows[1]["original_title"], "pyrex bowl");
    assert_eq!(rows[1]["sort_index"], 1);
    assert_eq!(app.store.listing_count(), 2);

    // A second import continues the ordering
    let (_, body) = call(
        &app.router,
        &bearer,
        Method::POST,
        "/api/listings/import",
        Some(json!({"rows": [{"Title": "nike shoe"}]})),
    )
    .await;
    assert_eq!(body["rows"][2]["sort_index"], 2);
}

#[tokio::test]
async fn test_import_rejects_empty_batch() {
    let app = common::create_test_app();
    let (status, body) = call(
        &app.router,
        &app.bearer(),
        Method::POST,
        "/api/listings/import",
        Some(json!({"rows": []})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");
}

#[tokio::test(start_paused = true)]
async fn test_edits_are_saved_after_quiet_period() {
    let app = common::create_test_app();
    let bearer = app.bearer();

    let (_, body) = call(
        &app.router,
        &bearer,
        Method::POST,
        "/api/listings/import",
        Some(import_body()),
    )
    .await;
    let key = body["rows"][0]["key"].as_str().unwrap().to_string();
    let id = body["rows"][0]["id"].as_str().unwrap().to_string();
    let uri = format!("/api/listings/{}", key);

    for title in ["Levi", "Levi's 501", "Levi's 501 Jeans"] {
        let (status, row) = call(
            &app.router,
            &bearer,
            Method::PATCH,
            &uri,
            Some(json!({"optimized_title": title})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(row["dirty"], true);
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    // Not yet: the last edit was 500ms ago
    let stored = app.state.db.get_listing(USER_ID, &id).await.unwrap().unwrap();
    assert_eq!(stored.optimized_title, "");

    tokio::time::sleep(Duration::from_millis(1500)).await;

    let stored = app.state.db.get_listing(USER_ID, &id).await.unwrap().unwrap();
    assert_eq!(stored.optimized_title, "Levi's 501 Jeans");
    assert_eq!(app.store.listing_count(), 2);

    let (_, body) = call(&app.router, &bearer, Method::GET, "/api/listings", None).await;
    assert_eq!(body["rows"][0]["dirty"], false);
    assert_eq!(body["rows"][0]["status"], "optimized");
}

#[tokio::test(start_paused = true)]
async fn test_save_flushes_pending_edits() {
    let app = common::create_test_app();
    let bearer = app.bearer();

    let (_, body) = call(
        &app.router,
        &bearer,
        Method::POST,
        "/api/listings/import",
        Some(import_body()),
    )
    .await;
    let key = body["rows"][1]["key"].as_str().unwrap().to_string();
    let id = body["rows"][1]["id"].as_str().unwrap().to_string();

    call(
        &app.router,
        &bearer,
        Method::PATCH,
        &format!("/api/listings/{}", key),
        Some(json!({"optimized_title": "Pyrex Mixing Bowl"})),
    )
    .await;

    let (status, body) = call(&app.router, &bearer, Method::POST, "/api/listings/save", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["rows"]
        .as_array()
        .unwrap()
        .iter()
        .all(|r| r["dirty"] == false));

    let stored = app.state.db.get_listing(USER_ID, &id).await.unwrap().unwrap();
    assert_eq!(stored.optimized_title, "Pyrex Mixing Bowl");
}

#[tokio::test]
async fn test_edit_unknown_row_is_not_found() {
    let app = common::create_test_app();
    let (status, _) = call(
        &app.router,
        &app.bearer(),
        Method::PATCH,
        &format!("/api/listings/{}", uuid::Uuid::new_v4()),
        Some(json!({"optimized_title": "x"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_optimize_cleans_and_counts() {
    let generator = ScriptedGenerator::new("unused").with_replies(vec![Ok(
        "\u{201c}Vintage Levi's 501 Jeans 34x32 Straight Leg Button Fly Medium Wash Denim USA Made Classic\u{201d}\n",
    )]);
    let app = common::create_test_app_with(resell_seo::config::Config::test_default(), generator);
    let bearer = app.bearer();

    let (status, body) = call(
        &app.router,
        &bearer,
        Method::POST,
        "/api/optimize",
        Some(json!({"title": "levis jeans 34 x 32", "item_info": "made in USA"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let title = body["optimized_title"].as_str().unwrap();
    assert!(title.starts_with("Vintage Levi's 501"));
    assert!(!title.contains('\u{201c}') && !title.contains('"'));
    assert!(title.chars().count() <= 80);
    assert_eq!(body["usage_count"], 1);

    let prompt = &app.generator.prompts()[0];
    assert!(prompt.contains("levis jeans 34 x 32"));
    assert!(prompt.contains("made in USA"));

    let (_, me) = call(&app.router, &bearer, Method::GET, "/api/me", None).await;
    assert_eq!(me["usage_count"], 1);
}

#[tokio::test]
async fn test_optimize_blank_title_is_rejected_without_generation() {
    let app = common::create_test_app();

    let (status, body) = call(
        &app.router,
        &app.bearer(),
        Method::POST,
        "/api/optimize",
        Some(json!({"title": "   "})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_input");
    assert_eq!(app.generator.calls(), 0);
}

#[tokio::test]
async fn test_optimize_generation_failure_is_not_counted() {
    let generator =
        ScriptedGenerator::new("unused").with_replies(vec![Err("model overloaded")]);
    let app = common::create_test_app_with(resell_seo::config::Config::test_default(), generator);
    let bearer = app.bearer();

    let (status, body) = call(
        &app.router,
        &bearer,
        Method::POST,
        "/api/optimize",
        Some(json!({"title": "levis jeans"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "generation_failed");

    let (_, me) = call(&app.router, &bearer, Method::GET, "/api/me", None).await;
    assert_eq!(me["usage_count"], 0);
}

#[tokio::test]
async fn test_optimize_with_row_key_saves_row() {
    let app = common::create_test_app();
    let bearer = app.bearer();

    let (_, body) = call(
        &app.router,
        &bearer,
        Method::POST,
        "/api/listings/import",
        Some(import_body()),
    )
    .await;
    let key = body["rows"][0]["key"].clone();
    let id = body["rows"][0]["id"].as_str().unwrap().to_string();

    let (status, body) = call(
        &app.router,
        &bearer,
        Method::POST,
        "/api/optimize",
        Some(json!({"title": "levis jeans", "key": key})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["row"]["id"], id.as_str());
    assert_eq!(body["row"]["status"], "optimized");

    let stored = app.state.db.get_listing(USER_ID, &id).await.unwrap().unwrap();
    assert_eq!(stored.optimized_title, "Optimized Title");
}

#[tokio::test]
async fn test_export_merges_final_titles() {
    let app = common::create_test_app();
    let bearer = app.bearer();

    let (_, body) = call(
        &app.router,
        &bearer,
        Method::POST,
        "/api/listings/import",
        Some(import_body()),
    )
    .await;
    let key = body["rows"][0]["key"].clone();
    call(
        &app.router,
        &bearer,
        Method::POST,
        "/api/optimize",
        Some(json!({"title": "levis jeans", "key": key})),
    )
    .await;

    let (status, body) = call(&app.router, &bearer, Method::GET, "/api/listings/export", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["rows"],
        json!([
            {"Item Name": "Optimized Title", "SKU": "A1", "Price": "25.00"},
            {"Title": "pyrex bowl", "SKU": "A2"}
        ])
    );
}

#[tokio::test]
async fn test_clear_deletes_only_own_listings() {
    let app = common::create_test_app();
    let bearer = app.bearer();
    let other = format!("Bearer {}", app.token_for("user-2"));

    call(&app.router, &bearer, Method::POST, "/api/listings/import", Some(import_body())).await;
    call(&app.router, &other, Method::POST, "/api/listings/import", Some(import_body())).await;
    assert_eq!(app.store.listing_count(), 4);

    let (status, body) = call(&app.router, &bearer, Method::DELETE, "/api/listings", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], 2);
    assert_eq!(app.store.listing_count(), 2);

    let (_, body) = call(&app.router, &bearer, Method::GET, "/api/listings", None).await;
    assert_eq!(body["rows"], json!([]));
    let (_, body) = call(&app.router, &other, Method::GET, "/api/listings", None).await;
    assert_eq!(body["rows"].as_array().unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_clear_cancels_pending_autosave() {
    let app = common::create_test_app();
    let bearer = app.bearer();

    let (_, body) = call(
        &app.router,
        &bearer,
        Method::POST,
        "/api/listings/import",
        Some(import_body()),
    )
    .await;
    let key = body["rows"][0]["key"].as_str().unwrap().to_string();
    let pipeline = app.state.sessions.pipeline(USER_ID).await.unwrap();

    call(
        &app.router,
        &bearer,
        Method::PATCH,
        &format!("/api/listings/{}", key),
        Some(json!({"optimized_title": "Levi's 501 Jeans"})),
    )
    .await;
    tokio::time::sleep(Duration::from_millis(1000)).await;

    let (status, body) = call(&app.router, &bearer, Method::DELETE, "/api/listings", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], 2);

    // Past the debounce window: the edit must not come back
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(app.store.listing_count(), 0);

    // A handler still holding the old session cannot write either
    assert!(pipeline.persist_all().await.is_err());
    assert_eq!(app.store.listing_count(), 0);

    let (_, body) = call(&app.router, &bearer, Method::GET, "/api/listings", None).await;
    assert_eq!(body["rows"], json!([]));
}
