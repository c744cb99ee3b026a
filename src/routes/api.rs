// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for authenticated users.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{Listing, ListingStatus};
use crate::services::{ActiveListing, AutosavePipeline, EditorRow, RowKey};
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use validator::Validate;

/// API routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/me", get(get_me))
        .route("/api/optimize", post(optimize))
        .route("/api/ebay/fetch", post(fetch_ebay_listings))
        .route("/api/ebay/import", post(import_ebay_listings))
        .route("/api/ebay/push", post(push_title))
        .route("/api/listings", get(get_listings).delete(clear_listings))
        .route("/api/listings/import", post(import_rows))
        .route("/api/listings/save", post(save_all))
        .route("/api/listings/rewrite", post(start_bulk_rewrite))
        .route("/api/listings/export", get(export_rows))
        .route("/api/listings/{key}", patch(edit_row))
}

fn validate<T: Validate>(body: &T) -> Result<()> {
    body.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))
}

// ─── User Profile ────────────────────────────────────────────

#[derive(Serialize)]
pub struct MeResponse {
    pub user_id: String,
    pub usage_count: u64,
    pub ebay_connected: bool,
}

/// Current user's usage and connection state.
async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<MeResponse>> {
    let usage_count = state
        .db
        .get_profile(&user.user_id)
        .await?
        .map(|p| p.usage_count)
        .unwrap_or(0);
    let ebay_connected = state.db.get_credential(&user.user_id).await?.is_some();

    Ok(Json(MeResponse {
        user_id: user.user_id,
        usage_count,
        ebay_connected,
    }))
}

// ─── Single Rewrite ──────────────────────────────────────────

#[derive(Deserialize, Validate)]
pub struct OptimizeRequest {
    #[validate(length(max = 500))]
    pub title: String,
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub item_info: Option<String>,
    /// Editor row to store the result on
    #[serde(default)]
    pub key: Option<RowKey>,
}

#[derive(Serialize)]
pub struct OptimizeResponse {
    pub optimized_title: String,
    pub usage_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row: Option<Listing>,
}

/// Rewrite one title and count the generation.
async fn optimize(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<OptimizeRequest>,
) -> Result<Json<OptimizeResponse>> {
    validate(&body)?;

    let optimized_title = state
        .rewrite
        .optimize_title(&body.title, body.item_info.as_deref())
        .await?;

    let usage_count = state.db.increment_usage(&user.user_id).await?;

    let row = match body.key {
        Some(key) => {
            let pipeline = state.sessions.pipeline(&user.user_id).await?;
            Some(pipeline.apply_rewrite(key, &optimized_title).await?)
        }
        None => None,
    };

    tracing::info!(user_id = %user.user_id, usage_count, "Title optimized");

    Ok(Json(OptimizeResponse {
        optimized_title,
        usage_count,
        row,
    }))
}

// ─── eBay ────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct FetchResponse {
    pub listings: Vec<ActiveListing>,
}

/// List the seller's active eBay listings.
async fn fetch_ebay_listings(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<FetchResponse>> {
    let token = state.gateway.ensure_fresh_access_token(&user.user_id).await?;
    let listings = state.gateway.list_active_listings(&token).await?;
    Ok(Json(FetchResponse { listings }))
}

#[derive(Serialize)]
pub struct ImportResponse {
    pub imported: usize,
    pub skipped: usize,
    pub rows: Vec<EditorRow>,
}

fn next_sort_index(pipeline: &AutosavePipeline) -> u32 {
    pipeline
        .rows()
        .iter()
        .map(|r| r.listing.sort_index + 1)
        .max()
        .unwrap_or(0)
}

/// Pull active eBay listings into the editor. Items already in the editor
/// are skipped.
async fn import_ebay_listings(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ImportResponse>> {
    let token = state.gateway.ensure_fresh_access_token(&user.user_id).await?;
    let active = state.gateway.list_active_listings(&token).await?;

    let pipeline = state.sessions.pipeline(&user.user_id).await?;
    let known: HashSet<String> = pipeline
        .rows()
        .into_iter()
        .filter_map(|r| r.listing.ebay_item_id)
        .collect();

    let first_index = next_sort_index(&pipeline);
    let total = active.len();
    let new_rows: Vec<Listing> = active
        .into_iter()
        .filter(|item| !known.contains(&item.item_id))
        .enumerate()
        .map(|(i, item)| listing_from_ebay(&user.user_id, first_index + i as u32, item))
        .collect();

    let imported = new_rows.len();
    pipeline.load(new_rows);
    let rows = pipeline.persist_all().await?;

    tracing::info!(user_id = %user.user_id, imported, "Imported eBay listings");

    Ok(Json(ImportResponse {
        imported,
        skipped: total - imported,
        rows,
    }))
}

fn listing_from_ebay(user_id: &str, sort_index: u32, item: ActiveListing) -> Listing {
    let mut raw_data = serde_json::Map::new();
    raw_data.insert("Title".to_string(), item.title.clone().into());
    raw_data.insert("ItemID".to_string(), item.item_id.clone().into());
    if let Some(url) = &item.image_url {
        raw_data.insert("GalleryURL".to_string(), url.clone().into());
    }

    Listing {
        id: None,
        user_id: user_id.to_string(),
        original_title: item.title,
        optimized_title: String::new(),
        status: ListingStatus::Pending,
        raw_data,
        sort_index,
        ebay_item_id: Some(item.item_id),
        image_url: item.image_url,
        updated_at: String::new(),
    }
}

#[derive(Deserialize, Validate)]
pub struct PushRequest {
    #[validate(length(min = 1))]
    pub listing_id: String,
}

#[derive(Serialize)]
pub struct PushResponse {
    pub success: bool,
    pub message: String,
    pub listing: Listing,
}

/// Send a listing's optimized title to eBay.
///
/// A pending editor edit for the row is written first so the pushed title
/// matches what the user sees. On failure the status is left unchanged.
async fn push_title(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<PushRequest>,
) -> Result<Json<PushResponse>> {
    validate(&body)?;

    let pipeline = state.sessions.pipeline(&user.user_id).await?;
    if let Some(key) = pipeline.key_for_listing(&body.listing_id) {
        pipeline.persist_row(key).await?;
    }

    let listing = state
        .db
        .get_listing(&user.user_id, &body.listing_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Listing not found".to_string()))?;

    let item_id = listing.ebay_item_id.as_deref().ok_or_else(|| {
        AppError::BadRequest("This listing is not linked to an eBay item".to_string())
    })?;
    if listing.optimized_title.is_empty() {
        return Err(AppError::BadRequest(
            "No optimized title exists for this listing".to_string(),
        ));
    }

    let pushed_title = listing.optimized_title.clone();
    let token = state.gateway.ensure_fresh_access_token(&user.user_id).await?;
    state
        .gateway
        .revise_title(&token, item_id, &pushed_title)
        .await?;

    tracing::info!(user_id = %user.user_id, listing_id = %body.listing_id, "Title pushed to eBay");

    // Uploaded only if the stored title is still the one sent
    let marked = state
        .db
        .mark_listing_uploaded(&user.user_id, &body.listing_id, &pushed_title)
        .await?;
    let (listing, message) = match marked {
        Some(listing) => {
            pipeline.mark_uploaded(&body.listing_id, &pushed_title);
            (listing, "Title updated on eBay")
        }
        None => {
            tracing::info!(
                user_id = %user.user_id,
                listing_id = %body.listing_id,
                "Listing edited during push; not marking uploaded"
            );
            let listing = state
                .db
                .get_listing(&user.user_id, &body.listing_id)
                .await?
                .ok_or_else(|| AppError::NotFound("Listing not found".to_string()))?;
            (listing, "Title updated on eBay; the listing has changed since and was not marked uploaded")
        }
    };

    Ok(Json(PushResponse {
        success: true,
        message: message.to_string(),
        listing,
    }))
}

// ─── Editor ──────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ListingsResponse {
    pub rows: Vec<EditorRow>,
    pub bulk_running: bool,
}

/// Editor rows in import order.
async fn get_listings(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ListingsResponse>> {
    let pipeline = state.sessions.pipeline(&user.user_id).await?;
    Ok(Json(ListingsResponse {
        rows: pipeline.rows(),
        bulk_running: state.sessions.is_bulk_running(&user.user_id),
    }))
}

#[derive(Deserialize, Validate)]
pub struct ImportRowsRequest {
    /// At most 5000 rows per import
    #[validate(length(min = 1, max = 5000))]
    pub rows: Vec<serde_json::Map<String, serde_json::Value>>,
}

/// Add CSV-derived rows to the editor and save them. Rows without a title
/// are skipped.
async fn import_rows(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<ImportRowsRequest>,
) -> Result<Json<ImportResponse>> {
    validate(&body)?;

    let pipeline = state.sessions.pipeline(&user.user_id).await?;
    let first_index = next_sort_index(&pipeline);
    let total = body.rows.len();

    let listings: Vec<Listing> = body
        .rows
        .into_iter()
        .filter_map(|row| Listing::from_csv_row(&user.user_id, 0, row))
        .enumerate()
        .map(|(i, mut listing)| {
            listing.sort_index = first_index + i as u32;
            listing
        })
        .collect();

    let imported = listings.len();
    pipeline.load(listings);
    let rows = pipeline.persist_all().await?;

    tracing::info!(user_id = %user.user_id, imported, skipped = total - imported, "Imported rows");

    Ok(Json(ImportResponse {
        imported,
        skipped: total - imported,
        rows,
    }))
}

#[derive(Deserialize, Validate)]
pub struct EditRequest {
    #[validate(length(max = 500))]
    pub optimized_title: String,
}

/// Record an edit; it is saved after the debounce window.
async fn edit_row(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(key): Path<RowKey>,
    Json(body): Json<EditRequest>,
) -> Result<Json<EditorRow>> {
    validate(&body)?;

    let pipeline = state.sessions.pipeline(&user.user_id).await?;
    Ok(Json(pipeline.schedule_edit(key, &body.optimized_title)?))
}

/// Save every unsaved row now.
async fn save_all(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ListingsResponse>> {
    let pipeline = state.sessions.pipeline(&user.user_id).await?;
    let rows = pipeline.persist_all().await?;
    Ok(Json(ListingsResponse {
        rows,
        bulk_running: state.sessions.is_bulk_running(&user.user_id),
    }))
}

#[derive(Serialize)]
pub struct BulkStartResponse {
    pub queued: usize,
}

/// Start rewriting every unoptimized row in the background.
async fn start_bulk_rewrite(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<(StatusCode, Json<BulkStartResponse>)> {
    let guard = state
        .sessions
        .try_start_bulk(&user.user_id)
        .ok_or_else(|| AppError::Conflict("A bulk rewrite is already running".to_string()))?;

    let pipeline = state.sessions.pipeline(&user.user_id).await?;
    let queued = pipeline
        .rows()
        .iter()
        .filter(|r| r.listing.needs_rewrite())
        .count();

    let task_state = state.clone();
    let user_id = user.user_id.clone();
    tokio::spawn(async move {
        let _guard = guard;
        task_state.bulk.rewrite_all(&user_id, &pipeline).await;
    });

    Ok((StatusCode::ACCEPTED, Json(BulkStartResponse { queued })))
}

#[derive(Serialize)]
pub struct ExportResponse {
    pub rows: Vec<serde_json::Map<String, serde_json::Value>>,
}

/// Rows with their final titles merged back into the imported data.
async fn export_rows(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ExportResponse>> {
    let pipeline = state.sessions.pipeline(&user.user_id).await?;
    Ok(Json(ExportResponse {
        rows: pipeline.rows().iter().map(|r| r.listing.export_row()).collect(),
    }))
}

#[derive(Serialize)]
pub struct ClearResponse {
    pub deleted: usize,
}

/// Delete every listing the user has.
async fn clear_listings(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ClearResponse>> {
    if state.sessions.is_bulk_running(&user.user_id) {
        return Err(AppError::Conflict(
            "Wait for the bulk rewrite to finish".to_string(),
        ));
    }

    // No autosave may run after the delete
    state.sessions.reset(&user.user_id).await;
    let deleted = state.db.delete_listings(&user.user_id).await?;

    tracing::info!(user_id = %user.user_id, deleted, "Cleared listings");
    Ok(Json(ClearResponse { deleted }))
}
