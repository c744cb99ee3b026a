// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Resell SEO API Server
//!
//! Connects a seller's eBay account, rewrites listing titles with Gemini
//! and pushes the results back to eBay.

use resell_seo::{
    config::{Config, DatastoreKind},
    db::Database,
    error::AppError,
    services::{GeminiClient, KmsService},
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const TOKEN_KEY_NAME: &str = "ebay-token-encryption";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(
        port = config.port,
        datastore = ?config.datastore,
        sandbox = resell_seo::config::is_sandbox_client(&config.ebay_client_id),
        "Starting Resell SEO API"
    );

    if config.ebay_verification_token.is_none() {
        tracing::warn!("EBAY_VERIFICATION_TOKEN not set; notification challenges will fail");
    }
    if config.gemini_api_key.is_none() {
        tracing::warn!("GEMINI_API_KEY not set; title generation will fail");
    }

    let db = match config.datastore {
        DatastoreKind::Firestore => Database::new(&config.gcp_project_id).await?,
        DatastoreKind::Memory => {
            tracing::warn!("Using in-memory datastore; data is lost on restart");
            Database::in_memory()
        }
    };

    let kms = connect_kms(&config).await?;
    tracing::info!("KMS service initialized");

    let generator = Arc::new(GeminiClient::new(
        config.gemini_base_url.clone(),
        config.gemini_model.clone(),
        config.gemini_api_key.clone(),
    ));

    // Build shared state
    let state = Arc::new(AppState::new(config.clone(), db, kms, generator));

    // Build router
    let app = resell_seo::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Cloud KMS, or the offline cipher for local in-memory debug runs.
async fn connect_kms(config: &Config) -> Result<KmsService, AppError> {
    #[cfg(debug_assertions)]
    {
        if config.datastore == DatastoreKind::Memory {
            tracing::warn!("Using mock KMS; tokens are not encrypted");
            return Ok(KmsService::new_mock());
        }
    }

    KmsService::new(&config.gcp_project_id, &config.gcp_region, TOKEN_KEY_NAME).await
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("resell_seo=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
