// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A secret or provider credential is missing on the server.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Authentication required")]
    Unauthorized,

    #[error("eBay account not connected")]
    NotConnected,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The request clashes with work already in progress.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("eBay token exchange failed: {0}")]
    ExchangeFailed(String),

    #[error("eBay token refresh failed: {0}")]
    RefreshFailed(String),

    /// Business-level rejection from the Trading API (`Ack` Failure).
    #[error("eBay rejected the request: {0}")]
    MarketplaceRejected(String),

    /// Transport failure talking to eBay (connection, unreadable body).
    #[error("eBay API error: {0}")]
    MarketplaceApi(String),

    #[error("Title generation failed: {0}")]
    GenerationFailed(String),

    #[error("Persistence failed: {0}")]
    Persistence(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// True when the user has to go through the eBay consent flow again.
    pub fn requires_reauthorization(&self) -> bool {
        matches!(
            self,
            AppError::NotConnected | AppError::ExchangeFailed(_) | AppError::RefreshFailed(_)
        )
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::Configuration(msg) => {
                tracing::error!(error = %msg, "Server misconfiguration");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "configuration_error",
                    None,
                )
            }
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            AppError::NotConnected => (StatusCode::CONFLICT, "ebay_not_connected", None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::InvalidInput(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_input", Some(msg.clone()))
            }
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", Some(msg.clone())),
            AppError::ExchangeFailed(msg) | AppError::RefreshFailed(msg) => (
                StatusCode::UNAUTHORIZED,
                "reauthorization_required",
                Some(msg.clone()),
            ),
            AppError::MarketplaceRejected(msg) => {
                (StatusCode::BAD_GATEWAY, "ebay_rejected", Some(msg.clone()))
            }
            AppError::MarketplaceApi(msg) => {
                (StatusCode::BAD_GATEWAY, "ebay_error", Some(msg.clone()))
            }
            AppError::GenerationFailed(msg) => (
                StatusCode::BAD_GATEWAY,
                "generation_failed",
                Some(msg.clone()),
            ),
            AppError::Persistence(msg) => {
                tracing::error!(error = %msg, "Persistence error");
                (StatusCode::INTERNAL_SERVER_ERROR, "persistence_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
