// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! eBay marketplace notification endpoint verification.
//!
//! eBay proves we own the endpoint by sending a challenge code and expecting
//! `hex(sha256(challenge_code || verification_token || endpoint_url))` back.
//! The endpoint string must match the one registered in the eBay developer
//! portal byte for byte.

use crate::db::Database;
use crate::error::AppError;
use crate::models::NotificationRecord;
use crate::time_utils::format_utc_rfc3339;
use axum::http::HeaderMap;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Path the notification handler is mounted at.
pub const NOTIFICATION_PATH: &str = "/api/ebay/notification";

/// Body returned for a challenge.
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeResponse {
    pub challenge_response: String,
}

/// Digest over the three inputs in fixed order.
pub fn compute_challenge_response(
    challenge_code: &str,
    verification_token: &str,
    endpoint_url: &str,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(challenge_code.as_bytes());
    hasher.update(verification_token.as_bytes());
    hasher.update(endpoint_url.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Clone)]
pub struct WebhookVerifier {
    verification_token: Option<String>,
    configured_endpoint: Option<String>,
    db: Database,
}

impl WebhookVerifier {
    pub fn new(
        verification_token: Option<String>,
        configured_endpoint: Option<String>,
        db: Database,
    ) -> Self {
        Self {
            verification_token,
            configured_endpoint: configured_endpoint
                .map(|e| e.trim_end_matches('/').to_string()),
            db,
        }
    }

    /// Endpoint URL the digest is computed over.
    ///
    /// A configured endpoint wins. Otherwise the URL is rebuilt from
    /// `x-forwarded-proto` (default `https`) and `host`, which breaks if a
    /// proxy rewrites the host header.
    pub fn resolve_endpoint(&self, headers: &HeaderMap) -> Result<String, AppError> {
        if let Some(endpoint) = &self.configured_endpoint {
            return Ok(endpoint.clone());
        }

        let host = headers
            .get("host")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::BadRequest("Missing Host header".to_string()))?;
        let proto = headers
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("https");

        Ok(format!("{}://{}{}", proto, host, NOTIFICATION_PATH))
    }

    /// Answer a verification challenge.
    pub fn handle_challenge(
        &self,
        challenge_code: &str,
        endpoint_url: &str,
    ) -> Result<ChallengeResponse, AppError> {
        let token = self.verification_token.as_deref().ok_or_else(|| {
            tracing::error!("EBAY_VERIFICATION_TOKEN is not set; cannot answer challenge");
            AppError::Configuration("Missing eBay verification token".to_string())
        })?;

        tracing::info!(endpoint = %endpoint_url, "Answering eBay notification challenge");

        Ok(ChallengeResponse {
            challenge_response: compute_challenge_response(challenge_code, token, endpoint_url),
        })
    }

    /// Accept a notification. Recording is best effort; the notification is
    /// acknowledged even if the write fails or the topic is unknown.
    pub async fn handle_notification(&self, payload: serde_json::Value) {
        let topic = payload
            .pointer("/metadata/topic")
            .and_then(|t| t.as_str())
            .map(str::to_string);

        tracing::info!(topic = ?topic, "Received eBay notification");

        let record = NotificationRecord {
            id: uuid::Uuid::new_v4().to_string(),
            topic,
            received_at: format_utc_rfc3339(chrono::Utc::now()),
            payload,
        };

        if let Err(e) = self.db.record_notification(&record).await {
            tracing::error!(error = %e, id = %record.id, "Failed to record eBay notification");
        }
    }
}
