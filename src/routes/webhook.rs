// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Webhook routes for eBay marketplace notifications.

use crate::error::Result;
use crate::services::webhook::{ChallengeResponse, NOTIFICATION_PATH};
use crate::AppState;
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Webhook routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route(NOTIFICATION_PATH, get(verify).post(handle_event))
}

#[derive(Deserialize)]
struct ChallengeParams {
    #[serde(default)]
    challenge_code: Option<String>,
}

#[derive(Serialize)]
struct Acknowledged {
    status: &'static str,
}

fn acknowledged() -> Response {
    Json(Acknowledged { status: "ok" }).into_response()
}

/// Challenge carried in a POST body under either accepted spelling.
fn challenge_in_body(payload: &serde_json::Value) -> Option<&str> {
    payload
        .get("challengeCode")
        .or_else(|| payload.get("challenge_code"))
        .and_then(|v| v.as_str())
        .filter(|c| !c.is_empty())
}

/// Answer a challenge (GET). Without a challenge this is a plain ping.
async fn verify(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<ChallengeParams>,
) -> Result<Response> {
    let Some(challenge_code) = params.challenge_code.filter(|c| !c.is_empty()) else {
        return Ok(acknowledged());
    };

    let endpoint = state.webhook.resolve_endpoint(&headers)?;
    let response: ChallengeResponse = state.webhook.handle_challenge(&challenge_code, &endpoint)?;
    Ok(Json(response).into_response())
}

/// Handle a challenge or a notification (POST).
///
/// Notifications are always acknowledged with 200, whatever their topic
/// or shape, so eBay does not keep retrying them.
async fn handle_event(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let payload: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(error = %e, bytes = body.len(), "Unparseable eBay notification body");
            serde_json::Value::String(String::from_utf8_lossy(&body).into_owned())
        }
    };

    if let Some(challenge_code) = challenge_in_body(&payload) {
        let endpoint = state.webhook.resolve_endpoint(&headers)?;
        let response = state.webhook.handle_challenge(challenge_code, &endpoint)?;
        return Ok(Json(response).into_response());
    }

    state.webhook.handle_notification(payload).await;
    Ok(acknowledged())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_challenge_key_spellings() {
        assert_eq!(
            challenge_in_body(&json!({"challengeCode": "abc"})),
            Some("abc")
        );
        assert_eq!(
            challenge_in_body(&json!({"challenge_code": "abc"})),
            Some("abc")
        );
        assert_eq!(challenge_in_body(&json!({"challengeCode": ""})), None);
        assert_eq!(challenge_in_body(&json!({"metadata": {}})), None);
        assert_eq!(challenge_in_body(&json!("not an object")), None);
    }
}
