// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! eBay account connection (OAuth) routes.

use axum::{
    extract::{Query, State},
    response::Redirect,
    routing::get,
    Extension, Router,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::AppState;

// Type alias for HMAC-SHA256
type HmacSha256 = Hmac<Sha256>;

/// A consent round trip older than this is rejected.
const STATE_MAX_AGE_MILLIS: u128 = 15 * 60 * 1000;

/// Callback route (public: eBay redirects the browser here).
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/auth/ebay/callback", get(auth_callback))
}

/// Login route (requires a session).
pub fn protected_routes() -> Router<Arc<AppState>> {
    Router::new().route("/auth/ebay/login", get(auth_start))
}

fn now_millis() -> Result<u128> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("System time error: {}", e)))?
        .as_millis())
}

/// Sign "user_id|timestamp_hex" and base64 the result for the URL.
pub fn sign_state(user_id: &str, timestamp_millis: u128, secret: &[u8]) -> Result<String> {
    let payload = format!("{}|{:x}", user_id, timestamp_millis);

    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC init failed: {}", e)))?;
    mac.update(payload.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());

    Ok(URL_SAFE_NO_PAD.encode(format!("{}|{}", payload, signature)))
}

/// Verify the signature and age of a state value; returns the user id.
fn verify_and_decode_state(state: &str, secret: &[u8], now_millis: u128) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(state).ok()?;
    let state_str = String::from_utf8(bytes).ok()?;

    // Format is "user_id|timestamp_hex|signature_hex"; user ids have no '|'
    let parts: Vec<&str> = state_str.splitn(3, '|').collect();
    if parts.len() != 3 {
        return None;
    }
    let (user_id, timestamp_hex, signature_hex) = (parts[0], parts[1], parts[2]);

    let signature = hex::decode(signature_hex).ok()?;
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(format!("{}|{}", user_id, timestamp_hex).as_bytes());
    if mac.verify_slice(&signature).is_err() {
        tracing::error!("OAuth state signature mismatch! Potential tampering.");
        return None;
    }

    let issued_at = u128::from_str_radix(timestamp_hex, 16).ok()?;
    if now_millis.saturating_sub(issued_at) > STATE_MAX_AGE_MILLIS {
        tracing::warn!("OAuth state expired");
        return None;
    }

    Some(user_id.to_string())
}

/// Start OAuth flow - redirect to eBay's consent page.
async fn auth_start(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Redirect> {
    let oauth_state = sign_state(&user.user_id, now_millis()?, &state.config.oauth_state_key)?;
    let auth_url = state.oauth.build_authorization_url(Some(&oauth_state));

    tracing::info!(
        user_id = %user.user_id,
        client_id = %state.config.ebay_client_id,
        "Starting eBay OAuth flow"
    );

    Ok(Redirect::temporary(&auth_url))
}

#[derive(Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// OAuth callback - exchange the code once and store the credential.
///
/// Always redirects to the frontend dashboard; failures are reported in
/// the `error` query parameter.
async fn auth_callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> Redirect {
    let dashboard = format!("{}/dashboard", state.config.frontend_url);
    let fail = |reason: &str| {
        Redirect::temporary(&format!(
            "{}?error={}",
            dashboard,
            urlencoding::encode(reason)
        ))
    };

    if let Some(error) = params.error {
        tracing::warn!(error = %error, "eBay consent denied");
        return fail("ebay_denied");
    }

    let Ok(now) = now_millis() else {
        return fail("internal_error");
    };
    let Some(user_id) = params
        .state
        .as_deref()
        .and_then(|s| verify_and_decode_state(s, &state.config.oauth_state_key, now))
    else {
        return fail("invalid_state");
    };

    let Some(code) = params.code.filter(|c| !c.is_empty()) else {
        return fail("ebay_denied");
    };

    tracing::info!(user_id = %user_id, "Exchanging eBay authorization code");

    let pair = match state.oauth.exchange_code(&code).await {
        Ok(pair) => pair,
        Err(e) => {
            tracing::error!(user_id = %user_id, error = %e, "eBay token exchange failed");
            return fail("token_exchange_failed");
        }
    };

    if let Err(e) = state
        .tokens
        .store_token_pair(&user_id, &pair, chrono::Utc::now())
        .await
    {
        tracing::error!(user_id = %user_id, error = %e, "Failed to store eBay credential");
        return fail("token_storage_failed");
    }

    tracing::info!(user_id = %user_id, "eBay account connected");
    Redirect::temporary(&format!("{}?connected=ebay", dashboard))
}
