// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! eBay OAuth2 client (authorization-code grant).
//!
//! Handles:
//! - Consent URL construction
//! - Authorization code exchange
//! - Access token refresh

use crate::config::Config;
use crate::error::AppError;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Deserialize;
use std::sync::Arc;

/// How long a redeemed authorization code is remembered. eBay codes expire
/// after five minutes.
const CODE_LEDGER_TTL: Duration = Duration::minutes(10);

/// Tokens returned by the eBay token endpoint.
///
/// Lifetimes are relative, in seconds. Refresh responses carry no refresh
/// token.
#[derive(Clone, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    #[serde(rename = "expires_in")]
    pub access_token_ttl_secs: i64,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default, rename = "refresh_token_expires_in")]
    pub refresh_token_ttl_secs: Option<i64>,
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token_ttl_secs", &self.access_token_ttl_secs)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .finish()
    }
}

/// Error body of the token endpoint.
#[derive(Deserialize)]
struct TokenErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// eBay OAuth client.
#[derive(Clone)]
pub struct EbayOAuthClient {
    http: reqwest::Client,
    auth_base_url: String,
    api_base_url: String,
    client_id: String,
    client_secret: String,
    ru_name: String,
    scopes: String,
    /// Authorization codes already sent to the token endpoint
    redeemed_codes: Arc<DashMap<String, DateTime<Utc>>>,
}

impl EbayOAuthClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            auth_base_url: config.ebay_auth_base_url.clone(),
            api_base_url: config.ebay_api_base_url.clone(),
            client_id: config.ebay_client_id.clone(),
            client_secret: config.ebay_client_secret.clone(),
            ru_name: config.ebay_ru_name.clone(),
            scopes: config.ebay_scopes.clone(),
            redeemed_codes: Arc::new(DashMap::new()),
        }
    }

    /// URL of eBay's consent page.
    ///
    /// eBay expects the RuName, not a URL, as `redirect_uri`. Only the
    /// public client id is exposed.
    pub fn build_authorization_url(&self, state: Option<&str>) -> String {
        let mut url = format!(
            "{}/oauth2/authorize?\
             client_id={}&\
             response_type=code&\
             redirect_uri={}&\
             scope={}",
            self.auth_base_url,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.ru_name),
            urlencoding::encode(&self.scopes),
        );

        if let Some(state) = state {
            url.push_str("&state=");
            url.push_str(&urlencoding::encode(state));
        }

        url
    }

    /// Exchange an authorization code for a token pair.
    ///
    /// Codes are single-use: a code seen before is rejected without calling
    /// eBay, whether or not the earlier exchange succeeded.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenPair, AppError> {
        self.redeem(code)?;

        let pair = self
            .request_token(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.ru_name.as_str()),
            ])
            .await
            .map_err(|reason| {
                tracing::error!(reason = %reason, "eBay token exchange failed");
                AppError::ExchangeFailed(reason)
            })?;

        // A code grant must carry a refresh token
        if pair.refresh_token.is_none() {
            tracing::error!("eBay token exchange returned no refresh_token");
            return Err(AppError::ExchangeFailed(
                "Malformed token response".to_string(),
            ));
        }
        Ok(pair)
    }

    /// Mint a new access token from a refresh token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AppError> {
        self.request_token(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("scope", self.scopes.as_str()),
        ])
        .await
        .map_err(|reason| {
            tracing::warn!(reason = %reason, "eBay token refresh failed");
            AppError::RefreshFailed(reason)
        })
    }

    /// Record a code as used; fails if it was already used.
    fn redeem(&self, code: &str) -> Result<(), AppError> {
        let now = Utc::now();
        self.redeemed_codes
            .retain(|_, used_at| now - *used_at < CODE_LEDGER_TTL);

        match self.redeemed_codes.entry(code.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                tracing::warn!("Authorization code replayed");
                Err(AppError::ExchangeFailed(
                    "Authorization code already used".to_string(),
                ))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(now);
                Ok(())
            }
        }
    }

    /// POST to the token endpoint with client-secret basic auth.
    /// Errors are human-readable reasons.
    async fn request_token(&self, form: &[(&str, &str)]) -> Result<TokenPair, String> {
        let response = self
            .http
            .post(format!("{}/identity/v1/oauth2/token", self.api_base_url))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(form)
            .send()
            .await
            .map_err(|e| format!("Token request failed: {}", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| format!("Failed to read token response: {}", e))?;

        if !status.is_success() {
            return Err(describe_token_error(status.as_u16(), &body));
        }

        serde_json::from_str(&body).map_err(|e| format!("Malformed token response: {}", e))
    }
}

/// Prefer eBay's `error_description`, then `error`, then the raw body.
fn describe_token_error(status: u16, body: &str) -> String {
    let parsed: Option<TokenErrorBody> = serde_json::from_str(body).ok();
    let detail = parsed
        .and_then(|b| b.error_description.or(b.error))
        .unwrap_or_else(|| body.to_string());
    format!("HTTP {}: {}", status, detail)
}
