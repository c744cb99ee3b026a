// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Persistent storage for eBay OAuth credentials.
//!
//! The only place plaintext tokens are handled: they are sealed with KMS
//! before they reach the database and opened on the way out.

use crate::db::Database;
use crate::error::AppError;
use crate::models::{Credential, StoredCredential};
use crate::services::ebay_oauth::TokenPair;
use crate::services::KmsService;
use crate::time_utils::format_utc_rfc3339;
use chrono::{DateTime, Duration, Utc};

/// Access tokens are never presented within this window of their expiry.
pub const ACCESS_TOKEN_SKEW: Duration = Duration::minutes(5);

/// eBay user refresh tokens live about 18 months; used when a response
/// omits the lifetime.
const DEFAULT_REFRESH_TOKEN_TTL_SECS: i64 = 47_304_000;

/// Fields written by an exchange or a refresh.
///
/// `None` refresh fields keep the stored refresh token.
#[derive(Clone)]
pub struct CredentialFields {
    pub access_token: String,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token: Option<String>,
    pub refresh_token_expires_at: Option<DateTime<Utc>>,
}

impl CredentialFields {
    /// Convert relative lifetimes from the token endpoint to absolute times.
    pub fn from_token_pair(pair: &TokenPair, now: DateTime<Utc>) -> Self {
        let refresh_token_expires_at = pair.refresh_token.as_ref().map(|_| {
            now + Duration::seconds(
                pair.refresh_token_ttl_secs
                    .unwrap_or(DEFAULT_REFRESH_TOKEN_TTL_SECS),
            )
        });

        Self {
            access_token: pair.access_token.clone(),
            access_token_expires_at: now + Duration::seconds(pair.access_token_ttl_secs),
            refresh_token: pair.refresh_token.clone(),
            refresh_token_expires_at,
        }
    }
}

/// False when the access token expires at or before `now + skew`.
pub fn is_access_token_fresh(credential: &Credential, now: DateTime<Utc>, skew: Duration) -> bool {
    credential.access_token_expires_at > now + skew
}

/// Credential storage keyed by user id.
#[derive(Clone)]
pub struct TokenStore {
    db: Database,
    kms: KmsService,
}

impl TokenStore {
    pub fn new(db: Database, kms: KmsService) -> Self {
        Self { db, kms }
    }

    /// Load and decrypt the credential for a user.
    pub async fn get(&self, user_id: &str) -> Result<Option<Credential>, AppError> {
        let Some(stored) = self.db.get_credential(user_id).await? else {
            return Ok(None);
        };

        let access_token = self.kms.open(&stored.access_token_encrypted, user_id).await?;
        let refresh_token = self
            .kms
            .open(&stored.refresh_token_encrypted, user_id)
            .await?;

        Ok(Some(Credential {
            user_id: user_id.to_string(),
            access_token,
            access_token_expires_at: parse_timestamp(&stored.access_token_expires_at)?,
            refresh_token,
            refresh_token_expires_at: parse_timestamp(&stored.refresh_token_expires_at)?,
            updated_at: parse_timestamp(&stored.updated_at)?,
        }))
    }

    /// Save credential fields for a user. Repeating a save is harmless.
    pub async fn upsert(
        &self,
        user_id: &str,
        fields: CredentialFields,
    ) -> Result<Credential, AppError> {
        let (refresh_token, refresh_token_expires_at) =
            match (fields.refresh_token, fields.refresh_token_expires_at) {
                (Some(token), Some(expires_at)) => (token, expires_at),
                (Some(token), None) => {
                    let existing = self.get(user_id).await?;
                    let expires_at = existing
                        .map(|c| c.refresh_token_expires_at)
                        .unwrap_or_else(|| {
                            Utc::now() + Duration::seconds(DEFAULT_REFRESH_TOKEN_TTL_SECS)
                        });
                    (token, expires_at)
                }
                (None, _) => {
                    let existing = self.get(user_id).await?.ok_or_else(|| {
                        AppError::Internal(anyhow::anyhow!(
                            "No stored refresh token for user {}",
                            user_id
                        ))
                    })?;
                    (existing.refresh_token, existing.refresh_token_expires_at)
                }
            };

        let credential = Credential {
            user_id: user_id.to_string(),
            access_token: fields.access_token,
            access_token_expires_at: fields.access_token_expires_at,
            refresh_token,
            refresh_token_expires_at,
            updated_at: Utc::now(),
        };

        let stored = StoredCredential {
            user_id: user_id.to_string(),
            access_token_encrypted: self.kms.seal(&credential.access_token, user_id).await?,
            access_token_expires_at: format_utc_rfc3339(credential.access_token_expires_at),
            refresh_token_encrypted: self.kms.seal(&credential.refresh_token, user_id).await?,
            refresh_token_expires_at: format_utc_rfc3339(credential.refresh_token_expires_at),
            updated_at: format_utc_rfc3339(credential.updated_at),
        };

        self.db.set_credential(&stored).await?;
        tracing::debug!(user_id, "eBay credential saved");

        Ok(credential)
    }

    /// Store the result of an authorization-code exchange.
    pub async fn store_token_pair(
        &self,
        user_id: &str,
        pair: &TokenPair,
        now: DateTime<Utc>,
    ) -> Result<Credential, AppError> {
        self.upsert(user_id, CredentialFields::from_token_pair(pair, now))
            .await
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, AppError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to parse timestamp: {}", e)))
}
