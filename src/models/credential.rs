// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! eBay OAuth credential models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Decrypted eBay credential for one user.
///
/// Only `TokenStore` builds these; everything else receives an access token
/// string from `MarketplaceGateway::ensure_fresh_access_token`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub user_id: String,
    pub access_token: String,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_token_expires_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("user_id", &self.user_id)
            .field("access_token", &"<redacted>")
            .field("access_token_expires_at", &self.access_token_expires_at)
            .field("refresh_token", &"<redacted>")
            .field("refresh_token_expires_at", &self.refresh_token_expires_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Credential as stored in Firestore (tokens encrypted).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCredential {
    /// Owning user (also the document ID)
    pub user_id: String,
    /// Encrypted access token (base64)
    pub access_token_encrypted: String,
    /// When the access token expires (ISO 8601)
    pub access_token_expires_at: String,
    /// Encrypted refresh token (base64)
    pub refresh_token_encrypted: String,
    /// When the refresh token expires (ISO 8601)
    pub refresh_token_expires_at: String,
    /// Last write (ISO 8601)
    pub updated_at: String,
}
