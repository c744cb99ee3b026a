// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Secrets are injected as environment variables by the deployment and are
//! read once at startup.

use std::env;
use std::time::Duration;

/// Scopes requested from eBay when none are configured.
pub const DEFAULT_EBAY_SCOPES: &[&str] = &[
    "https://api.ebay.com/oauth/api_scope",
    "https://api.ebay.com/oauth/api_scope/sell.inventory",
    "https://api.ebay.com/oauth/api_scope/sell.marketing",
    "https://api.ebay.com/oauth/api_scope/sell.inventory.readonly",
];

/// Marker eBay embeds in sandbox application ids.
const SANDBOX_CLIENT_MARKER: &str = "-SBX-";

/// Which datastore backend the server talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatastoreKind {
    Firestore,
    Memory,
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- eBay application (public) ---
    /// eBay OAuth client id (App ID)
    pub ebay_client_id: String,
    /// eBay redirect URL name (RuName), sent as `redirect_uri`
    pub ebay_ru_name: String,
    /// Space-separated OAuth scopes
    pub ebay_scopes: String,
    /// Base URL of the consent page host (`https://auth.ebay.com`)
    pub ebay_auth_base_url: String,
    /// Base URL of the API host (`https://api.ebay.com`)
    pub ebay_api_base_url: String,
    /// Callback URL registered for marketplace notifications, if pinned
    pub ebay_notification_endpoint: Option<String>,

    // --- Generative text provider ---
    pub gemini_model: String,
    pub gemini_base_url: String,

    // --- Deployment ---
    /// Frontend URL for post-OAuth redirects
    pub frontend_url: String,
    /// GCP project ID
    pub gcp_project_id: String,
    /// GCP region (KMS key location)
    pub gcp_region: String,
    /// Datastore backend
    pub datastore: DatastoreKind,
    /// Server port
    pub port: u16,

    // --- Tuning ---
    /// Quiet period before an edited row is persisted
    pub autosave_debounce: Duration,
    /// Minimum spacing between generation calls in a bulk rewrite
    pub rewrite_interval: Duration,

    // --- Secrets ---
    /// eBay OAuth client secret (Cert ID)
    pub ebay_client_secret: String,
    /// Token eBay uses in the notification challenge hash
    pub ebay_verification_token: Option<String>,
    /// Gemini API key
    pub gemini_api_key: Option<String>,
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    /// HMAC key for the OAuth `state` parameter
    pub oauth_state_key: Vec<u8>,
}

impl Config {
    /// Config for tests only.
    pub fn test_default() -> Self {
        Self {
            ebay_client_id: "Test-App-SBX-1234".to_string(),
            ebay_ru_name: "Test-RuName".to_string(),
            ebay_scopes: DEFAULT_EBAY_SCOPES.join(" "),
            ebay_auth_base_url: "https://auth.sandbox.ebay.com".to_string(),
            ebay_api_base_url: "https://api.sandbox.ebay.com".to_string(),
            ebay_notification_endpoint: None,
            gemini_model: "gemini-flash-latest".to_string(),
            gemini_base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            frontend_url: "http://localhost:3000".to_string(),
            gcp_project_id: "test-project".to_string(),
            gcp_region: "us-west1".to_string(),
            datastore: DatastoreKind::Memory,
            port: 8080,
            autosave_debounce: Duration::from_millis(1500),
            rewrite_interval: Duration::from_millis(4000),
            ebay_client_secret: "test_secret".to_string(),
            ebay_verification_token: Some("test_verification_token".to_string()),
            gemini_api_key: None,
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            oauth_state_key: b"test_state_key_32_bytes_minimum!".to_vec(),
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let ebay_client_id = required("EBAY_CLIENT_ID")?;
        let sandbox = is_sandbox_client(&ebay_client_id);
        let (default_auth, default_api) = if sandbox {
            ("https://auth.sandbox.ebay.com", "https://api.sandbox.ebay.com")
        } else {
            ("https://auth.ebay.com", "https://api.ebay.com")
        };

        let datastore = match optional("DATASTORE").as_deref() {
            None | Some("firestore") => DatastoreKind::Firestore,
            Some("memory") => DatastoreKind::Memory,
            Some(other) => return Err(ConfigError::Invalid("DATASTORE", other.to_string())),
        };

        Ok(Self {
            ebay_client_id,
            ebay_ru_name: required("EBAY_RUNAME")?,
            ebay_scopes: optional("EBAY_SCOPES").unwrap_or_else(|| DEFAULT_EBAY_SCOPES.join(" ")),
            ebay_auth_base_url: base_url("EBAY_AUTH_BASE_URL", default_auth),
            ebay_api_base_url: base_url("EBAY_API_BASE_URL", default_api),
            ebay_notification_endpoint: optional("EBAY_NOTIFICATION_ENDPOINT"),
            gemini_model: optional("GEMINI_MODEL")
                .unwrap_or_else(|| "gemini-flash-latest".to_string()),
            gemini_base_url: base_url(
                "GEMINI_BASE_URL",
                "https://generativelanguage.googleapis.com/v1beta",
            ),
            frontend_url: optional("FRONTEND_URL")
                .unwrap_or_else(|| "http://localhost:3000".to_string()),
            gcp_project_id: optional("GCP_PROJECT_ID").unwrap_or_else(|| "local-dev".to_string()),
            gcp_region: optional("GCP_REGION").unwrap_or_else(|| "us-west1".to_string()),
            datastore,
            port: parse_or("PORT", 8080)?,
            autosave_debounce: Duration::from_millis(parse_or("AUTOSAVE_DEBOUNCE_MS", 1500)?),
            rewrite_interval: Duration::from_millis(parse_or("REWRITE_INTERVAL_MS", 4000)?),

            ebay_client_secret: required("EBAY_CLIENT_SECRET")?,
            ebay_verification_token: optional("EBAY_VERIFICATION_TOKEN"),
            gemini_api_key: optional("GEMINI_API_KEY"),
            jwt_signing_key: required("JWT_SIGNING_KEY")?.into_bytes(),
            oauth_state_key: required("OAUTH_STATE_KEY")?.into_bytes(),
        })
    }
}

/// eBay sandbox application ids carry a `-SBX-` segment.
pub fn is_sandbox_client(client_id: &str) -> bool {
    client_id.contains(SANDBOX_CLIENT_MARKER)
}

/// Read a variable, trimming copy-paste whitespace. Blank counts as unset.
fn optional(name: &'static str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    optional(name).ok_or(ConfigError::Missing(name))
}

fn base_url(name: &'static str, default: &str) -> String {
    optional(name)
        .unwrap_or_else(|| default.to_string())
        .trim_end_matches('/')
        .to_string()
}

fn parse_or<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match optional(name) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid(name, raw)),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}
