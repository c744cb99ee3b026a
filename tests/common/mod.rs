// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared test fixtures: an offline app, a scripted text generator and a
//! fake eBay upstream served from a local socket.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Form, Router,
};
use chrono::{Duration, Utc};
use resell_seo::config::Config;
use resell_seo::db::{Database, MemoryStore};
use resell_seo::error::AppError;
use resell_seo::middleware::auth::create_jwt;
use resell_seo::models::{Listing, ListingStatus};
use resell_seo::routes::create_router;
use resell_seo::services::token_store::CredentialFields;
use resell_seo::services::{KmsService, TextGenerator};
use resell_seo::AppState;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const USER_ID: &str = "user-1";

// ─── Text generator ──────────────────────────────────────────

/// Generator that plays back queued replies, then repeats a default.
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<Result<String, String>>>,
    default_reply: String,
    calls: AtomicUsize,
    call_times: Mutex<Vec<tokio::time::Instant>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(default_reply: &str) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            default_reply: default_reply.to_string(),
            calls: AtomicUsize::new(0),
            call_times: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Queue replies; `Err` entries make that call fail.
    pub fn with_replies(self, replies: Vec<Result<&str, &str>>) -> Self {
        *self.replies.lock().unwrap() = replies
            .into_iter()
            .map(|r| r.map(str::to_string).map_err(str::to_string))
            .collect();
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn call_times(&self) -> Vec<tokio::time::Instant> {
        self.call_times.lock().unwrap().clone()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.call_times
            .lock()
            .unwrap()
            .push(tokio::time::Instant::now());
        self.prompts.lock().unwrap().push(prompt.to_string());

        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(Ok(text)) => Ok(text),
            Some(Err(reason)) => Err(AppError::GenerationFailed(reason)),
            None => Ok(self.default_reply.clone()),
        }
    }
}

// ─── Offline app ─────────────────────────────────────────────

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub store: Arc<MemoryStore>,
    pub generator: Arc<ScriptedGenerator>,
}

impl TestApp {
    /// Session token for `user_id`.
    pub fn token_for(&self, user_id: &str) -> String {
        create_jwt(user_id, &self.state.config.jwt_signing_key).unwrap()
    }

    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token_for(USER_ID))
    }

    /// Store a credential whose access token expires `expires_in` from now.
    pub async fn connect_ebay(&self, user_id: &str, access_token: &str, expires_in: Duration) {
        let now = Utc::now();
        self.state
            .tokens
            .upsert(
                user_id,
                CredentialFields {
                    access_token: access_token.to_string(),
                    access_token_expires_at: now + expires_in,
                    refresh_token: Some("refresh-1".to_string()),
                    refresh_token_expires_at: Some(now + Duration::days(540)),
                },
            )
            .await
            .unwrap();
    }

    /// Save a listing directly to the datastore.
    pub async fn seed_listing(&self, listing: Listing) -> Listing {
        self.state.db.upsert_listing(&listing).await.unwrap()
    }
}

/// Listing as it would look after an eBay import and a rewrite.
pub fn optimized_ebay_listing(user_id: &str, item_id: &str, optimized_title: &str) -> Listing {
    let mut raw_data = serde_json::Map::new();
    raw_data.insert("Title".to_string(), "levis jeans".into());
    raw_data.insert("ItemID".to_string(), item_id.into());
    Listing {
        id: None,
        user_id: user_id.to_string(),
        original_title: "levis jeans".to_string(),
        optimized_title: optimized_title.to_string(),
        status: ListingStatus::for_title(optimized_title),
        raw_data,
        sort_index: 0,
        ebay_item_id: Some(item_id.to_string()),
        image_url: None,
        updated_at: String::new(),
    }
}

/// App with in-memory storage, mock KMS and a scripted generator.
pub fn create_test_app() -> TestApp {
    create_test_app_with(Config::test_default(), ScriptedGenerator::new("Optimized Title"))
}

pub fn create_test_app_with(config: Config, generator: ScriptedGenerator) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let db = Database::with_memory_store(store.clone());
    let generator = Arc::new(generator);

    let state = Arc::new(AppState::new(
        config,
        db,
        KmsService::new_mock(),
        generator.clone(),
    ));

    TestApp {
        router: create_router(state.clone()),
        state,
        store,
        generator,
    }
}

/// Config whose eBay hosts point at a fake upstream.
pub fn config_for_upstream(base_url: &str) -> Config {
    let mut config = Config::test_default();
    config.ebay_api_base_url = base_url.to_string();
    config.ebay_auth_base_url = base_url.to_string();
    config
}

// ─── Fake eBay ───────────────────────────────────────────────

/// Recorded `ReviseFixedPriceItem` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviseCall {
    pub iaf_token: String,
    pub body: String,
}

/// Scriptable stand-in for the eBay token endpoint and Trading API.
#[derive(Default)]
pub struct FakeEbay {
    pub token_calls: AtomicUsize,
    pub token_forms: Mutex<Vec<HashMap<String, String>>>,
    /// Token endpoint answers 400 invalid_grant
    pub reject_tokens: AtomicBool,
    /// Delay before the token endpoint answers
    pub token_delay_ms: AtomicUsize,
    /// Code exchange answers without a refresh token
    pub omit_refresh_token: AtomicBool,
    pub revise_calls: Mutex<Vec<ReviseCall>>,
    /// Delay before ReviseFixedPriceItem answers
    pub revise_delay_ms: AtomicUsize,
    /// Trading API answers Ack=Failure for revisions
    pub reject_revisions: AtomicBool,
    /// Body returned for GetMyeBaySelling
    pub selling_xml: Mutex<String>,
}

async fn fake_token(
    State(fake): State<Arc<FakeEbay>>,
    Form(form): Form<HashMap<String, String>>,
) -> (StatusCode, String) {
    let n = fake.token_calls.fetch_add(1, Ordering::SeqCst) + 1;
    let grant = form.get("grant_type").cloned().unwrap_or_default();
    fake.token_forms.lock().unwrap().push(form);

    let delay = fake.token_delay_ms.load(Ordering::SeqCst) as u64;
    if delay > 0 {
        tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
    }

    if fake.reject_tokens.load(Ordering::SeqCst) {
        return (
            StatusCode::BAD_REQUEST,
            serde_json::json!({
                "error": "invalid_grant",
                "error_description": "the provided authorization refresh token is invalid"
            })
            .to_string(),
        );
    }

    let body = if grant == "refresh_token" || fake.omit_refresh_token.load(Ordering::SeqCst) {
        serde_json::json!({
            "access_token": format!("access-refreshed-{}", n),
            "expires_in": 7200,
            "token_type": "User Access Token"
        })
    } else {
        serde_json::json!({
            "access_token": format!("access-{}", n),
            "expires_in": 7200,
            "refresh_token": format!("refresh-{}", n),
            "refresh_token_expires_in": 47304000,
            "token_type": "User Access Token"
        })
    };
    (StatusCode::OK, body.to_string())
}

async fn fake_trading(
    State(fake): State<Arc<FakeEbay>>,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, String) {
    let call_name = headers
        .get("X-EBAY-API-CALL-NAME")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let iaf_token = headers
        .get("X-EBAY-API-IAF-TOKEN")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    match call_name.as_str() {
        "ReviseFixedPriceItem" => {
            fake.revise_calls
                .lock()
                .unwrap()
                .push(ReviseCall { iaf_token, body });
            let delay = fake.revise_delay_ms.load(Ordering::SeqCst) as u64;
            if delay > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            }
            if fake.reject_revisions.load(Ordering::SeqCst) {
                (
                    StatusCode::OK,
                    "<ReviseFixedPriceItemResponse><Ack>Failure</Ack><Errors>\
                     <ShortMessage>Invalid item</ShortMessage>\
                     <LongMessage>The item has ended and cannot be revised.</LongMessage>\
                     </Errors></ReviseFixedPriceItemResponse>"
                        .to_string(),
                )
            } else {
                (
                    StatusCode::OK,
                    "<ReviseFixedPriceItemResponse><Ack>Success</Ack></ReviseFixedPriceItemResponse>"
                        .to_string(),
                )
            }
        }
        "GetMyeBaySelling" => (StatusCode::OK, fake.selling_xml.lock().unwrap().clone()),
        _ => (StatusCode::BAD_REQUEST, "<Ack>Failure</Ack>".to_string()),
    }
}

/// Serve a fake eBay on an ephemeral local port. Returns its base URL.
pub async fn spawn_fake_ebay(fake: Arc<FakeEbay>) -> String {
    let app = Router::new()
        .route("/identity/v1/oauth2/token", post(fake_token))
        .route("/ws/api.dll", post(fake_trading))
        .with_state(fake);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", addr)
}

/// App wired to a freshly spawned fake eBay.
pub async fn create_app_with_fake_ebay() -> (TestApp, Arc<FakeEbay>) {
    let fake = Arc::new(FakeEbay::default());
    let base_url = spawn_fake_ebay(fake.clone()).await;
    let app = create_test_app_with(
        config_for_upstream(&base_url),
        ScriptedGenerator::new("Optimized Title"),
    );
    (app, fake)
}

/// Read a response body as JSON.
pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
