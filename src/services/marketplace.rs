// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! eBay Trading API access.
//!
//! Every call goes through `MarketplaceGateway::ensure_fresh_access_token`,
//! which refreshes the stored access token before it gets close to expiry.

use crate::error::AppError;
use crate::models::listing::{truncate_chars, MAX_TITLE_CHARS};
use crate::services::ebay_oauth::EbayOAuthClient;
use crate::services::token_store::{
    is_access_token_fresh, CredentialFields, TokenStore, ACCESS_TOKEN_SKEW,
};
use crate::services::xml;
use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Page size of the active-listing fetch; only the first page is read.
pub const ACTIVE_LISTINGS_PAGE_SIZE: usize = 100;

const TRADING_SITE_ID: &str = "0";
const TRADING_COMPATIBILITY_LEVEL: &str = "1111";
const UNKNOWN_EBAY_ERROR: &str = "Unknown eBay API error";

/// One active listing from `GetMyeBaySelling`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveListing {
    pub title: String,
    #[serde(rename = "ebay_item_id")]
    pub item_id: String,
    pub image_url: Option<String>,
}

/// Shared refresh locks type for use in AppState.
pub type RefreshLocks = Arc<DashMap<String, Arc<Mutex<()>>>>;

/// Raw XML-over-HTTP client for the Trading API.
#[derive(Clone)]
pub struct TradingClient {
    http: reqwest::Client,
    endpoint: String,
}

impl TradingClient {
    pub fn new(api_base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: format!("{}/ws/api.dll", api_base_url),
        }
    }

    /// POST one call. Returns the response body when `Ack` is not a failure.
    async fn call(&self, call_name: &str, access_token: &str, body: String) -> Result<String, AppError> {
        let response = self
            .http
            .post(&self.endpoint)
            .header("X-EBAY-API-SITEID", TRADING_SITE_ID)
            .header("X-EBAY-API-COMPATIBILITY-LEVEL", TRADING_COMPATIBILITY_LEVEL)
            .header("X-EBAY-API-CALL-NAME", call_name)
            .header("X-EBAY-API-IAF-TOKEN", access_token)
            .header("Content-Type", "text/xml")
            .body(body)
            .send()
            .await
            .map_err(|e| AppError::MarketplaceApi(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AppError::MarketplaceApi(e.to_string()))?;

        let ack = xml::element(&text, "Ack");
        let failed = matches!(ack.as_deref(), Some("Failure") | Some("PartialFailure"));

        if !status.is_success() || failed {
            let message = xml::element(&text, "LongMessage")
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| UNKNOWN_EBAY_ERROR.to_string());
            tracing::warn!(
                call_name,
                status = status.as_u16(),
                ack = ?ack,
                message = %message,
                "eBay Trading API call rejected"
            );
            return Err(AppError::MarketplaceRejected(message));
        }

        Ok(text)
    }
}

/// Token-guarded access to the seller's eBay listings.
#[derive(Clone)]
pub struct MarketplaceGateway {
    tokens: TokenStore,
    oauth: EbayOAuthClient,
    trading: TradingClient,
    refresh_locks: RefreshLocks,
}

impl MarketplaceGateway {
    pub fn new(tokens: TokenStore, oauth: EbayOAuthClient, trading: TradingClient) -> Self {
        Self {
            tokens,
            oauth,
            trading,
            refresh_locks: Arc::new(DashMap::new()),
        }
    }

    /// Return an access token that is valid for at least the skew window.
    ///
    /// Refreshes are serialized per user within this process; after the
    /// lock is taken the credential is read again, so a waiter reuses the
    /// token another task just stored. The refreshed credential is
    /// persisted before it is returned.
    pub async fn ensure_fresh_access_token(&self, user_id: &str) -> Result<String, AppError> {
        let credential = self.tokens.get(user_id).await?.ok_or(AppError::NotConnected)?;
        if is_access_token_fresh(&credential, Utc::now(), ACCESS_TOKEN_SKEW) {
            return Ok(credential.access_token);
        }

        let lock = self
            .refresh_locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let credential = self.tokens.get(user_id).await?.ok_or(AppError::NotConnected)?;
        if is_access_token_fresh(&credential, Utc::now(), ACCESS_TOKEN_SKEW) {
            return Ok(credential.access_token);
        }

        tracing::info!(user_id, "eBay access token expiring, refreshing");

        // A rotated or revoked refresh token surfaces as RefreshFailed; the
        // user has to connect again.
        let pair = self.oauth.refresh(&credential.refresh_token).await?;
        let updated = self
            .tokens
            .upsert(user_id, CredentialFields::from_token_pair(&pair, Utc::now()))
            .await?;

        tracing::info!(user_id, "eBay access token refreshed");
        Ok(updated.access_token)
    }

    /// First page of the seller's active listings.
    ///
    /// Items missing a title or item id are skipped.
    pub async fn list_active_listings(&self, access_token: &str) -> Result<Vec<ActiveListing>, AppError> {
        let body = format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<GetMyeBaySellingRequest xmlns="urn:ebay:apis:eBLBaseComponents">
  <ErrorLanguage>en_US</ErrorLanguage>
  <WarningLevel>High</WarningLevel>
  <ActiveList>
    <Include>true</Include>
    <Pagination>
      <EntriesPerPage>{}</EntriesPerPage>
      <PageNumber>1</PageNumber>
    </Pagination>
  </ActiveList>
</GetMyeBaySellingRequest>"#,
            ACTIVE_LISTINGS_PAGE_SIZE
        );

        let response = self
            .trading
            .call("GetMyeBaySelling", access_token, body)
            .await?;

        let listings: Vec<ActiveListing> = xml::elements(&response, "Item")
            .into_iter()
            .filter_map(parse_active_listing)
            .take(ACTIVE_LISTINGS_PAGE_SIZE)
            .collect();

        tracing::debug!(count = listings.len(), "Fetched active eBay listings");
        Ok(listings)
    }

    /// Replace the title of a fixed-price listing.
    ///
    /// The title is cut to eBay's limit before sending.
    pub async fn revise_title(
        &self,
        access_token: &str,
        item_id: &str,
        new_title: &str,
    ) -> Result<(), AppError> {
        let title = truncate_chars(new_title, MAX_TITLE_CHARS);
        let body = format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<ReviseFixedPriceItemRequest xmlns="urn:ebay:apis:eBLBaseComponents">
  <ErrorLanguage>en_US</ErrorLanguage>
  <WarningLevel>High</WarningLevel>
  <Item>
    <ItemID>{}</ItemID>
    <Title>{}</Title>
  </Item>
</ReviseFixedPriceItemRequest>"#,
            xml::escape(item_id),
            xml::escape(&title)
        );

        self.trading
            .call("ReviseFixedPriceItem", access_token, body)
            .await?;

        tracing::info!(item_id, "eBay listing title revised");
        Ok(())
    }
}

fn parse_active_listing(item: &str) -> Option<ActiveListing> {
    let title = xml::element(item, "Title").filter(|t| !t.is_empty())?;
    let item_id = xml::element(item, "ItemID").filter(|id| !id.is_empty())?;
    let image_url = xml::element(item, "GalleryURL").filter(|u| !u.is_empty());
    Some(ActiveListing {
        title,
        item_id,
        image_url,
    })
}
