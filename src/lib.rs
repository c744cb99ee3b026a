// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Resell SEO: rewrite eBay listing titles for search
//!
//! This crate provides the backend API for connecting a seller's eBay
//! account, editing and rewriting listing titles, and pushing the results
//! back to eBay.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::Database;
use services::{
    BulkScheduler, EbayOAuthClient, EditorSessions, KmsService, MarketplaceGateway,
    RewriteEngine, TextGenerator, TokenStore, TradingClient, WebhookVerifier,
};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub oauth: EbayOAuthClient,
    pub tokens: TokenStore,
    pub gateway: MarketplaceGateway,
    pub webhook: WebhookVerifier,
    pub rewrite: RewriteEngine,
    pub bulk: BulkScheduler,
    pub sessions: EditorSessions,
}

impl AppState {
    /// Wire every service from configuration and its external collaborators.
    pub fn new(
        config: Config,
        db: Database,
        kms: KmsService,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        let oauth = EbayOAuthClient::new(&config);
        let tokens = TokenStore::new(db.clone(), kms);
        let gateway = MarketplaceGateway::new(
            tokens.clone(),
            oauth.clone(),
            TradingClient::new(&config.ebay_api_base_url),
        );
        let webhook = WebhookVerifier::new(
            config.ebay_verification_token.clone(),
            config.ebay_notification_endpoint.clone(),
            db.clone(),
        );
        let rewrite = RewriteEngine::new(generator);
        let bulk = BulkScheduler::new(rewrite.clone(), db.clone(), config.rewrite_interval);
        let sessions = EditorSessions::new(db.clone(), config.autosave_debounce);

        Self {
            config,
            db,
            oauth,
            tokens,
            gateway,
            webhook,
            rewrite,
            bulk,
            sessions,
        }
    }
}
