// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod autosave;
pub mod bulk;
pub mod ebay_oauth;
pub mod gemini;
pub mod kms;
pub mod marketplace;
pub mod rewrite;
pub mod sessions;
pub mod token_store;
pub mod webhook;
pub mod xml;

pub use autosave::{AutosavePipeline, EditorRow, ListingSink, RowKey};
pub use bulk::{BulkReport, BulkScheduler, IntervalGate};
pub use ebay_oauth::{EbayOAuthClient, TokenPair};
pub use gemini::{GeminiClient, TextGenerator};
pub use kms::KmsService;
pub use marketplace::{ActiveListing, MarketplaceGateway, TradingClient};
pub use rewrite::RewriteEngine;
pub use sessions::EditorSessions;
pub use token_store::TokenStore;
pub use webhook::WebhookVerifier;
