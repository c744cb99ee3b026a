// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Listing model for storage and API.

use serde::{Deserialize, Serialize};

/// Hard limit eBay enforces on listing titles, in characters.
pub const MAX_TITLE_CHARS: usize = 80;

/// Where a listing is in the optimize/push lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingStatus {
    /// No optimized title yet
    #[default]
    Pending,
    /// Has an optimized title that is not on eBay
    Optimized,
    /// Optimized title was pushed to eBay
    Uploaded,
}

impl ListingStatus {
    /// Status a row gets when saved with the given optimized title.
    pub fn for_title(optimized_title: &str) -> Self {
        if optimized_title.is_empty() {
            ListingStatus::Pending
        } else {
            ListingStatus::Optimized
        }
    }
}

/// A listing title being worked on, stored in Firestore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    /// Document ID; assigned by the store on first save
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub user_id: String,
    pub original_title: String,
    /// Empty until optimized
    #[serde(default)]
    pub optimized_title: String,
    #[serde(default)]
    pub status: ListingStatus,
    /// Every field of the imported row, kept for lossless export
    #[serde(default)]
    pub raw_data: serde_json::Map<String, serde_json::Value>,
    /// Position in the import
    pub sort_index: u32,
    /// eBay ItemID when the listing came from (or is linked to) eBay
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ebay_item_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default)]
    pub updated_at: String,
}

impl Listing {
    /// True when the row has no meaningful rewrite yet.
    pub fn needs_rewrite(&self) -> bool {
        self.optimized_title.is_empty() || self.optimized_title == self.original_title
    }

    /// Build a listing from an imported CSV row.
    ///
    /// The title is taken from `Title`, `title` or `Item Name`. Rows without
    /// a title yield `None`.
    pub fn from_csv_row(
        user_id: &str,
        sort_index: u32,
        row: serde_json::Map<String, serde_json::Value>,
    ) -> Option<Self> {
        let original_title = ["Title", "title", "Item Name"]
            .iter()
            .filter_map(|key| row.get(*key).and_then(|v| v.as_str()))
            .map(str::trim)
            .find(|title| !title.is_empty())?
            .to_string();

        Some(Self {
            id: None,
            user_id: user_id.to_string(),
            original_title,
            optimized_title: String::new(),
            status: ListingStatus::Pending,
            raw_data: row,
            sort_index,
            ebay_item_id: None,
            image_url: None,
            updated_at: String::new(),
        })
    }

    /// Title that should be exported (optimized when present).
    pub fn final_title(&self) -> &str {
        if self.optimized_title.is_empty() {
            &self.original_title
        } else {
            &self.optimized_title
        }
    }

    /// Merge the final title back into the imported row.
    ///
    /// The title column is found case-insensitively as `title` or
    /// `item name`, defaulting to `Title`. Rows without source data export
    /// `Title` and `Original Title` only.
    pub fn export_row(&self) -> serde_json::Map<String, serde_json::Value> {
        let title = serde_json::Value::String(self.final_title().to_string());

        if self.raw_data.is_empty() {
            let mut row = serde_json::Map::new();
            row.insert("Title".to_string(), title);
            row.insert(
                "Original Title".to_string(),
                serde_json::Value::String(self.original_title.clone()),
            );
            return row;
        }

        let title_key = self
            .raw_data
            .keys()
            .find(|k| {
                let lower = k.to_lowercase();
                lower == "title" || lower == "item name"
            })
            .cloned()
            .unwrap_or_else(|| "Title".to_string());

        let mut row = self.raw_data.clone();
        row.insert(title_key, title);
        row
    }
}

/// Truncate to at most `max` characters (not bytes).
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
