// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Title rewriting with a fixed prompt contract.

use crate::error::AppError;
use crate::models::listing::{truncate_chars, MAX_TITLE_CHARS};
use crate::services::gemini::TextGenerator;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Double-quote characters stripped from either end of a completion.
const WRAPPING_QUOTES: &[char] = &['"', '\u{201C}', '\u{201D}'];

/// Produces marketplace-ready titles from a text generator.
#[derive(Clone)]
pub struct RewriteEngine {
    generator: Arc<dyn TextGenerator>,
}

impl RewriteEngine {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Rewrite one title.
    ///
    /// The result never exceeds 80 characters; longer completions are cut,
    /// not rejected. Counting usage is the caller's job.
    pub async fn optimize_title(
        &self,
        original_title: &str,
        extra_info: Option<&str>,
    ) -> Result<String, AppError> {
        let original_title = original_title.trim();
        if original_title.is_empty() {
            return Err(AppError::InvalidInput("Title is required".to_string()));
        }

        let prompt = build_prompt(original_title, extra_info, Utc::now());
        let completion = self.generator.generate(&prompt).await?;

        let cleaned = clean_completion(&completion);
        if cleaned.is_empty() {
            return Err(AppError::GenerationFailed(
                "Model returned an empty title".to_string(),
            ));
        }

        let title = truncate_chars(&cleaned, MAX_TITLE_CHARS);
        if title.len() != cleaned.len() {
            tracing::info!(generated = %cleaned, "Generated title truncated to 80 characters");
        }
        Ok(title)
    }
}

/// Trim whitespace and any wrapping double quotes.
fn clean_completion(completion: &str) -> String {
    completion
        .trim()
        .trim_start_matches(WRAPPING_QUOTES)
        .trim_end_matches(WRAPPING_QUOTES)
        .trim()
        .to_string()
}

fn build_prompt(original_title: &str, extra_info: Option<&str>, now: DateTime<Utc>) -> String {
    let extra_info = extra_info
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("None provided");

    format!(
        r#"Current Date: {now}

ROLE:
You are an expert eBay SEO copywriter with deep knowledge of the Cassini search algorithm. Your goal is to maximize search visibility and click-through rate.

TASK:
Rewrite the provided eBay listing title following the formula and rules below.

INPUT:
- Original Title: "{original_title}"
- Additional Info: "{extra_info}"

FORMULA (in this order):
[Main Brand] + [Sub-brand/Line] + [Gender/Age] + [Style/Name] + [Material] + [Product Type] + [Color] + [Size]

CLOTHING RULES:
1. Brand placement: always start with the brand. Use "Vintage" if the input suggests it.
2. Style keywords: include descriptors like "Graphic", "Y2K", "Boho", "Slim Fit", "High Rise", "Distressed".
3. Neckline/sleeve: use "V-Neck", "Crewneck", "Long Sleeve", "Short Sleeve" if space allows.
4. Pattern: include "Floral", "Striped", "Solid", "Plaid".
5. Material: use "Cotton", "Linen", "Denim", "Silk", "Wool".

CRITICAL RULES:
1. Character limit: MAX {max} characters.
2. Keywords: prioritize high-search-volume keywords. Do NOT repeat words.
3. Abbreviations: use standard ones: Sz (Size), NWT, Vtg (Vintage), V-Neck.
4. Banned words: remove filler like "L@@K", "Wow", "Stunning", "Cute", "Free Shipping", "Cheap", "Sale", "Great Condition".
5. Capitalization: Title Case. No all-caps.
6. Synonyms: do NOT stack (use "T-Shirt", not "Tee Shirt Top Tunic").

OUTPUT:
Return ONLY the optimized title string. No explanations, no quotes."#,
        now = now.to_rfc3339(),
        original_title = original_title,
        extra_info = extra_info,
        max = MAX_TITLE_CHARS,
    )
}
