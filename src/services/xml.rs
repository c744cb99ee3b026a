// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Minimal tag scanning for eBay Trading API responses.
//!
//! Trading API responses are flat and well known; only a handful of leaf
//! elements are read. Elements with attributes are not matched.

/// Inner text of every `<tag>…</tag>` element, in document order.
///
/// Nested elements with the same name are not supported.
pub fn elements<'a>(xml: &'a str, tag: &str) -> Vec<&'a str> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);

    let mut found = Vec::new();
    let mut rest = xml;
    while let Some(start) = rest.find(&open) {
        let after_open = &rest[start + open.len()..];
        let Some(end) = after_open.find(&close) else {
            break;
        };
        found.push(&after_open[..end]);
        rest = &after_open[end + close.len()..];
    }
    found
}

/// Inner text of the first `<tag>…</tag>` element, entities decoded.
pub fn element(xml: &str, tag: &str) -> Option<String> {
    elements(xml, tag).first().map(|raw| unescape(raw))
}

/// Escape text for use as element content.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Decode the five predefined entities. `&amp;` goes last so that
/// `&amp;lt;` decodes to `&lt;`.
pub fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
