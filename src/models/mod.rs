// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod credential;
pub mod listing;
pub mod profile;

pub use credential::{Credential, StoredCredential};
pub use listing::{Listing, ListingStatus};
pub use profile::{NotificationRecord, Profile};
