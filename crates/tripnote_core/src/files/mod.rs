//! Binary asset storage for content items.
//!
//! # Responsibility
//! - Define the file-store contract the trip store depends on.
//! - Provide the local filesystem implementation and asset naming rules.

pub mod asset_store;
