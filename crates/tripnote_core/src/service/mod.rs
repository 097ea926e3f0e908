//! Core use-case services.
//!
//! # Responsibility
//! - Own the in-memory trip cache and every mutation on it.
//! - Keep callers decoupled from storage and file-store details.

pub mod trip_store;
