//! Trip domain model.
//!
//! # Responsibility
//! - Define the nested Trip -> Day -> ContentItem / Trip -> ChecklistItem graph.
//! - Keep the serialized record shape stable for the persistent store.
//!
//! # Invariants
//! - Every entity is identified by a stable string ID.
//! - A Trip exclusively owns its Days and ChecklistItems; a Day exclusively
//!   owns its ContentItems.

pub mod trip;
