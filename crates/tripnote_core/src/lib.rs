//! Core trip data store.
//! This crate is the single source of truth for trip graph invariants.

pub mod config;
pub mod db;
pub mod files;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::CoreConfig;
pub use files::asset_store::{
    file_extension, generate_file_name, FileStore, FileStoreError, FileStoreResult,
    LocalAssetStore,
};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::trip::{
    trip_day_count, ChecklistItem, ContentItem, ContentKind, Day, NewContentItem, Trip, TripId,
    TripValidationError,
};
pub use repo::trip_repo::{RepoError, RepoResult, SqliteTripRepository, TripRepository};
pub use service::trip_store::{
    ReleaseReport, SubscriptionId, TripStore, TripStoreError, TripStoreResult, TripStoreSnapshot,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
