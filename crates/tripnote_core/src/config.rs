//! Runtime configuration for the trip core.
//!
//! # Responsibility
//! - Derive database, asset and log locations from one data directory.
//! - Read overrides from the process environment.
//!
//! # Invariants
//! - All derived paths live under `data_dir`.
//! - `data_dir` is absolute whenever the current directory can be resolved.

use crate::files::asset_store::TRIP_ASSETS_DIR_NAME;
use crate::logging::default_log_level;
use std::io;
use std::path::{Path, PathBuf};

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "TRIPNOTE_DATA_DIR";
/// Environment variable overriding the log level.
pub const LOG_LEVEL_ENV: &str = "TRIPNOTE_LOG_LEVEL";

const DEFAULT_DATA_DIR_NAME: &str = "tripnote";
const DB_FILE_NAME: &str = "tripnote.sqlite3";
const LOG_DIR_NAME: &str = "logs";

/// Resolved locations and levels used by the composition root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub assets_dir: PathBuf,
    pub log_dir: PathBuf,
    pub log_level: String,
}

impl CoreConfig {
    /// Lays out the default file names under `data_dir`.
    pub fn from_data_dir(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = absolutize(data_dir.as_ref());
        Self {
            db_path: data_dir.join(DB_FILE_NAME),
            assets_dir: data_dir.join(TRIP_ASSETS_DIR_NAME),
            log_dir: data_dir.join(LOG_DIR_NAME),
            log_level: default_log_level().to_string(),
            data_dir,
        }
    }

    /// Reads `TRIPNOTE_DATA_DIR` / `TRIPNOTE_LOG_LEVEL`, falling back to a
    /// directory under the system temp dir and the build-mode log level.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env`, with an injectable variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = non_blank(lookup(DATA_DIR_ENV))
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join(DEFAULT_DATA_DIR_NAME));
        let config = Self::from_data_dir(data_dir);
        match non_blank(lookup(LOG_LEVEL_ENV)) {
            Some(level) => config.with_log_level(level),
            None => config,
        }
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Creates the data directory. Asset and log directories are created
    /// lazily by their owners.
    pub fn ensure_data_dir(&self) -> io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|trimmed| !trimmed.is_empty())
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::{CoreConfig, DATA_DIR_ENV, LOG_LEVEL_ENV};
    use std::path::PathBuf;

    #[test]
    fn derives_paths_under_data_dir() {
        let config = CoreConfig::from_data_dir("/var/lib/tripnote");
        assert_eq!(config.db_path, PathBuf::from("/var/lib/tripnote/tripnote.sqlite3"));
        assert_eq!(config.assets_dir, PathBuf::from("/var/lib/tripnote/trip_assets"));
        assert_eq!(config.log_dir, PathBuf::from("/var/lib/tripnote/logs"));
    }

    #[test]
    fn lookup_overrides_data_dir_and_level() {
        let config = CoreConfig::from_lookup(|key| match key {
            DATA_DIR_ENV => Some("/srv/trips".to_string()),
            LOG_LEVEL_ENV => Some(" warn ".to_string()),
            _ => None,
        });
        assert_eq!(config.data_dir, PathBuf::from("/srv/trips"));
        assert_eq!(config.log_level, "warn");
    }

    #[test]
    fn blank_overrides_fall_back_to_defaults() {
        let config = CoreConfig::from_lookup(|_| Some("   ".to_string()));
        assert!(config.data_dir.ends_with("tripnote"));
        assert!(config.data_dir.is_absolute());
    }
}
