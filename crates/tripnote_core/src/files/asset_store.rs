//! Local asset file store.
//!
//! # Responsibility
//! - Copy externally obtained assets into app-managed storage.
//! - Release stored assets when their owning content item goes away.
//! - Generate collision-resistant asset file names.
//!
//! # Invariants
//! - Saved assets always live directly under the store root.
//! - `save` never overwrites an existing asset.
//! - `delete` only touches files under the store root and treats a missing
//!   file as already released.

use chrono::Utc;
use log::{info, warn};
use rand::Rng;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// Directory name used for managed assets below the data directory.
pub const TRIP_ASSETS_DIR_NAME: &str = "trip_assets";

const IMPORT_NAME_ATTEMPTS: usize = 3;

pub type FileStoreResult<T> = Result<T, FileStoreError>;

/// Errors from asset file operations.
#[derive(Debug)]
pub enum FileStoreError {
    /// Underlying filesystem failure.
    Io { path: PathBuf, source: io::Error },
    /// Suggested name is empty or contains path components.
    InvalidName(String),
    /// Destination asset already exists.
    AlreadyExists(PathBuf),
    /// Locator points outside the managed asset directory.
    OutsideRoot(String),
}

impl Display for FileStoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "asset I/O failed at `{}`: {source}", path.display()),
            Self::InvalidName(name) => write!(f, "invalid asset file name: `{name}`"),
            Self::AlreadyExists(path) => write!(f, "asset already exists: `{}`", path.display()),
            Self::OutsideRoot(locator) => {
                write!(f, "asset locator is outside managed storage: `{locator}`")
            }
        }
    }
}

impl Error for FileStoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// App-managed storage for binary assets referenced by content items.
pub trait FileStore {
    /// Copies `source` into managed storage as `suggested_name` and returns
    /// the managed locator.
    fn save(&self, source: &str, suggested_name: &str) -> FileStoreResult<String>;
    /// Releases a managed asset. Callers treat failures as non-fatal.
    fn delete(&self, locator: &str) -> FileStoreResult<()>;

    /// Saves `source` under a freshly generated asset name.
    ///
    /// Regenerates the name a few times when it collides with an existing
    /// asset.
    fn import(&self, source: &str) -> FileStoreResult<String> {
        let mut last_err = None;
        for _ in 0..IMPORT_NAME_ATTEMPTS {
            match self.save(source, &generate_file_name(source)) {
                Err(FileStoreError::AlreadyExists(path)) => {
                    last_err = Some(FileStoreError::AlreadyExists(path));
                }
                other => return other,
            }
        }
        Err(last_err.unwrap_or_else(|| FileStoreError::InvalidName(source.to_string())))
    }
}

/// Filesystem-backed asset store rooted at one directory.
#[derive(Debug, Clone)]
pub struct LocalAssetStore {
    root: PathBuf,
}

impl LocalAssetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn ensure_dir_exists(&self) -> FileStoreResult<()> {
        if self.root.is_dir() {
            return Ok(());
        }
        info!("event=asset_dir_create module=files status=start");
        fs::create_dir_all(&self.root).map_err(|source| FileStoreError::Io {
            path: self.root.clone(),
            source,
        })
    }

    fn resolve_managed(&self, locator: &str) -> FileStoreResult<PathBuf> {
        let path = PathBuf::from(locator);
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| FileStoreError::OutsideRoot(locator.to_string()))?;
        if path.parent() != Some(self.root.as_path()) || !is_plain_file_name(file_name) {
            return Err(FileStoreError::OutsideRoot(locator.to_string()));
        }
        Ok(path)
    }
}

impl FileStore for LocalAssetStore {
    fn save(&self, source: &str, suggested_name: &str) -> FileStoreResult<String> {
        if !is_plain_file_name(suggested_name) {
            return Err(FileStoreError::InvalidName(suggested_name.to_string()));
        }
        self.ensure_dir_exists()?;

        let mut input = File::open(source).map_err(|source_err| FileStoreError::Io {
            path: PathBuf::from(source),
            source: source_err,
        })?;
        let dest = self.root.join(suggested_name);
        let mut output = match OpenOptions::new().write(true).create_new(true).open(&dest) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                return Err(FileStoreError::AlreadyExists(dest));
            }
            Err(source) => return Err(FileStoreError::Io { path: dest, source }),
        };

        match io::copy(&mut input, &mut output) {
            Ok(bytes) => {
                info!(
                    "event=asset_save module=files status=ok name={} bytes={}",
                    suggested_name, bytes
                );
                Ok(dest.to_string_lossy().into_owned())
            }
            Err(copy_err) => {
                warn!(
                    "event=asset_save module=files status=error name={} error={}",
                    suggested_name, copy_err
                );
                drop(output);
                // The name was reserved by this call; drop the partial copy.
                let _ = fs::remove_file(&dest);
                Err(FileStoreError::Io {
                    path: dest,
                    source: copy_err,
                })
            }
        }
    }

    fn delete(&self, locator: &str) -> FileStoreResult<()> {
        let path = self.resolve_managed(locator)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                info!("event=asset_delete module=files status=ok");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                info!("event=asset_delete module=files status=ok missing=true");
                Ok(())
            }
            Err(source) => Err(FileStoreError::Io { path, source }),
        }
    }
}

/// Returns the substring after the last `.` of `source`, or an empty string
/// when there is none.
///
/// A dot that only appears in a directory component does not count.
pub fn file_extension(source: &str) -> &str {
    match source.rsplit_once('.') {
        Some((_, ext)) if !ext.contains(['/', '\\']) => ext,
        _ => "",
    }
}

/// Generates `asset_<unix_millis>_<0..=999>.<ext>` for `source`.
///
/// The `.<ext>` suffix is omitted when `source` has no extension.
pub fn generate_file_name(source: &str) -> String {
    let timestamp = Utc::now().timestamp_millis();
    let random: u16 = rand::thread_rng().gen_range(0..1000);
    match file_extension(source) {
        "" => format!("asset_{timestamp}_{random}"),
        ext => format!("asset_{timestamp}_{random}.{ext}"),
    }
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

#[cfg(test)]
mod tests {
    use super::{file_extension, generate_file_name, is_plain_file_name};

    #[test]
    fn extension_is_taken_after_last_dot() {
        assert_eq!(file_extension("/tmp/photo.final.JPG"), "JPG");
        assert_eq!(file_extension("/tmp/noext"), "");
        assert_eq!(file_extension("/tmp/dir.d/noext"), "");
    }

    #[test]
    fn generated_name_keeps_extension_and_prefix() {
        let name = generate_file_name("/picker/cache/IMG_0001.heic");
        assert!(name.starts_with("asset_"));
        assert!(name.ends_with(".heic"));

        let parts: Vec<&str> = name.trim_end_matches(".heic").split('_').collect();
        assert_eq!(parts.len(), 3);
        assert!(parts[1].parse::<i64>().is_ok());
        let random: u32 = parts[2].parse().expect("random suffix is numeric");
        assert!(random < 1000);
    }

    #[test]
    fn generated_name_without_extension_has_no_trailing_dot() {
        let name = generate_file_name("content://picker/42");
        assert!(!name.ends_with('.'));
    }

    #[test]
    fn plain_file_name_rejects_path_components() {
        assert!(is_plain_file_name("asset_1_2.png"));
        assert!(!is_plain_file_name("../escape.png"));
        assert!(!is_plain_file_name(""));
        assert!(!is_plain_file_name(".."));
    }
}
