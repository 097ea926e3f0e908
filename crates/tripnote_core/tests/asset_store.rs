use std::fs;
use std::path::Path;
use tripnote_core::{FileStore, FileStoreError, LocalAssetStore};

fn write_source(dir: &Path, name: &str, body: &[u8]) -> String {
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    path.to_string_lossy().into_owned()
}

#[test]
fn import_copies_into_lazily_created_root() {
    let picker = tempfile::tempdir().unwrap();
    let data = tempfile::tempdir().unwrap();
    let root = data.path().join("trip_assets");
    let store = LocalAssetStore::new(&root);
    let source = write_source(picker.path(), "IMG_0001.jpg", b"jpeg bytes");

    let locator = store.import(&source).unwrap();

    let saved = Path::new(&locator);
    assert_eq!(saved.parent(), Some(root.as_path()));
    let name = saved.file_name().unwrap().to_str().unwrap();
    assert!(name.starts_with("asset_"));
    assert!(name.ends_with(".jpg"));
    assert_eq!(fs::read(saved).unwrap(), b"jpeg bytes");
    assert!(Path::new(&source).exists());
}

#[test]
fn save_refuses_to_overwrite_existing_asset() {
    let picker = tempfile::tempdir().unwrap();
    let root = tempfile::tempdir().unwrap();
    let store = LocalAssetStore::new(root.path());
    let first = write_source(picker.path(), "a.png", b"first");
    let second = write_source(picker.path(), "b.png", b"second");

    let locator = store.save(&first, "asset_1_1.png").unwrap();
    let err = store.save(&second, "asset_1_1.png").unwrap_err();

    assert!(matches!(err, FileStoreError::AlreadyExists(_)));
    assert_eq!(fs::read(locator).unwrap(), b"first");
}

#[test]
fn save_rejects_names_with_path_components() {
    let root = tempfile::tempdir().unwrap();
    let store = LocalAssetStore::new(root.path());

    let err = store.save("/tmp/whatever.png", "../escape.png").unwrap_err();
    assert!(matches!(err, FileStoreError::InvalidName(_)));
}

#[test]
fn save_of_missing_source_is_io_error() {
    let root = tempfile::tempdir().unwrap();
    let store = LocalAssetStore::new(root.path());
    let missing = root.path().join("nope.jpg");

    let err = store
        .save(missing.to_str().unwrap(), "asset_1_2.jpg")
        .unwrap_err();
    assert!(matches!(err, FileStoreError::Io { .. }));
}

#[test]
fn delete_removes_asset_and_tolerates_missing_file() {
    let picker = tempfile::tempdir().unwrap();
    let root = tempfile::tempdir().unwrap();
    let store = LocalAssetStore::new(root.path());
    let source = write_source(picker.path(), "doc.pdf", b"%PDF");
    let locator = store.import(&source).unwrap();

    store.delete(&locator).unwrap();
    assert!(!Path::new(&locator).exists());

    store.delete(&locator).unwrap();
}

#[test]
fn delete_outside_root_is_refused() {
    let picker = tempfile::tempdir().unwrap();
    let root = tempfile::tempdir().unwrap();
    let store = LocalAssetStore::new(root.path());
    let outside = write_source(picker.path(), "keep.jpg", b"keep");

    let err = store.delete(&outside).unwrap_err();

    assert!(matches!(err, FileStoreError::OutsideRoot(_)));
    assert!(Path::new(&outside).exists());
}

#[test]
fn save_leaves_foreign_file_with_same_name_intact() {
    let picker = tempfile::tempdir().unwrap();
    let root = tempfile::tempdir().unwrap();
    let store = LocalAssetStore::new(root.path());
    let occupied = root.path().join("asset_7_7.jpg");
    fs::write(&occupied, b"already here").unwrap();
    let source = write_source(picker.path(), "new.jpg", b"incoming");

    let err = store.save(&source, "asset_7_7.jpg").unwrap_err();

    assert!(matches!(err, FileStoreError::AlreadyExists(path) if path == occupied));
    assert_eq!(fs::read(&occupied).unwrap(), b"already here");
}

#[test]
fn failed_save_does_not_reserve_the_name() {
    let root = tempfile::tempdir().unwrap();
    let store = LocalAssetStore::new(root.path());
    let missing = root.path().join("gone.jpg");

    assert!(store
        .save(missing.to_str().unwrap(), "asset_9_9.jpg")
        .is_err());
    assert!(!root.path().join("asset_9_9.jpg").exists());
}
