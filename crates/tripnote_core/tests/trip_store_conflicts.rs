use chrono::Utc;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tripnote_core::db::{open_db, open_db_in_memory};
use tripnote_core::service::trip_store::MAX_WRITE_ATTEMPTS;
use tripnote_core::{
    ContentItem, ContentKind, FileStore, FileStoreResult, NewContentItem, RepoError, RepoResult,
    SqliteTripRepository, Trip, TripRepository, TripStore, TripStoreError,
};

struct NoFiles;

impl FileStore for NoFiles {
    fn save(&self, _source: &str, suggested_name: &str) -> FileStoreResult<String> {
        Ok(suggested_name.to_string())
    }

    fn delete(&self, _locator: &str) -> FileStoreResult<()> {
        Ok(())
    }
}

/// Repository whose conditional writes always lose the race.
struct AlwaysStale<'conn> {
    inner: SqliteTripRepository<'conn>,
    update_calls: Rc<Cell<u32>>,
}

impl TripRepository for AlwaysStale<'_> {
    fn get_trips(&self) -> RepoResult<Vec<Trip>> {
        self.inner.get_trips()
    }

    fn get_trip(&self, id: &str) -> RepoResult<Option<Trip>> {
        self.inner.get_trip(id)
    }

    fn add_trip(&self, trip: &Trip) -> RepoResult<()> {
        self.inner.add_trip(trip)
    }

    fn update_trip(&self, trip: &Trip) -> RepoResult<Trip> {
        self.update_calls.set(self.update_calls.get() + 1);
        Err(RepoError::Conflict {
            trip_id: trip.id.clone(),
            expected_revision: trip.revision,
        })
    }

    fn delete_trip(&self, trip: &Trip) -> RepoResult<()> {
        self.inner.delete_trip(trip)
    }
}

#[derive(Default)]
struct RecordingFiles {
    deleted: RefCell<Vec<String>>,
}

impl FileStore for RecordingFiles {
    fn save(&self, _source: &str, suggested_name: &str) -> FileStoreResult<String> {
        Ok(format!("/assets/{suggested_name}"))
    }

    fn delete(&self, locator: &str) -> FileStoreResult<()> {
        self.deleted.borrow_mut().push(locator.to_string());
        Ok(())
    }
}

/// Repository where another writer attaches a file just before the first
/// delete lands.
struct UploadBeforeDelete<'conn> {
    inner: SqliteTripRepository<'conn>,
    uploaded: Cell<bool>,
}

impl TripRepository for UploadBeforeDelete<'_> {
    fn get_trips(&self) -> RepoResult<Vec<Trip>> {
        self.inner.get_trips()
    }

    fn get_trip(&self, id: &str) -> RepoResult<Option<Trip>> {
        self.inner.get_trip(id)
    }

    fn add_trip(&self, trip: &Trip) -> RepoResult<()> {
        self.inner.add_trip(trip)
    }

    fn update_trip(&self, trip: &Trip) -> RepoResult<Trip> {
        self.inner.update_trip(trip)
    }

    fn delete_trip(&self, trip: &Trip) -> RepoResult<()> {
        if !self.uploaded.replace(true) {
            let mut current = self.inner.get_trip(&trip.id)?.expect("trip exists");
            let day = &mut current.days[0];
            day.items.push(ContentItem {
                id: "racing-upload".to_string(),
                day_id: day.id.clone(),
                title: "racing".to_string(),
                memo: None,
                kind: ContentKind::Photo,
                uri: "/assets/racing.jpg".to_string(),
                cloud_url: None,
                created_at: Utc::now(),
            });
            self.inner.update_trip(&current)?;
        }
        self.inner.delete_trip(trip)
    }
}

fn photo(uri: &str) -> NewContentItem {
    NewContentItem {
        title: "photo".to_string(),
        memo: None,
        kind: ContentKind::Photo,
        uri: uri.to_string(),
    }
}

#[test]
fn stale_store_reapplies_its_change_on_fresh_record() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tripnote.sqlite3");
    let conn_a = open_db(&path).unwrap();
    let conn_b = open_db(&path).unwrap();

    let mut store_a = TripStore::new(SqliteTripRepository::new(&conn_a), NoFiles);
    let trip = store_a.add_trip("Tokyo", "2024-04-01", "2024-04-03").unwrap();

    let mut store_b = TripStore::new(SqliteTripRepository::new(&conn_b), NoFiles);
    store_b.load_trips().unwrap();

    store_a.add_checklist_item(&trip.id, "passport").unwrap();
    store_b.add_checklist_item(&trip.id, "charger").unwrap();

    let merged = &store_b.trips()[0];
    let texts: Vec<_> = merged.checklist.iter().map(|item| item.text.as_str()).collect();
    assert_eq!(texts, vec!["passport", "charger"]);
    assert_eq!(merged.revision, 2);

    let persisted = SqliteTripRepository::new(&conn_a)
        .get_trip(&trip.id)
        .unwrap()
        .unwrap();
    assert_eq!(persisted.checklist.len(), 2);
}

#[test]
fn stale_day_delete_still_keeps_concurrent_day_title() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tripnote.sqlite3");
    let conn_a = open_db(&path).unwrap();
    let conn_b = open_db(&path).unwrap();

    let mut store_a = TripStore::new(SqliteTripRepository::new(&conn_a), NoFiles);
    let trip = store_a.add_trip("Kyoto", "2024-04-01", "2024-04-03").unwrap();
    let mut store_b = TripStore::new(SqliteTripRepository::new(&conn_b), NoFiles);
    store_b.load_trips().unwrap();

    store_a
        .update_day_title(&trip.id, &trip.days[0].id, "Fushimi Inari")
        .unwrap();
    store_b.delete_day(&trip.id, &trip.days[2].id).unwrap();

    let merged = &store_b.trips()[0];
    assert_eq!(merged.days.len(), 2);
    assert_eq!(merged.days[0].title.as_deref(), Some("Fushimi Inari"));
}

#[test]
fn exhausted_retries_surface_conflict_without_touching_state() {
    let conn = open_db_in_memory().unwrap();
    let update_calls = Rc::new(Cell::new(0));
    let repo = AlwaysStale {
        inner: SqliteTripRepository::new(&conn),
        update_calls: Rc::clone(&update_calls),
    };
    let mut store = TripStore::new(repo, NoFiles);
    let trip = store.add_trip("Tokyo", "2024-04-01", "2024-04-03").unwrap();
    let before = store.trips().to_vec();

    let err = store.add_checklist_item(&trip.id, "passport").unwrap_err();

    assert!(matches!(err, TripStoreError::Conflict(id) if id == trip.id));
    assert_eq!(update_calls.get(), MAX_WRITE_ATTEMPTS);
    assert_eq!(store.trips(), before.as_slice());
}

#[test]
fn stale_trip_delete_releases_items_added_by_other_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tripnote.sqlite3");
    let conn_a = open_db(&path).unwrap();
    let conn_b = open_db(&path).unwrap();

    let mut store_a = TripStore::new(SqliteTripRepository::new(&conn_a), NoFiles);
    let trip = store_a.add_trip("Tokyo", "2024-04-01", "2024-04-03").unwrap();
    let mut store_b = TripStore::new(
        SqliteTripRepository::new(&conn_b),
        RecordingFiles::default(),
    );
    store_b.load_trips().unwrap();

    store_a
        .add_content_item(&trip.id, &trip.days[1].id, photo("/assets/late.jpg"))
        .unwrap();
    let report = store_b.delete_trip(&trip.id).unwrap();

    assert_eq!(report.released, 1);
    assert_eq!(
        *store_b.file_store().deleted.borrow(),
        vec!["/assets/late.jpg".to_string()]
    );
    assert!(store_b.trips().is_empty());
    assert!(SqliteTripRepository::new(&conn_a)
        .get_trip(&trip.id)
        .unwrap()
        .is_none());
}

#[test]
fn trip_delete_that_loses_race_retries_and_releases_new_upload() {
    let conn = open_db_in_memory().unwrap();
    let repo = UploadBeforeDelete {
        inner: SqliteTripRepository::new(&conn),
        uploaded: Cell::new(false),
    };
    let mut store = TripStore::new(repo, RecordingFiles::default());
    let trip = store.add_trip("Tokyo", "2024-04-01", "2024-04-03").unwrap();
    store
        .add_content_item(&trip.id, &trip.days[0].id, photo("/assets/first.jpg"))
        .unwrap();

    let report = store.delete_trip(&trip.id).unwrap();

    assert_eq!(report.released, 2);
    assert_eq!(
        *store.file_store().deleted.borrow(),
        vec!["/assets/first.jpg".to_string(), "/assets/racing.jpg".to_string()]
    );
    assert!(store.repo().get_trip(&trip.id).unwrap().is_none());
}
