//! Trip store: the in-memory source of truth over persisted trips.
//!
//! # Responsibility
//! - Mirror persisted trips in a copy-on-write snapshot for readers.
//! - Own every graph mutation: locate, clone, mutate, persist, publish.
//! - Coordinate asset release with the file store on cascade deletes.
//!
//! # Invariants
//! - In-memory state only advances after the persistent write succeeds.
//! - A failed operation leaves `trips` untouched.
//! - Every mutation operates on a cloned Trip and publishes a new snapshot;
//!   the published `Arc` a reader holds is never modified.
//! - Writes are revision-checked; a stale write is re-applied to the fresh
//!   record up to `MAX_WRITE_ATTEMPTS` times.
//! - Day numbers are never reassigned after creation.

use crate::files::asset_store::{FileStore, FileStoreError};
use crate::model::trip::{
    ChecklistItem, ContentItem, ContentItemId, ContentKind, Day, NewContentItem, Trip, TripId,
    TripValidationError,
};
use crate::repo::trip_repo::{RepoError, TripRepository};
use chrono::{DateTime, Days, NaiveDate, Utc};
use log::{error, info, warn};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Bounded attempts for one revision-checked write.
pub const MAX_WRITE_ATTEMPTS: u32 = 3;

pub type TripStoreResult<T> = Result<T, TripStoreError>;

/// Handle returned by `TripStore::subscribe`.
pub type SubscriptionId = u64;

type Listener = Box<dyn Fn(&TripStoreSnapshot)>;

/// Errors from trip store operations.
#[derive(Debug)]
pub enum TripStoreError {
    TripNotFound(TripId),
    DayNotFound {
        trip_id: TripId,
        day_id: String,
    },
    ContentItemNotFound {
        day_id: String,
        item_id: String,
    },
    ChecklistItemNotFound {
        trip_id: TripId,
        item_id: String,
    },
    /// Date input is not `YYYY-MM-DD` or RFC 3339.
    InvalidDate(String),
    InvalidTrip(TripValidationError),
    /// `add_day` needs at least one existing day to extend from.
    NoDays(TripId),
    /// Deleting the only remaining day is not allowed.
    LastDayRemaining(TripId),
    /// Concurrent writers kept moving the record past our revision.
    Conflict(TripId),
    Storage(RepoError),
    /// The asset could not be copied into the file store.
    Asset(FileStoreError),
}

impl Display for TripStoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TripNotFound(id) => write!(f, "trip not found: {id}"),
            Self::DayNotFound { trip_id, day_id } => {
                write!(f, "day {day_id} not found in trip {trip_id}")
            }
            Self::ContentItemNotFound { day_id, item_id } => {
                write!(f, "content item {item_id} not found in day {day_id}")
            }
            Self::ChecklistItemNotFound { trip_id, item_id } => {
                write!(f, "checklist item {item_id} not found in trip {trip_id}")
            }
            Self::InvalidDate(value) => write!(f, "invalid date: `{value}`"),
            Self::InvalidTrip(err) => write!(f, "{err}"),
            Self::NoDays(id) => write!(f, "trip {id} has no days to extend"),
            Self::LastDayRemaining(id) => {
                write!(f, "trip {id} must keep at least one day")
            }
            Self::Conflict(id) => write!(f, "trip {id} kept changing while saving"),
            Self::Storage(err) => write!(f, "{err}"),
            Self::Asset(err) => write!(f, "{err}"),
        }
    }
}

impl Error for TripStoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidTrip(err) => Some(err),
            Self::Storage(err) => Some(err),
            Self::Asset(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for TripStoreError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(trip_id) => Self::TripNotFound(trip_id),
            RepoError::Conflict { trip_id, .. } => Self::Conflict(trip_id),
            other => Self::Storage(other),
        }
    }
}

impl From<TripValidationError> for TripStoreError {
    fn from(value: TripValidationError) -> Self {
        Self::InvalidTrip(value)
    }
}

/// Whether a failure surfaces in the user-visible `error` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ErrorPolicy {
    /// Log and publish the error message.
    Loud,
    /// Log only; the caller still receives the `Err`.
    Silent,
}

/// Immutable view of store state handed to readers and listeners.
#[derive(Debug, Clone, Default)]
pub struct TripStoreSnapshot {
    pub trips: Arc<Vec<Trip>>,
    pub current_trip_id: Option<TripId>,
    pub is_loading: bool,
    pub error: Option<String>,
}

impl TripStoreSnapshot {
    pub fn trip(&self, trip_id: &str) -> Option<&Trip> {
        self.trips.iter().find(|trip| trip.id == trip_id)
    }

    pub fn current_trip(&self) -> Option<&Trip> {
        self.current_trip_id
            .as_deref()
            .and_then(|trip_id| self.trip(trip_id))
    }
}

/// Outcome of best-effort asset release during cascade deletes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseReport {
    /// Number of assets released (or already gone).
    pub released: usize,
    /// Items whose asset could not be released.
    pub failed: Vec<ContentItemId>,
}

impl ReleaseReport {
    fn merge(&mut self, other: ReleaseReport) {
        self.released += other.released;
        self.failed.extend(other.failed);
    }
}

/// In-memory trip cache plus all graph mutation operations.
///
/// Constructed by the composition root with its persistent store and file
/// store injected.
pub struct TripStore<R: TripRepository, F: FileStore> {
    repo: R,
    files: F,
    state: TripStoreSnapshot,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_subscription: SubscriptionId,
}

impl<R: TripRepository, F: FileStore> TripStore<R, F> {
    /// Creates an empty store. Call `load_trips` to populate it.
    pub fn new(repo: R, files: F) -> Self {
        Self {
            repo,
            files,
            state: TripStoreSnapshot::default(),
            listeners: Vec::new(),
            next_subscription: 1,
        }
    }

    pub fn repo(&self) -> &R {
        &self.repo
    }

    pub fn file_store(&self) -> &F {
        &self.files
    }

    /// Returns the current published snapshot.
    pub fn snapshot(&self) -> &TripStoreSnapshot {
        &self.state
    }

    pub fn trips(&self) -> &[Trip] {
        self.state.trips.as_slice()
    }

    pub fn current_trip(&self) -> Option<&Trip> {
        self.state.current_trip()
    }

    pub fn is_loading(&self) -> bool {
        self.state.is_loading
    }

    pub fn error(&self) -> Option<&str> {
        self.state.error.as_deref()
    }

    /// Registers a listener called after every published state change.
    pub fn subscribe(&mut self, listener: impl Fn(&TripStoreSnapshot) + 'static) -> SubscriptionId {
        let id = self.next_subscription;
        self.next_subscription += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Removes a listener. Returns `false` when `id` was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    pub fn clear_error(&mut self) {
        if self.state.error.take().is_some() {
            self.publish();
        }
    }

    /// Replaces the whole cache from the persistent store.
    pub fn load_trips(&mut self) -> TripStoreResult<()> {
        let started_at = Instant::now();
        self.begin_loading();

        match self.repo.get_trips() {
            Ok(trips) => {
                info!(
                    "event=trips_load module=store status=ok count={} duration_ms={}",
                    trips.len(),
                    started_at.elapsed().as_millis()
                );
                self.state.trips = Arc::new(trips);
                self.state.is_loading = false;
                self.publish();
                Ok(())
            }
            Err(err) => self.fail("load_trips", ErrorPolicy::Loud, err.into()),
        }
    }

    /// Points `current_trip` at the cached trip with `trip_id`, or clears it.
    ///
    /// Pure cache lookup; never touches storage.
    pub fn set_current_trip(&mut self, trip_id: &str) {
        self.state.current_trip_id = self
            .state
            .trip(trip_id)
            .map(|trip| trip.id.clone());
        self.publish();
    }

    /// Creates a trip with one day per date between `start_date` and
    /// `end_date`, persists it and reloads the cache from storage.
    pub fn add_trip(
        &mut self,
        title: impl Into<String>,
        start_date: &str,
        end_date: &str,
    ) -> TripStoreResult<Trip> {
        let started_at = Instant::now();
        self.begin_loading();

        let result = (|| -> TripStoreResult<(Trip, Vec<Trip>)> {
            let start = parse_iso_date(start_date)?;
            let end = parse_iso_date(end_date)?;
            let trip = Trip::new(title, start, end)?;
            self.repo.add_trip(&trip)?;
            let trips = self.repo.get_trips()?;
            Ok((trip, trips))
        })();

        match result {
            Ok((trip, trips)) => {
                let created = trips
                    .iter()
                    .find(|stored| stored.id == trip.id)
                    .cloned()
                    .unwrap_or(trip);
                info!(
                    "event=trip_create module=store status=ok trip_id={} days={} duration_ms={}",
                    created.id,
                    created.days.len(),
                    started_at.elapsed().as_millis()
                );
                self.state.trips = Arc::new(trips);
                self.state.is_loading = false;
                self.publish();
                Ok(created)
            }
            Err(err) => self.fail("add_trip", ErrorPolicy::Loud, err),
        }
    }

    /// Deletes a trip, releasing every content item's asset first.
    ///
    /// Items come from the stored record, not the cache, so uploads made by
    /// another writer since the last load are released too.
    pub fn delete_trip(&mut self, trip_id: &str) -> TripStoreResult<ReleaseReport> {
        self.begin_loading();

        let report = match self.remove_stored_trip(trip_id) {
            Ok(report) => report,
            Err(err) => return self.fail("delete_trip", ErrorPolicy::Loud, err),
        };

        Arc::make_mut(&mut self.state.trips).retain(|trip| trip.id != trip_id);
        if self.state.current_trip_id.as_deref() == Some(trip_id) {
            self.state.current_trip_id = None;
        }
        self.state.is_loading = false;
        info!(
            "event=trip_delete module=store status=ok trip_id={} released={} release_failed={}",
            trip_id,
            report.released,
            report.failed.len()
        );
        self.publish();
        Ok(report)
    }

    /// Appends a content item to a day.
    ///
    /// The asset must already be in the file store; only metadata is
    /// recorded here.
    pub fn add_content_item(
        &mut self,
        trip_id: &str,
        day_id: &str,
        item: NewContentItem,
    ) -> TripStoreResult<ContentItem> {
        self.begin_loading();
        self.mutate_trip("add_content_item", ErrorPolicy::Loud, trip_id, |trip| {
            let day = find_day_mut(trip, day_id)?;
            let created = ContentItem {
                id: Uuid::new_v4().to_string(),
                day_id: day.id.clone(),
                title: item.title.clone(),
                memo: item.memo.clone(),
                kind: item.kind,
                uri: item.uri.clone(),
                cloud_url: None,
                created_at: Utc::now(),
            };
            day.items.push(created.clone());
            Ok(created)
        })
    }

    /// Imports `source` into the file store and attaches it to a day.
    ///
    /// When the item cannot be recorded, the imported copy is released again
    /// so no unreferenced asset is left behind.
    pub fn attach_content(
        &mut self,
        trip_id: &str,
        day_id: &str,
        source: &str,
        title: impl Into<String>,
        memo: Option<String>,
        kind: ContentKind,
    ) -> TripStoreResult<ContentItem> {
        let uri = match self.files.import(source) {
            Ok(uri) => uri,
            Err(err) => {
                return self.fail("attach_content", ErrorPolicy::Loud, TripStoreError::Asset(err))
            }
        };
        let item = NewContentItem {
            title: title.into(),
            memo,
            kind,
            uri: uri.clone(),
        };

        let result = self.add_content_item(trip_id, day_id, item);
        if result.is_err() {
            if let Err(err) = self.files.delete(&uri) {
                warn!(
                    "event=asset_release module=store status=error op=attach_content error={}",
                    err
                );
            }
        }
        result
    }

    /// Sets or clears the memo of one content item.
    pub fn update_content_memo(
        &mut self,
        trip_id: &str,
        day_id: &str,
        item_id: &str,
        memo: Option<String>,
    ) -> TripStoreResult<()> {
        self.mutate_trip("update_content_memo", ErrorPolicy::Silent, trip_id, |trip| {
            let day = find_day_mut(trip, day_id)?;
            let target = day
                .items
                .iter_mut()
                .find(|entry| entry.id == item_id)
                .ok_or_else(|| TripStoreError::ContentItemNotFound {
                    day_id: day_id.to_string(),
                    item_id: item_id.to_string(),
                })?;
            target.memo = memo.clone();
            Ok(())
        })
    }

    /// Removes one content item and then releases its asset.
    pub fn remove_content_item(
        &mut self,
        trip_id: &str,
        day_id: &str,
        item_id: &str,
    ) -> TripStoreResult<ContentItem> {
        self.begin_loading();
        let removed = self.mutate_trip("remove_content_item", ErrorPolicy::Loud, trip_id, |trip| {
            let day = find_day_mut(trip, day_id)?;
            let index = day
                .items
                .iter()
                .position(|entry| entry.id == item_id)
                .ok_or_else(|| TripStoreError::ContentItemNotFound {
                    day_id: day_id.to_string(),
                    item_id: item_id.to_string(),
                })?;
            Ok(day.items.remove(index))
        })?;

        self.release_items(std::slice::from_ref(&removed));
        Ok(removed)
    }

    /// Appends an unchecked checklist item.
    pub fn add_checklist_item(
        &mut self,
        trip_id: &str,
        text: impl Into<String>,
    ) -> TripStoreResult<ChecklistItem> {
        let text = text.into();
        self.mutate_trip("add_checklist_item", ErrorPolicy::Silent, trip_id, |trip| {
            let created = ChecklistItem {
                id: Uuid::new_v4().to_string(),
                trip_id: trip.id.clone(),
                text: text.clone(),
                is_checked: false,
                created_at: Utc::now(),
            };
            trip.checklist.push(created.clone());
            Ok(created)
        })
    }

    /// Flips `is_checked` and returns the new value.
    pub fn toggle_checklist_item(&mut self, trip_id: &str, item_id: &str) -> TripStoreResult<bool> {
        self.mutate_trip("toggle_checklist_item", ErrorPolicy::Silent, trip_id, |trip| {
            let item = trip.checklist_item_mut(item_id).ok_or_else(|| {
                TripStoreError::ChecklistItemNotFound {
                    trip_id: trip_id.to_string(),
                    item_id: item_id.to_string(),
                }
            })?;
            item.is_checked = !item.is_checked;
            Ok(item.is_checked)
        })
    }

    pub fn remove_checklist_item(&mut self, trip_id: &str, item_id: &str) -> TripStoreResult<()> {
        self.mutate_trip("remove_checklist_item", ErrorPolicy::Silent, trip_id, |trip| {
            let index = trip
                .checklist
                .iter()
                .position(|item| item.id == item_id)
                .ok_or_else(|| TripStoreError::ChecklistItemNotFound {
                    trip_id: trip_id.to_string(),
                    item_id: item_id.to_string(),
                })?;
            trip.checklist.remove(index);
            Ok(())
        })
    }

    /// Sets or overwrites a day's user title. Empty titles are stored as-is.
    pub fn update_day_title(
        &mut self,
        trip_id: &str,
        day_id: &str,
        title: impl Into<String>,
    ) -> TripStoreResult<()> {
        let title = title.into();
        self.mutate_trip("update_day_title", ErrorPolicy::Silent, trip_id, |trip| {
            find_day_mut(trip, day_id)?.title = Some(title.clone());
            Ok(())
        })
    }

    /// Appends a day after the last one and moves `end_date` to its date.
    pub fn add_day(&mut self, trip_id: &str) -> TripStoreResult<Day> {
        self.mutate_trip("add_day", ErrorPolicy::Silent, trip_id, |trip| {
            let last = trip
                .days
                .last()
                .ok_or_else(|| TripStoreError::NoDays(trip.id.clone()))?;
            let date = last
                .date
                .checked_add_days(Days::new(1))
                .ok_or(TripValidationError::DateOutOfRange)?;
            let day = Day::new(&trip.id, last.day_number + 1, date);
            trip.days.push(day.clone());
            trip.end_date = date;
            Ok(day)
        })
    }

    /// Deletes a day after releasing its items' assets.
    ///
    /// Remaining days keep their numbers. `end_date` follows the last
    /// remaining day. A single asset release failure does not stop the rest.
    pub fn delete_day(&mut self, trip_id: &str, day_id: &str) -> TripStoreResult<ReleaseReport> {
        let doomed = match self.deletable_day_items(trip_id, day_id) {
            Ok(items) => items,
            Err(err) => return self.fail("delete_day", ErrorPolicy::Silent, err),
        };
        let mut report = self.release_items(&doomed);

        let removed = self.mutate_trip("delete_day", ErrorPolicy::Silent, trip_id, |trip| {
            let index = trip
                .days
                .iter()
                .position(|day| day.id == day_id)
                .ok_or_else(|| TripStoreError::DayNotFound {
                    trip_id: trip.id.clone(),
                    day_id: day_id.to_string(),
                })?;
            if trip.days.len() == 1 {
                return Err(TripStoreError::LastDayRemaining(trip.id.clone()));
            }
            let removed = trip.days.remove(index);
            if let Some(last) = trip.days.last() {
                trip.end_date = last.date;
            }
            Ok(removed)
        })?;

        // Items added by a concurrent writer between our read and the retry.
        let late: Vec<ContentItem> = removed
            .items
            .into_iter()
            .filter(|item| !doomed.iter().any(|released| released.id == item.id))
            .collect();
        report.merge(self.release_items(&late));
        Ok(report)
    }

    fn remove_stored_trip(&self, trip_id: &str) -> TripStoreResult<ReleaseReport> {
        let mut report = ReleaseReport::default();
        let mut released: HashSet<ContentItemId> = HashSet::new();
        let mut attempt = 1;
        loop {
            let stored = self
                .repo
                .get_trip(trip_id)?
                .ok_or_else(|| TripStoreError::TripNotFound(trip_id.to_string()))?;
            let pending: Vec<ContentItem> = stored
                .content_items()
                .filter(|item| !released.contains(&item.id))
                .cloned()
                .collect();
            report.merge(self.release_items(&pending));
            released.extend(pending.into_iter().map(|item| item.id));

            match self.repo.delete_trip(&stored) {
                Ok(()) => return Ok(report),
                Err(RepoError::Conflict {
                    expected_revision, ..
                }) if attempt < MAX_WRITE_ATTEMPTS => {
                    warn!(
                        "event=trip_delete_conflict module=store status=retry trip_id={} expected_revision={} attempt={}",
                        trip_id, expected_revision, attempt
                    );
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn deletable_day_items(&self, trip_id: &str, day_id: &str) -> TripStoreResult<Vec<ContentItem>> {
        let trip = self.cached_trip(trip_id)?;
        let day = trip.day(day_id).ok_or_else(|| TripStoreError::DayNotFound {
            trip_id: trip_id.to_string(),
            day_id: day_id.to_string(),
        })?;
        if trip.days.len() == 1 {
            return Err(TripStoreError::LastDayRemaining(trip.id.clone()));
        }
        Ok(day.items.clone())
    }

    fn mutate_trip<T>(
        &mut self,
        op: &'static str,
        policy: ErrorPolicy,
        trip_id: &str,
        apply: impl FnMut(&mut Trip) -> TripStoreResult<T>,
    ) -> TripStoreResult<T> {
        let started_at = Instant::now();
        match self.write_trip(trip_id, apply) {
            Ok((saved, output, attempts)) => {
                info!(
                    "event=trip_mutation module=store status=ok op={} trip_id={} revision={} attempts={} duration_ms={}",
                    op,
                    saved.id,
                    saved.revision,
                    attempts,
                    started_at.elapsed().as_millis()
                );
                self.replace_trip(saved);
                self.state.is_loading = false;
                self.publish();
                Ok(output)
            }
            Err(err) => self.fail(op, policy, err),
        }
    }

    fn write_trip<T>(
        &self,
        trip_id: &str,
        mut apply: impl FnMut(&mut Trip) -> TripStoreResult<T>,
    ) -> TripStoreResult<(Trip, T, u32)> {
        let mut base = self.cached_trip(trip_id)?.clone();
        let mut attempt = 1;
        loop {
            let mut draft = base.clone();
            let output = apply(&mut draft)?;
            draft.touch(Utc::now());

            match self.repo.update_trip(&draft) {
                Ok(saved) => return Ok((saved, output, attempt)),
                Err(RepoError::Conflict {
                    expected_revision, ..
                }) if attempt < MAX_WRITE_ATTEMPTS => {
                    warn!(
                        "event=trip_write_conflict module=store status=retry trip_id={} expected_revision={} attempt={}",
                        trip_id, expected_revision, attempt
                    );
                    base = self
                        .repo
                        .get_trip(trip_id)?
                        .ok_or_else(|| TripStoreError::TripNotFound(trip_id.to_string()))?;
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn cached_trip(&self, trip_id: &str) -> TripStoreResult<&Trip> {
        self.state
            .trip(trip_id)
            .ok_or_else(|| TripStoreError::TripNotFound(trip_id.to_string()))
    }

    fn replace_trip(&mut self, trip: Trip) {
        let trips = Arc::make_mut(&mut self.state.trips);
        match trips.iter_mut().find(|slot| slot.id == trip.id) {
            Some(slot) => *slot = trip,
            None => trips.push(trip),
        }
    }

    fn release_items(&self, items: &[ContentItem]) -> ReleaseReport {
        let mut report = ReleaseReport::default();
        for item in items {
            match self.files.delete(&item.uri) {
                Ok(()) => report.released += 1,
                Err(err) => {
                    warn!(
                        "event=asset_release module=store status=error item_id={} error={}",
                        item.id, err
                    );
                    report.failed.push(item.id.clone());
                }
            }
        }
        report
    }

    fn begin_loading(&mut self) {
        self.state.is_loading = true;
        self.state.error = None;
        self.publish();
    }

    fn fail<T>(
        &mut self,
        op: &'static str,
        policy: ErrorPolicy,
        err: TripStoreError,
    ) -> TripStoreResult<T> {
        let was_loading = std::mem::replace(&mut self.state.is_loading, false);
        match policy {
            ErrorPolicy::Loud => {
                error!("event=trip_op module=store status=error op={} error={}", op, err);
                self.state.error = Some(format!("{op} failed: {err}"));
                self.publish();
            }
            ErrorPolicy::Silent => {
                warn!("event=trip_op module=store status=error op={} error={}", op, err);
                if was_loading {
                    self.publish();
                }
            }
        }
        Err(err)
    }

    fn publish(&self) {
        for (_, listener) in &self.listeners {
            listener(&self.state);
        }
    }
}

fn find_day_mut<'a>(trip: &'a mut Trip, day_id: &str) -> TripStoreResult<&'a mut Day> {
    let trip_id = trip.id.clone();
    trip.day_mut(day_id).ok_or_else(|| TripStoreError::DayNotFound {
        trip_id,
        day_id: day_id.to_string(),
    })
}

/// Parses `YYYY-MM-DD`, falling back to the date part of an RFC 3339
/// timestamp.
pub fn parse_iso_date(value: &str) -> TripStoreResult<NaiveDate> {
    let trimmed = value.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .or_else(|_| DateTime::parse_from_rfc3339(trimmed).map(|stamp| stamp.date_naive()))
        .map_err(|_| TripStoreError::InvalidDate(value.to_string()))
}
