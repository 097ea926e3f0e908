//! Trip repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist whole Trip graphs as single JSON records keyed by trip ID.
//! - Guard full-record replacement with a revision check-and-set.
//!
//! # Invariants
//! - Persistence is record-level: any nested change rewrites the whole Trip.
//! - Write paths must call `Trip::validate()` before SQL mutations.
//! - Read paths must reject undecodable or invalid records instead of
//!   masking them.
//! - `update_trip` and `delete_trip` only succeed when the stored revision
//!   equals the caller's revision; an update then increments it.

use crate::db::DbError;
use crate::model::trip::{Trip, TripId, TripValidationError};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};

const TRIP_SELECT_SQL: &str = "SELECT
    id,
    payload,
    revision
FROM trips";

pub type RepoResult<T> = Result<T, RepoError>;

/// Storage failure for trip persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(TripValidationError),
    Db(DbError),
    NotFound(TripId),
    /// Stored record moved past the revision the caller read.
    Conflict {
        trip_id: TripId,
        expected_revision: u64,
    },
    Serialization(serde_json::Error),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "trip not found: {id}"),
            Self::Conflict {
                trip_id,
                expected_revision,
            } => write!(
                f,
                "trip {trip_id} was modified concurrently (expected revision {expected_revision})"
            ),
            Self::Serialization(err) => write!(f, "failed to serialize trip record: {err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted trip data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::Serialization(err) => Some(err),
            Self::NotFound(_) | Self::Conflict { .. } | Self::InvalidData(_) => None,
        }
    }
}

impl From<TripValidationError> for RepoError {
    fn from(value: TripValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value)
    }
}

/// Durable key-addressed storage for full Trip records.
pub trait TripRepository {
    /// Loads every trip ordered by creation time.
    fn get_trips(&self) -> RepoResult<Vec<Trip>>;
    /// Loads one trip by ID.
    fn get_trip(&self, id: &str) -> RepoResult<Option<Trip>>;
    /// Inserts a new trip record.
    fn add_trip(&self, trip: &Trip) -> RepoResult<()>;
    /// Replaces the full record and returns it with its new revision.
    fn update_trip(&self, trip: &Trip) -> RepoResult<Trip>;
    /// Removes the record `trip` was read from, unless it moved on since.
    fn delete_trip(&self, trip: &Trip) -> RepoResult<()>;
}

/// SQLite-backed trip repository.
pub struct SqliteTripRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTripRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl TripRepository for SqliteTripRepository<'_> {
    fn get_trips(&self) -> RepoResult<Vec<Trip>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{TRIP_SELECT_SQL} ORDER BY created_at ASC, id ASC;"))?;
        let mut rows = stmt.query([])?;
        let mut trips = Vec::new();

        while let Some(row) = rows.next()? {
            trips.push(parse_trip_row(row)?);
        }

        Ok(trips)
    }

    fn get_trip(&self, id: &str) -> RepoResult<Option<Trip>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{TRIP_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_trip_row(row)?));
        }

        Ok(None)
    }

    fn add_trip(&self, trip: &Trip) -> RepoResult<()> {
        trip.validate()?;
        let payload = serde_json::to_string(trip)?;

        self.conn.execute(
            "INSERT INTO trips (
                id,
                payload,
                revision,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                trip.id.as_str(),
                payload,
                revision_to_db(trip.revision)?,
                timestamp_to_db(trip.created_at),
                timestamp_to_db(trip.updated_at),
            ],
        )?;

        Ok(())
    }

    fn update_trip(&self, trip: &Trip) -> RepoResult<Trip> {
        trip.validate()?;

        let mut next = trip.clone();
        next.revision = trip.revision + 1;
        let payload = serde_json::to_string(&next)?;

        let changed = self.conn.execute(
            "UPDATE trips
             SET
                payload = ?1,
                revision = ?2,
                updated_at = ?3
             WHERE id = ?4
               AND revision = ?5;",
            params![
                payload,
                revision_to_db(next.revision)?,
                timestamp_to_db(next.updated_at),
                trip.id.as_str(),
                revision_to_db(trip.revision)?,
            ],
        )?;

        if changed == 0 {
            return Err(self.missed_write(trip));
        }

        Ok(next)
    }

    fn delete_trip(&self, trip: &Trip) -> RepoResult<()> {
        let changed = self.conn.execute(
            "DELETE FROM trips WHERE id = ?1 AND revision = ?2;",
            params![trip.id.as_str(), revision_to_db(trip.revision)?],
        )?;
        if changed == 0 {
            return Err(self.missed_write(trip));
        }

        Ok(())
    }
}

impl SqliteTripRepository<'_> {
    /// Explains a revision-checked write that matched no row.
    fn missed_write(&self, trip: &Trip) -> RepoError {
        let found = self
            .conn
            .query_row("SELECT 1 FROM trips WHERE id = ?1;", [trip.id.as_str()], |_| {
                Ok(())
            })
            .optional();
        match found {
            Ok(Some(())) => RepoError::Conflict {
                trip_id: trip.id.clone(),
                expected_revision: trip.revision,
            },
            Ok(None) => RepoError::NotFound(trip.id.clone()),
            Err(err) => err.into(),
        }
    }
}

fn parse_trip_row(row: &Row<'_>) -> RepoResult<Trip> {
    let id: String = row.get("id")?;
    let payload: String = row.get("payload")?;
    let revision: i64 = row.get("revision")?;

    let mut trip: Trip = serde_json::from_str(&payload).map_err(|err| {
        RepoError::InvalidData(format!("undecodable payload for trip `{id}`: {err}"))
    })?;
    if trip.id != id {
        return Err(RepoError::InvalidData(format!(
            "payload id `{}` does not match row id `{id}`",
            trip.id
        )));
    }
    trip.revision = u64::try_from(revision).map_err(|_| {
        RepoError::InvalidData(format!("invalid revision `{revision}` for trip `{id}`"))
    })?;

    trip.validate()?;
    Ok(trip)
}

fn revision_to_db(revision: u64) -> RepoResult<i64> {
    i64::try_from(revision)
        .map_err(|_| RepoError::InvalidData(format!("revision `{revision}` exceeds storage range")))
}

fn timestamp_to_db(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}
