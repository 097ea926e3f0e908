//! Trip graph model.
//!
//! # Responsibility
//! - Define the canonical Trip record and its nested Day / ContentItem /
//!   ChecklistItem children.
//! - Provide day-plan generation for new trips.
//!
//! # Invariants
//! - `Trip::days` is ordered by `day_number` ascending, starts at 1 on
//!   creation and never holds duplicate day numbers. Gaps are valid.
//! - Day IDs are derived from the owning trip ID and day number.
//! - Back-references (`trip_id`, `day_id`) always point at the owner.

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable trip identifier.
pub type TripId = String;
/// Day identifier, derived as `<trip_id>_day_<day_number>`.
pub type DayId = String;
/// Content item identifier.
pub type ContentItemId = String;
/// Checklist item identifier.
pub type ChecklistItemId = String;

/// Upper bound for generated day plans.
pub const MAX_TRIP_DAYS: u64 = 3660;

/// Kind of asset attached to a day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Photo,
    File,
}

impl ContentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Photo => "photo",
            Self::File => "file",
        }
    }
}

/// Photo or file attached to one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    pub id: ContentItemId,
    pub day_id: DayId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    /// Serialized as `type` to match the stored record shape.
    #[serde(rename = "type")]
    pub kind: ContentKind,
    /// Local file-store locator. Owned exclusively by this item.
    pub uri: String,
    /// Reserved for a remote mirror; never set by core.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Caller-supplied part of a new content item.
///
/// The asset must already live in the file store; `uri` is its locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContentItem {
    pub title: String,
    pub memo: Option<String>,
    pub kind: ContentKind,
    pub uri: String,
}

/// One calendar day inside a trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Day {
    pub id: DayId,
    pub trip_id: TripId,
    /// User-facing ordinal. Stable once assigned, never renumbered.
    pub day_number: u32,
    /// User title overriding the default `N일차` label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub date: NaiveDate,
    /// Append-ordered upload list.
    #[serde(default)]
    pub items: Vec<ContentItem>,
}

impl Day {
    /// Creates an empty day with an ID derived from `trip_id` and `day_number`.
    pub fn new(trip_id: &str, day_number: u32, date: NaiveDate) -> Self {
        Self {
            id: day_id_for(trip_id, day_number),
            trip_id: trip_id.to_string(),
            day_number,
            title: None,
            date,
            items: Vec::new(),
        }
    }

    /// Returns the display label: user title when set, else `N일차`.
    pub fn label(&self) -> String {
        match &self.title {
            Some(title) => title.clone(),
            None => format!("{}일차", self.day_number),
        }
    }
}

/// Packing/todo entry scoped to one trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistItem {
    pub id: ChecklistItemId,
    pub trip_id: TripId,
    pub text: String,
    pub is_checked: bool,
    pub created_at: DateTime<Utc>,
}

/// Top-level planning unit and the unit of persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trip {
    pub id: TripId,
    pub title: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub days: Vec<Day>,
    /// Older records were written without a checklist.
    #[serde(default)]
    pub checklist: Vec<ChecklistItem>,
    /// Optimistic concurrency token owned by the persistent store.
    #[serde(default)]
    pub revision: u64,
}

impl Trip {
    /// Creates a trip with a generated ID and one day per date in range.
    ///
    /// # Errors
    /// - Returns `RangeTooLong` when the plan exceeds `MAX_TRIP_DAYS`.
    pub fn new(
        title: impl Into<String>,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Self, TripValidationError> {
        Self::with_id(
            Uuid::new_v4().to_string(),
            title,
            start_date,
            end_date,
            Utc::now(),
        )
    }

    /// Creates a trip with a caller-provided ID and creation time.
    ///
    /// Days are numbered `1..=N` and dated `start_date + (day_number - 1)`,
    /// where `N = |end_date - start_date| + 1`. Reversed ranges still count
    /// forward from `start_date`.
    pub fn with_id(
        id: impl Into<String>,
        title: impl Into<String>,
        start_date: NaiveDate,
        end_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Self, TripValidationError> {
        let id = id.into();
        let count = trip_day_count(start_date, end_date);
        if count > MAX_TRIP_DAYS {
            return Err(TripValidationError::RangeTooLong {
                days: count,
                max: MAX_TRIP_DAYS,
            });
        }

        let mut days = Vec::with_capacity(count as usize);
        for offset in 0..count {
            let date = start_date
                .checked_add_days(Days::new(offset))
                .ok_or(TripValidationError::DateOutOfRange)?;
            // count is bounded by MAX_TRIP_DAYS, so the cast cannot truncate.
            days.push(Day::new(&id, offset as u32 + 1, date));
        }

        Ok(Self {
            id,
            title: title.into(),
            start_date,
            end_date,
            created_at: now,
            updated_at: now,
            days,
            checklist: Vec::new(),
            revision: 0,
        })
    }

    pub fn day(&self, day_id: &str) -> Option<&Day> {
        self.days.iter().find(|day| day.id == day_id)
    }

    pub fn day_mut(&mut self, day_id: &str) -> Option<&mut Day> {
        self.days.iter_mut().find(|day| day.id == day_id)
    }

    pub fn checklist_item_mut(&mut self, item_id: &str) -> Option<&mut ChecklistItem> {
        self.checklist.iter_mut().find(|item| item.id == item_id)
    }

    /// Iterates every content item across all days.
    pub fn content_items(&self) -> impl Iterator<Item = &ContentItem> {
        self.days.iter().flat_map(|day| day.items.iter())
    }

    /// Marks the trip as modified at `now`.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    /// Checks structural invariants of the nested graph.
    ///
    /// # Errors
    /// - Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), TripValidationError> {
        if self.id.trim().is_empty() {
            return Err(TripValidationError::EmptyTripId);
        }

        let mut previous: Option<u32> = None;
        for day in &self.days {
            if day.day_number == 0 {
                return Err(TripValidationError::DayNumberNotPositive {
                    day_id: day.id.clone(),
                });
            }
            if let Some(prev) = previous {
                if day.day_number <= prev {
                    return Err(TripValidationError::DayOrder {
                        previous: prev,
                        next: day.day_number,
                    });
                }
            }
            previous = Some(day.day_number);

            if day.trip_id != self.id {
                return Err(TripValidationError::ForeignDay {
                    day_id: day.id.clone(),
                });
            }
            if let Some(item) = day.items.iter().find(|item| item.day_id != day.id) {
                return Err(TripValidationError::ForeignContentItem {
                    item_id: item.id.clone(),
                    day_id: day.id.clone(),
                });
            }
        }

        if let Some(item) = self.checklist.iter().find(|item| item.trip_id != self.id) {
            return Err(TripValidationError::ForeignChecklistItem {
                item_id: item.id.clone(),
            });
        }

        Ok(())
    }
}

/// Structural validation errors for the trip graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TripValidationError {
    EmptyTripId,
    DayNumberNotPositive {
        day_id: DayId,
    },
    /// Days out of order or sharing a day number.
    DayOrder {
        previous: u32,
        next: u32,
    },
    ForeignDay {
        day_id: DayId,
    },
    ForeignContentItem {
        item_id: ContentItemId,
        day_id: DayId,
    },
    ForeignChecklistItem {
        item_id: ChecklistItemId,
    },
    RangeTooLong {
        days: u64,
        max: u64,
    },
    DateOutOfRange,
}

impl Display for TripValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyTripId => write!(f, "trip id must not be empty"),
            Self::DayNumberNotPositive { day_id } => {
                write!(f, "day number must be positive: {day_id}")
            }
            Self::DayOrder { previous, next } => write!(
                f,
                "days must be strictly ordered by day number: {next} follows {previous}"
            ),
            Self::ForeignDay { day_id } => write!(f, "day {day_id} belongs to another trip"),
            Self::ForeignContentItem { item_id, day_id } => {
                write!(f, "content item {item_id} does not belong to day {day_id}")
            }
            Self::ForeignChecklistItem { item_id } => {
                write!(f, "checklist item {item_id} belongs to another trip")
            }
            Self::RangeTooLong { days, max } => {
                write!(f, "trip spans {days} days, more than the supported {max}")
            }
            Self::DateOutOfRange => write!(f, "day date is out of the supported range"),
        }
    }
}

impl Error for TripValidationError {}

/// Returns the inclusive day count for a date range: `|end - start| + 1`.
pub fn trip_day_count(start_date: NaiveDate, end_date: NaiveDate) -> u64 {
    (end_date - start_date).num_days().unsigned_abs() + 1
}

/// Derives the stable day ID for `day_number` in `trip_id`.
pub fn day_id_for(trip_id: &str, day_number: u32) -> DayId {
    format!("{trip_id}_day_{day_number}")
}
