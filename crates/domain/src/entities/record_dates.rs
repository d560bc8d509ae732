//! Projection input - date slots extracted from a domain record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::UserId;

/// One named date field of a domain record
///
/// The slot name is stable across record updates (e.g. "closing_date",
/// "inspection_date") and is what derived calendar events and reminders are
/// matched on when the record changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateSlot {
    /// Stable slot identifier
    pub name: String,
    /// The date value; `None` means the field is unset (not an error)
    pub at: Option<DateTime<Utc>>,
}

impl DateSlot {
    /// Create a populated slot
    #[must_use]
    pub fn new(name: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            at: Some(at),
        }
    }

    /// Create an unset slot
    #[must_use]
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            at: None,
        }
    }
}

/// The calendar-worthy view of a domain record
///
/// Higher-level collaborators hand this to the projector on record
/// create/update; the projector never reads domain records directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordDates {
    /// Identifier of the source record
    pub record_id: String,
    /// Owning user
    pub user_id: UserId,
    /// Human-readable label for the record (used in event titles)
    pub label: String,
    /// Named date fields of the record
    pub slots: Vec<DateSlot>,
}

impl RecordDates {
    /// Create a new projection input
    #[must_use]
    pub fn new(record_id: impl Into<String>, user_id: UserId, label: impl Into<String>) -> Self {
        Self {
            record_id: record_id.into(),
            user_id,
            label: label.into(),
            slots: Vec::new(),
        }
    }

    /// Add a populated date slot
    #[must_use]
    pub fn with_slot(mut self, name: impl Into<String>, at: DateTime<Utc>) -> Self {
        self.slots.push(DateSlot::new(name, at));
        self
    }

    /// Add an unset date slot
    #[must_use]
    pub fn with_empty_slot(mut self, name: impl Into<String>) -> Self {
        self.slots.push(DateSlot::empty(name));
        self
    }

    /// Iterate over populated slots only
    pub fn populated(&self) -> impl Iterator<Item = (&str, DateTime<Utc>)> {
        self.slots
            .iter()
            .filter_map(|slot| slot.at.map(|at| (slot.name.as_str(), at)))
    }
}
