//! Reminder entity - Time-based notification derived from a domain record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::{ReminderId, UserId};

/// A reminder scheduled for dispatch at a due time
///
/// State machine: `Pending -> Sent` or `Pending -> Dismissed`, both one-way
/// and mutually exclusive. `is_sent` transitions false to true exactly once;
/// the storage layer enforces this with a conditional update so overlapping
/// dispatch scans cannot double-send. `is_dismissed` suppresses dispatch
/// regardless of `is_sent`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reminder {
    /// Unique identifier
    pub id: ReminderId,
    /// Owning user
    pub user_id: UserId,
    /// Domain record this reminder belongs to
    pub linked_record_id: String,
    /// Stable slot name within the record, when projector-derived
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slot: Option<String>,
    /// Short title/summary
    pub title: String,
    /// When this reminder becomes due
    pub due_at: DateTime<Utc>,
    /// Whether the dispatch side effect has fired
    pub is_sent: bool,
    /// When the side effect fired
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
    /// Whether the user dismissed this reminder
    pub is_dismissed: bool,
    /// When this reminder was created
    pub created_at: DateTime<Utc>,
    /// When this reminder was last updated
    pub updated_at: DateTime<Utc>,
}

impl Reminder {
    /// Create a new pending reminder
    #[must_use]
    pub fn new(
        user_id: UserId,
        linked_record_id: impl Into<String>,
        title: impl Into<String>,
        due_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ReminderId::new(),
            user_id,
            linked_record_id: linked_record_id.into(),
            slot: None,
            title: title.into(),
            due_at,
            is_sent: false,
            sent_at: None,
            is_dismissed: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the source slot name
    #[must_use]
    pub fn with_slot(mut self, slot: impl Into<String>) -> Self {
        self.slot = Some(slot.into());
        self
    }

    /// Check whether this reminder should be picked up by a dispatch scan
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.is_sent && !self.is_dismissed && self.due_at <= now
    }

    /// Mark the dispatch side effect as fired
    ///
    /// In-memory transition only; persistence goes through the store's
    /// conditional update to preserve the at-most-once guarantee.
    pub fn mark_sent(&mut self, now: DateTime<Utc>) {
        self.is_sent = true;
        self.sent_at = Some(now);
        self.updated_at = now;
    }

    /// Dismiss this reminder, suppressing future dispatch
    pub fn dismiss(&mut self) {
        self.is_dismissed = true;
        self.updated_at = Utc::now();
    }

    /// Move the due time (the owning record's date changed)
    ///
    /// Does not reset `is_sent`; a reminder fires at most once per record.
    pub fn reschedule(&mut self, due_at: DateTime<Utc>) {
        self.due_at = due_at;
        self.updated_at = Utc::now();
    }
}

impl std::fmt::Display for Reminder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = if self.is_dismissed {
            "dismissed"
        } else if self.is_sent {
            "sent"
        } else {
            "pending"
        };
        write!(f, "{} ({state}, due {})", self.title, self.due_at)
    }
}
