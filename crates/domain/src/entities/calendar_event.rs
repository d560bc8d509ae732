//! Calendar event entity - Local representation of a calendar entry

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::{EventId, Provider, UserId};

/// Classification of a calendar event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A contractual or transactional deadline
    Deadline,
    /// A client follow-up
    FollowUp,
    /// A scheduled appointment
    Appointment,
    /// Pulled from a provider; carries no domain classification
    Imported,
}

impl EventType {
    /// Get a human-readable label
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Deadline => "Deadline",
            Self::FollowUp => "Follow-up",
            Self::Appointment => "Appointment",
            Self::Imported => "Imported",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A calendar event stored locally
///
/// The provider-assigned `external_id` is the idempotency key for merge in
/// both sync directions; it is unique per provider and only present after a
/// successful push (or when the event was pulled from the provider).
/// `source_record_id` + `source_slot` link projector-derived events to the
/// domain record slot that generated them; events without a source record
/// are user-authored and are never auto-deleted by the projector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarEvent {
    /// Unique local identifier
    pub id: EventId,
    /// Owning user
    pub user_id: UserId,
    /// Provider this event is (or will be) synced with
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<Provider>,
    /// Event title/summary
    pub title: String,
    /// Optional detailed description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Start time
    pub start_time: DateTime<Utc>,
    /// End time
    pub end_time: DateTime<Utc>,
    /// Location (free-form address)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Domain classification
    pub event_type: EventType,
    /// Provider-assigned identifier (idempotency key for merge)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    /// Domain record that generated this event, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_record_id: Option<String>,
    /// Stable slot name within the source record (e.g. "closing_date")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_slot: Option<String>,
    /// When this event was created locally
    pub created_at: DateTime<Utc>,
    /// When this event was last modified locally
    pub updated_at: DateTime<Utc>,
    /// When this event was last pushed to the provider
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_pushed_at: Option<DateTime<Utc>>,
}

impl CalendarEvent {
    /// Create a new local event
    #[must_use]
    pub fn new(
        user_id: UserId,
        title: impl Into<String>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        event_type: EventType,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: EventId::new(),
            user_id,
            provider: None,
            title: title.into(),
            description: None,
            start_time,
            end_time,
            location: None,
            event_type,
            external_id: None,
            source_record_id: None,
            source_slot: None,
            created_at: now,
            updated_at: now,
            last_pushed_at: None,
        }
    }

    /// Set a description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set a location
    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Link this event to the domain record slot that generated it
    #[must_use]
    pub fn with_source(mut self, record_id: impl Into<String>, slot: impl Into<String>) -> Self {
        self.source_record_id = Some(record_id.into());
        self.source_slot = Some(slot.into());
        self
    }

    /// Attach provider-side identity (used when pulling remote events)
    #[must_use]
    pub fn with_external_id(mut self, provider: Provider, external_id: impl Into<String>) -> Self {
        self.provider = Some(provider);
        self.external_id = Some(external_id.into());
        self
    }

    /// Check whether this event was created by a user rather than derived
    #[must_use]
    pub const fn is_user_authored(&self) -> bool {
        self.source_record_id.is_none()
    }

    /// Check whether this event needs to be pushed to the provider
    ///
    /// True when it has never been pushed, or when it was modified locally
    /// after the last push.
    #[must_use]
    pub fn needs_push(&self) -> bool {
        match self.last_pushed_at {
            None => true,
            Some(pushed_at) => self.updated_at > pushed_at,
        }
    }

    /// Record a successful push to the provider
    pub fn mark_pushed(
        &mut self,
        provider: Provider,
        external_id: impl Into<String>,
        pushed_at: DateTime<Utc>,
    ) {
        self.provider = Some(provider);
        self.external_id = Some(external_id.into());
        self.last_pushed_at = Some(pushed_at);
    }

    /// Overwrite provider-owned fields from a fresh pull (last-write-wins)
    pub fn apply_remote(
        &mut self,
        title: impl Into<String>,
        description: Option<String>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        location: Option<String>,
    ) {
        let now = Utc::now();
        self.title = title.into();
        self.description = description;
        self.start_time = start_time;
        self.end_time = end_time;
        self.location = location;
        self.updated_at = now;
        // A pull reflects provider state; nothing new to push back.
        self.last_pushed_at = Some(now);
    }

    /// Touch the modification timestamp so the next sync pass pushes it
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
