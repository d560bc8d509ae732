//! Event store port - persistence for local calendar events

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::entities::CalendarEvent;
use domain::value_objects::{EventId, Provider, UserId};
#[cfg(test)]
use mockall::automock;

use crate::error::ApplicationError;

/// Port for persisting calendar events
///
/// Every read and write is scoped by `user_id`; an event belonging to another
/// user behaves exactly like a missing event.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EventStorePort: Send + Sync {
    /// Insert a new event
    async fn insert(&self, event: &CalendarEvent) -> Result<(), ApplicationError>;

    /// Replace all mutable fields of an existing event
    async fn update(&self, event: &CalendarEvent) -> Result<(), ApplicationError>;

    /// Get an event by local identifier
    async fn get(
        &self,
        user_id: UserId,
        id: &EventId,
    ) -> Result<Option<CalendarEvent>, ApplicationError>;

    /// Get an event by its provider-assigned identifier
    async fn get_by_external_id(
        &self,
        user_id: UserId,
        provider: Provider,
        external_id: &str,
    ) -> Result<Option<CalendarEvent>, ApplicationError>;

    /// Events that need pushing to the given provider
    ///
    /// An event needs pushing when it has never been pushed or was modified
    /// locally after its last push. Events already bound to a different
    /// provider are excluded.
    async fn list_pending_push(
        &self,
        user_id: UserId,
        provider: Provider,
    ) -> Result<Vec<CalendarEvent>, ApplicationError>;

    /// All events derived from a domain record
    async fn list_by_source_record(
        &self,
        user_id: UserId,
        record_id: &str,
    ) -> Result<Vec<CalendarEvent>, ApplicationError>;

    /// The event derived from one slot of a domain record
    async fn get_by_source_slot(
        &self,
        user_id: UserId,
        record_id: &str,
        slot: &str,
    ) -> Result<Option<CalendarEvent>, ApplicationError>;

    /// Record a successful push without touching `updated_at`
    async fn mark_pushed(
        &self,
        user_id: UserId,
        id: &EventId,
        provider: Provider,
        external_id: &str,
        pushed_at: DateTime<Utc>,
    ) -> Result<(), ApplicationError>;

    /// Delete an event, returning whether it existed
    async fn delete(&self, user_id: UserId, id: &EventId) -> Result<bool, ApplicationError>;
}
