//! Reminder store port - persistence for dispatchable reminders

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::entities::Reminder;
use domain::value_objects::{ReminderId, UserId};
#[cfg(test)]
use mockall::automock;

use crate::error::ApplicationError;

/// Port for persisting reminders
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ReminderStorePort: Send + Sync {
    /// Insert a new reminder
    async fn insert(&self, reminder: &Reminder) -> Result<(), ApplicationError>;

    /// Get a reminder by identifier
    async fn get(
        &self,
        user_id: UserId,
        id: &ReminderId,
    ) -> Result<Option<Reminder>, ApplicationError>;

    /// The reminder derived from one slot of a domain record
    async fn get_by_record_slot(
        &self,
        user_id: UserId,
        record_id: &str,
        slot: &str,
    ) -> Result<Option<Reminder>, ApplicationError>;

    /// Move a reminder's due time without resetting its sent state
    async fn reschedule(
        &self,
        user_id: UserId,
        id: &ReminderId,
        due_at: DateTime<Utc>,
    ) -> Result<(), ApplicationError>;

    /// Reminders due for dispatch across all users
    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<Reminder>, ApplicationError>;

    /// Atomically claim a reminder for sending
    ///
    /// Flips `is_sent` false to true with a conditional update. Returns
    /// `true` only for the caller that won the transition; overlapping
    /// dispatchers observe `false` and must skip the reminder.
    async fn claim_sent(
        &self,
        id: &ReminderId,
        sent_at: DateTime<Utc>,
    ) -> Result<bool, ApplicationError>;

    /// Dismiss a reminder, returning whether it existed
    async fn dismiss(&self, user_id: UserId, id: &ReminderId) -> Result<bool, ApplicationError>;

    /// Delete a reminder, returning whether it existed
    async fn delete(&self, user_id: UserId, id: &ReminderId) -> Result<bool, ApplicationError>;

    /// Delete all reminders linked to a domain record, returning the count
    async fn delete_by_record(
        &self,
        user_id: UserId,
        record_id: &str,
    ) -> Result<u64, ApplicationError>;
}
