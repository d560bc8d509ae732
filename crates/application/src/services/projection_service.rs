//! Projection service - derives calendar events and reminders from records

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use domain::entities::{CalendarEvent, EventType, RecordDates, Reminder};
use domain::value_objects::{ReminderId, UserId};
use tracing::{debug, info, instrument};

use crate::error::ApplicationError;
use crate::ports::{CredentialStorePort, EventStorePort, ReminderStorePort};
use crate::services::SyncService;

/// Tunables for record projection
#[derive(Debug, Clone)]
pub struct ProjectionConfig {
    /// How far ahead of the slot time the derived reminder fires, in hours
    pub reminder_lead_hours: i64,
    /// Duration assigned to derived events, in minutes
    pub event_duration_minutes: i64,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            reminder_lead_hours: 24,
            event_duration_minutes: 60,
        }
    }
}

/// Projects domain record dates into calendar events and reminders
///
/// Derived entities are keyed by (record, slot), so re-projecting an updated
/// record moves the existing pair instead of accumulating duplicates. Events
/// without a source record are user-authored and are never touched here.
pub struct ProjectionService<C, E, R>
where
    C: CredentialStorePort,
    E: EventStorePort,
    R: ReminderStorePort,
{
    events: Arc<E>,
    reminders: Arc<R>,
    sync: Arc<SyncService<C, E>>,
    config: ProjectionConfig,
}

impl<C, E, R> ProjectionService<C, E, R>
where
    C: CredentialStorePort,
    E: EventStorePort,
    R: ReminderStorePort,
{
    /// Create a new projection service
    #[must_use]
    pub fn new(
        events: Arc<E>,
        reminders: Arc<R>,
        sync: Arc<SyncService<C, E>>,
        config: ProjectionConfig,
    ) -> Self {
        Self {
            events,
            reminders,
            sync,
            config,
        }
    }

    /// Reconcile derived events and reminders with a record's current dates
    ///
    /// Called on record create and on every record update. Populated slots
    /// get an event/reminder pair (created or moved in place); slots that are
    /// no longer populated have their pair removed. Unset slots on a new
    /// record produce nothing.
    ///
    /// # Errors
    ///
    /// Returns the first storage failure; provider-side cleanup failures are
    /// logged and swallowed.
    #[instrument(skip(self, record), fields(record_id = %record.record_id))]
    pub async fn project_record(
        &self,
        record: &RecordDates,
    ) -> Result<Vec<CalendarEvent>, ApplicationError> {
        let user_id = record.user_id;
        let existing = self
            .events
            .list_by_source_record(user_id, &record.record_id)
            .await?;

        let mut projected = Vec::new();
        for (slot, at) in record.populated() {
            let event = self.upsert_event(record, slot, at).await?;
            self.upsert_reminder(user_id, record, slot, &event.title, at)
                .await?;
            projected.push(event);
        }

        // Slots that lost their date lose their derived pair.
        for event in existing {
            let Some(slot) = event.source_slot.as_deref() else {
                continue;
            };
            let still_populated = record.populated().any(|(name, _)| name == slot);
            if !still_populated {
                debug!(%slot, event_id = %event.id, "slot cleared; removing derived pair");
                self.remove_pair(user_id, &record.record_id, slot).await?;
            }
        }

        info!(
            record_id = %record.record_id,
            derived = projected.len(),
            "record projected"
        );
        Ok(projected)
    }

    async fn upsert_event(
        &self,
        record: &RecordDates,
        slot: &str,
        at: DateTime<Utc>,
    ) -> Result<CalendarEvent, ApplicationError> {
        let user_id = record.user_id;
        let title = slot_title(&record.label, slot);
        let end = at + Duration::minutes(self.config.event_duration_minutes);

        match self
            .events
            .get_by_source_slot(user_id, &record.record_id, slot)
            .await?
        {
            Some(mut event) => {
                if event.title != title || event.start_time != at {
                    event.title = title;
                    event.start_time = at;
                    event.end_time = end;
                    event.touch();
                    self.events.update(&event).await?;
                }
                Ok(event)
            }
            None => {
                let event = CalendarEvent::new(user_id, title, at, end, EventType::Deadline)
                    .with_source(record.record_id.clone(), slot);
                self.events.insert(&event).await?;
                Ok(event)
            }
        }
    }

    async fn upsert_reminder(
        &self,
        user_id: UserId,
        record: &RecordDates,
        slot: &str,
        title: &str,
        at: DateTime<Utc>,
    ) -> Result<(), ApplicationError> {
        let due_at = at - Duration::hours(self.config.reminder_lead_hours);
        match self
            .reminders
            .get_by_record_slot(user_id, &record.record_id, slot)
            .await?
        {
            Some(existing) => {
                if existing.due_at != due_at {
                    self.reminders
                        .reschedule(user_id, &existing.id, due_at)
                        .await?;
                }
            }
            None => {
                let reminder = Reminder::new(user_id, record.record_id.clone(), title, due_at)
                    .with_slot(slot);
                self.reminders.insert(&reminder).await?;
            }
        }
        Ok(())
    }

    async fn remove_pair(
        &self,
        user_id: UserId,
        record_id: &str,
        slot: &str,
    ) -> Result<(), ApplicationError> {
        if let Some(event) = self
            .events
            .get_by_source_slot(user_id, record_id, slot)
            .await?
        {
            self.sync.delete_event(user_id, &event.id).await?;
        }
        if let Some(reminder) = self
            .reminders
            .get_by_record_slot(user_id, record_id, slot)
            .await?
        {
            self.reminders.delete(user_id, &reminder.id).await?;
        }
        Ok(())
    }

    /// Remove everything derived from a deleted record
    ///
    /// Synced events are also deleted at their provider, best effort.
    /// User-authored events are untouched.
    ///
    /// # Errors
    ///
    /// Returns the first storage failure.
    #[instrument(skip(self))]
    pub async fn delete_record(
        &self,
        user_id: UserId,
        record_id: &str,
    ) -> Result<u32, ApplicationError> {
        let derived = self.events.list_by_source_record(user_id, record_id).await?;
        let mut removed = 0u32;
        for event in derived {
            self.sync.delete_event(user_id, &event.id).await?;
            removed += 1;
        }
        let reminders = self.reminders.delete_by_record(user_id, record_id).await?;
        info!(record_id, events = removed, reminders, "record projection removed");
        Ok(removed)
    }

    /// Delete a reminder and the derived event from the same slot, if any
    ///
    /// User-created reminders have no slot and only the reminder itself is
    /// removed.
    ///
    /// # Errors
    ///
    /// Returns [`ApplicationError::NotFound`] when the reminder does not
    /// exist for this user.
    #[instrument(skip(self))]
    pub async fn remove_reminder(
        &self,
        user_id: UserId,
        reminder_id: &ReminderId,
    ) -> Result<(), ApplicationError> {
        let reminder = self
            .reminders
            .get(user_id, reminder_id)
            .await?
            .ok_or_else(|| ApplicationError::NotFound(format!("reminder {reminder_id}")))?;

        self.reminders.delete(user_id, reminder_id).await?;

        if let Some(slot) = &reminder.slot {
            if let Some(event) = self
                .events
                .get_by_source_slot(user_id, &reminder.linked_record_id, slot)
                .await?
            {
                self.sync.delete_event(user_id, &event.id).await?;
            }
        }
        Ok(())
    }
}

/// Build an event title like "123 Main St: Closing date"
fn slot_title(label: &str, slot: &str) -> String {
    let mut pretty = slot.replace('_', " ");
    if let Some(first) = pretty.get_mut(..1) {
        first.make_ascii_uppercase();
    }
    format!("{label}: {pretty}")
}
