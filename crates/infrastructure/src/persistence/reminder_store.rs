//! SQLite-based reminder persistence

use std::sync::Arc;

use application::{error::ApplicationError, ports::ReminderStorePort};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::entities::Reminder;
use domain::value_objects::{ReminderId, UserId};
use rusqlite::{OptionalExtension, Row, params};
use tokio::task;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::connection::ConnectionPool;
use super::credential_store::parse_instant;

const REMINDER_COLUMNS: &str = "id, user_id, linked_record_id, slot, title,
    due_at, is_sent, sent_at, is_dismissed, created_at, updated_at";

/// SQLite-based reminder store
#[derive(Debug, Clone)]
pub struct SqliteReminderStore {
    pool: Arc<ConnectionPool>,
}

impl SqliteReminderStore {
    /// Create a new SQLite reminder store
    #[must_use]
    pub const fn new(pool: Arc<ConnectionPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReminderStorePort for SqliteReminderStore {
    #[instrument(skip(self, reminder), fields(reminder_id = %reminder.id))]
    async fn insert(&self, reminder: &Reminder) -> Result<(), ApplicationError> {
        let pool = Arc::clone(&self.pool);
        let reminder = reminder.clone();

        task::spawn_blocking(move || {
            let conn = pool
                .get()
                .map_err(|e| ApplicationError::Storage(e.to_string()))?;

            conn.execute(
                "INSERT INTO reminders (
                    id, user_id, linked_record_id, slot, title,
                    due_at, is_sent, sent_at, is_dismissed, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    reminder.id.to_string(),
                    reminder.user_id.to_string(),
                    reminder.linked_record_id,
                    reminder.slot,
                    reminder.title,
                    reminder.due_at.to_rfc3339(),
                    reminder.is_sent,
                    reminder.sent_at.map(|t| t.to_rfc3339()),
                    reminder.is_dismissed,
                    reminder.created_at.to_rfc3339(),
                    reminder.updated_at.to_rfc3339(),
                ],
            )
            .map_err(|e| ApplicationError::Storage(e.to_string()))?;

            debug!("Saved reminder");
            Ok(())
        })
        .await
        .map_err(|e| ApplicationError::Internal(e.to_string()))?
    }

    #[instrument(skip(self), fields(reminder_id = %id))]
    async fn get(
        &self,
        user_id: UserId,
        id: &ReminderId,
    ) -> Result<Option<Reminder>, ApplicationError> {
        let pool = Arc::clone(&self.pool);
        let id_str = id.to_string();
        let user_id_str = user_id.to_string();

        task::spawn_blocking(move || {
            let conn = pool
                .get()
                .map_err(|e| ApplicationError::Storage(e.to_string()))?;

            conn.query_row(
                &format!(
                    "SELECT {REMINDER_COLUMNS} FROM reminders
                     WHERE id = ?1 AND user_id = ?2"
                ),
                params![id_str, user_id_str],
                row_to_reminder,
            )
            .optional()
            .map_err(|e| ApplicationError::Storage(e.to_string()))
        })
        .await
        .map_err(|e| ApplicationError::Internal(e.to_string()))?
    }

    #[instrument(skip(self))]
    async fn get_by_record_slot(
        &self,
        user_id: UserId,
        record_id: &str,
        slot: &str,
    ) -> Result<Option<Reminder>, ApplicationError> {
        let pool = Arc::clone(&self.pool);
        let user_id_str = user_id.to_string();
        let record_id = record_id.to_string();
        let slot = slot.to_string();

        task::spawn_blocking(move || {
            let conn = pool
                .get()
                .map_err(|e| ApplicationError::Storage(e.to_string()))?;

            conn.query_row(
                &format!(
                    "SELECT {REMINDER_COLUMNS} FROM reminders
                     WHERE user_id = ?1 AND linked_record_id = ?2 AND slot = ?3"
                ),
                params![user_id_str, record_id, slot],
                row_to_reminder,
            )
            .optional()
            .map_err(|e| ApplicationError::Storage(e.to_string()))
        })
        .await
        .map_err(|e| ApplicationError::Internal(e.to_string()))?
    }

    #[instrument(skip(self), fields(reminder_id = %id))]
    async fn reschedule(
        &self,
        user_id: UserId,
        id: &ReminderId,
        due_at: DateTime<Utc>,
    ) -> Result<(), ApplicationError> {
        let pool = Arc::clone(&self.pool);
        let id_str = id.to_string();
        let user_id_str = user_id.to_string();

        task::spawn_blocking(move || {
            let conn = pool
                .get()
                .map_err(|e| ApplicationError::Storage(e.to_string()))?;

            // Moves the due time only. is_sent stays put: a reminder fires
            // at most once per record slot even when its date changes.
            let affected = conn
                .execute(
                    "UPDATE reminders SET due_at = ?1, updated_at = ?2
                     WHERE id = ?3 AND user_id = ?4",
                    params![
                        due_at.to_rfc3339(),
                        Utc::now().to_rfc3339(),
                        id_str,
                        user_id_str,
                    ],
                )
                .map_err(|e| ApplicationError::Storage(e.to_string()))?;

            if affected == 0 {
                return Err(ApplicationError::NotFound(format!("reminder {id_str}")));
            }

            Ok(())
        })
        .await
        .map_err(|e| ApplicationError::Internal(e.to_string()))?
    }

    #[instrument(skip(self))]
    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<Reminder>, ApplicationError> {
        let pool = Arc::clone(&self.pool);
        let now_str = now.to_rfc3339();

        task::spawn_blocking(move || {
            let conn = pool
                .get()
                .map_err(|e| ApplicationError::Storage(e.to_string()))?;

            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {REMINDER_COLUMNS} FROM reminders
                     WHERE is_sent = 0 AND is_dismissed = 0 AND due_at <= ?1
                     ORDER BY due_at ASC"
                ))
                .map_err(|e| ApplicationError::Storage(e.to_string()))?;

            let reminders: Vec<Reminder> = stmt
                .query_map(params![now_str], row_to_reminder)
                .map_err(|e| ApplicationError::Storage(e.to_string()))?
                .filter_map(Result::ok)
                .collect();

            debug!(count = reminders.len(), "Fetched due reminders");
            Ok(reminders)
        })
        .await
        .map_err(|e| ApplicationError::Internal(e.to_string()))?
    }

    #[instrument(skip(self), fields(reminder_id = %id))]
    async fn claim_sent(
        &self,
        id: &ReminderId,
        sent_at: DateTime<Utc>,
    ) -> Result<bool, ApplicationError> {
        let pool = Arc::clone(&self.pool);
        let id_str = id.to_string();
        let sent_at_str = sent_at.to_rfc3339();

        task::spawn_blocking(move || {
            let conn = pool
                .get()
                .map_err(|e| ApplicationError::Storage(e.to_string()))?;

            // Conditional update: only one caller observes the transition
            // from unsent to sent, however many dispatch scans overlap.
            let affected = conn
                .execute(
                    "UPDATE reminders SET is_sent = 1, sent_at = ?1, updated_at = ?1
                     WHERE id = ?2 AND is_sent = 0 AND is_dismissed = 0",
                    params![sent_at_str, id_str],
                )
                .map_err(|e| ApplicationError::Storage(e.to_string()))?;

            Ok(affected > 0)
        })
        .await
        .map_err(|e| ApplicationError::Internal(e.to_string()))?
    }

    #[instrument(skip(self), fields(reminder_id = %id))]
    async fn dismiss(&self, user_id: UserId, id: &ReminderId) -> Result<bool, ApplicationError> {
        let pool = Arc::clone(&self.pool);
        let id_str = id.to_string();
        let user_id_str = user_id.to_string();

        task::spawn_blocking(move || {
            let conn = pool
                .get()
                .map_err(|e| ApplicationError::Storage(e.to_string()))?;

            let affected = conn
                .execute(
                    "UPDATE reminders SET is_dismissed = 1, updated_at = ?1
                     WHERE id = ?2 AND user_id = ?3",
                    params![Utc::now().to_rfc3339(), id_str, user_id_str],
                )
                .map_err(|e| ApplicationError::Storage(e.to_string()))?;

            Ok(affected > 0)
        })
        .await
        .map_err(|e| ApplicationError::Internal(e.to_string()))?
    }

    #[instrument(skip(self), fields(reminder_id = %id))]
    async fn delete(&self, user_id: UserId, id: &ReminderId) -> Result<bool, ApplicationError> {
        let pool = Arc::clone(&self.pool);
        let id_str = id.to_string();
        let user_id_str = user_id.to_string();

        task::spawn_blocking(move || {
            let conn = pool
                .get()
                .map_err(|e| ApplicationError::Storage(e.to_string()))?;

            let affected = conn
                .execute(
                    "DELETE FROM reminders WHERE id = ?1 AND user_id = ?2",
                    params![id_str, user_id_str],
                )
                .map_err(|e| ApplicationError::Storage(e.to_string()))?;

            Ok(affected > 0)
        })
        .await
        .map_err(|e| ApplicationError::Internal(e.to_string()))?
    }

    #[instrument(skip(self))]
    async fn delete_by_record(
        &self,
        user_id: UserId,
        record_id: &str,
    ) -> Result<u64, ApplicationError> {
        let pool = Arc::clone(&self.pool);
        let user_id_str = user_id.to_string();
        let record_id = record_id.to_string();

        task::spawn_blocking(move || {
            let conn = pool
                .get()
                .map_err(|e| ApplicationError::Storage(e.to_string()))?;

            let affected = conn
                .execute(
                    "DELETE FROM reminders WHERE user_id = ?1 AND linked_record_id = ?2",
                    params![user_id_str, record_id],
                )
                .map_err(|e| ApplicationError::Storage(e.to_string()))?;

            debug!(count = affected, "Deleted reminders for record");
            Ok(affected as u64)
        })
        .await
        .map_err(|e| ApplicationError::Internal(e.to_string()))?
    }
}

/// Convert a database row to a `Reminder` domain entity
fn row_to_reminder(row: &Row<'_>) -> rusqlite::Result<Reminder> {
    let id_str: String = row.get(0)?;
    let user_id_str: String = row.get(1)?;
    let linked_record_id: String = row.get(2)?;
    let slot: Option<String> = row.get(3)?;
    let title: String = row.get(4)?;
    let due_at_str: String = row.get(5)?;
    let is_sent: bool = row.get(6)?;
    let sent_at_str: Option<String> = row.get(7)?;
    let is_dismissed: bool = row.get(8)?;
    let created_at_str: String = row.get(9)?;
    let updated_at_str: String = row.get(10)?;

    let id = ReminderId::parse(&id_str).unwrap_or_else(|_| ReminderId::from(Uuid::new_v4()));
    let user_id = UserId::parse(&user_id_str).unwrap_or_else(|_| UserId::from(Uuid::new_v4()));

    Ok(Reminder {
        id,
        user_id,
        linked_record_id,
        slot,
        title,
        due_at: parse_instant(&due_at_str),
        is_sent,
        sent_at: sent_at_str.map(|s| parse_instant(&s)),
        is_dismissed,
        created_at: parse_instant(&created_at_str),
        updated_at: parse_instant(&updated_at_str),
    })
}
