//! SQLite-based calendar event persistence

use std::str::FromStr;
use std::sync::Arc;

use application::{error::ApplicationError, ports::EventStorePort};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::entities::{CalendarEvent, EventType};
use domain::value_objects::{EventId, Provider, UserId};
use rusqlite::{OptionalExtension, Row, params};
use tokio::task;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::connection::ConnectionPool;
use super::credential_store::parse_instant;

const EVENT_COLUMNS: &str = "id, user_id, provider, title, description,
    start_time, end_time, location, event_type, external_id,
    source_record_id, source_slot, created_at, updated_at, last_pushed_at";

/// SQLite-based calendar event store
#[derive(Debug, Clone)]
pub struct SqliteEventStore {
    pool: Arc<ConnectionPool>,
}

impl SqliteEventStore {
    /// Create a new SQLite event store
    #[must_use]
    pub const fn new(pool: Arc<ConnectionPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventStorePort for SqliteEventStore {
    #[instrument(skip(self, event), fields(event_id = %event.id))]
    async fn insert(&self, event: &CalendarEvent) -> Result<(), ApplicationError> {
        let pool = Arc::clone(&self.pool);
        let event = event.clone();

        task::spawn_blocking(move || {
            let conn = pool
                .get()
                .map_err(|e| ApplicationError::Storage(e.to_string()))?;

            conn.execute(
                "INSERT INTO calendar_events (
                    id, user_id, provider, title, description,
                    start_time, end_time, location, event_type, external_id,
                    source_record_id, source_slot, created_at, updated_at, last_pushed_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                params![
                    event.id.to_string(),
                    event.user_id.to_string(),
                    event.provider.map(|p| p.as_str()),
                    event.title,
                    event.description,
                    event.start_time.to_rfc3339(),
                    event.end_time.to_rfc3339(),
                    event.location,
                    event_type_to_str(event.event_type),
                    event.external_id,
                    event.source_record_id,
                    event.source_slot,
                    event.created_at.to_rfc3339(),
                    event.updated_at.to_rfc3339(),
                    event.last_pushed_at.map(|t| t.to_rfc3339()),
                ],
            )
            .map_err(|e| ApplicationError::Storage(e.to_string()))?;

            debug!("Saved calendar event");
            Ok(())
        })
        .await
        .map_err(|e| ApplicationError::Internal(e.to_string()))?
    }

    #[instrument(skip(self, event), fields(event_id = %event.id))]
    async fn update(&self, event: &CalendarEvent) -> Result<(), ApplicationError> {
        let pool = Arc::clone(&self.pool);
        let event = event.clone();

        task::spawn_blocking(move || {
            let conn = pool
                .get()
                .map_err(|e| ApplicationError::Storage(e.to_string()))?;

            let affected = conn
                .execute(
                    "UPDATE calendar_events SET
                        provider = ?1, title = ?2, description = ?3,
                        start_time = ?4, end_time = ?5, location = ?6,
                        event_type = ?7, external_id = ?8,
                        updated_at = ?9, last_pushed_at = ?10
                     WHERE id = ?11 AND user_id = ?12",
                    params![
                        event.provider.map(|p| p.as_str()),
                        event.title,
                        event.description,
                        event.start_time.to_rfc3339(),
                        event.end_time.to_rfc3339(),
                        event.location,
                        event_type_to_str(event.event_type),
                        event.external_id,
                        event.updated_at.to_rfc3339(),
                        event.last_pushed_at.map(|t| t.to_rfc3339()),
                        event.id.to_string(),
                        event.user_id.to_string(),
                    ],
                )
                .map_err(|e| ApplicationError::Storage(e.to_string()))?;

            if affected == 0 {
                return Err(ApplicationError::NotFound(format!("event {}", event.id)));
            }

            debug!("Updated calendar event");
            Ok(())
        })
        .await
        .map_err(|e| ApplicationError::Internal(e.to_string()))?
    }

    #[instrument(skip(self), fields(event_id = %id))]
    async fn get(
        &self,
        user_id: UserId,
        id: &EventId,
    ) -> Result<Option<CalendarEvent>, ApplicationError> {
        let pool = Arc::clone(&self.pool);
        let id_str = id.to_string();
        let user_id_str = user_id.to_string();

        task::spawn_blocking(move || {
            let conn = pool
                .get()
                .map_err(|e| ApplicationError::Storage(e.to_string()))?;

            conn.query_row(
                &format!(
                    "SELECT {EVENT_COLUMNS} FROM calendar_events
                     WHERE id = ?1 AND user_id = ?2"
                ),
                params![id_str, user_id_str],
                row_to_event,
            )
            .optional()
            .map_err(|e| ApplicationError::Storage(e.to_string()))
        })
        .await
        .map_err(|e| ApplicationError::Internal(e.to_string()))?
    }

    #[instrument(skip(self))]
    async fn get_by_external_id(
        &self,
        user_id: UserId,
        provider: Provider,
        external_id: &str,
    ) -> Result<Option<CalendarEvent>, ApplicationError> {
        let pool = Arc::clone(&self.pool);
        let user_id_str = user_id.to_string();
        let external_id = external_id.to_string();

        task::spawn_blocking(move || {
            let conn = pool
                .get()
                .map_err(|e| ApplicationError::Storage(e.to_string()))?;

            conn.query_row(
                &format!(
                    "SELECT {EVENT_COLUMNS} FROM calendar_events
                     WHERE user_id = ?1 AND provider = ?2 AND external_id = ?3"
                ),
                params![user_id_str, provider.as_str(), external_id],
                row_to_event,
            )
            .optional()
            .map_err(|e| ApplicationError::Storage(e.to_string()))
        })
        .await
        .map_err(|e| ApplicationError::Internal(e.to_string()))?
    }

    #[instrument(skip(self))]
    async fn list_pending_push(
        &self,
        user_id: UserId,
        provider: Provider,
    ) -> Result<Vec<CalendarEvent>, ApplicationError> {
        let pool = Arc::clone(&self.pool);
        let user_id_str = user_id.to_string();

        task::spawn_blocking(move || {
            let conn = pool
                .get()
                .map_err(|e| ApplicationError::Storage(e.to_string()))?;

            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {EVENT_COLUMNS} FROM calendar_events
                     WHERE user_id = ?1
                       AND (provider IS NULL OR provider = ?2)
                       AND (last_pushed_at IS NULL OR updated_at > last_pushed_at)
                     ORDER BY created_at ASC"
                ))
                .map_err(|e| ApplicationError::Storage(e.to_string()))?;

            let events: Vec<CalendarEvent> = stmt
                .query_map(params![user_id_str, provider.as_str()], row_to_event)
                .map_err(|e| ApplicationError::Storage(e.to_string()))?
                .filter_map(Result::ok)
                .collect();

            debug!(count = events.len(), "Fetched events pending push");
            Ok(events)
        })
        .await
        .map_err(|e| ApplicationError::Internal(e.to_string()))?
    }

    #[instrument(skip(self))]
    async fn list_by_source_record(
        &self,
        user_id: UserId,
        record_id: &str,
    ) -> Result<Vec<CalendarEvent>, ApplicationError> {
        let pool = Arc::clone(&self.pool);
        let user_id_str = user_id.to_string();
        let record_id = record_id.to_string();

        task::spawn_blocking(move || {
            let conn = pool
                .get()
                .map_err(|e| ApplicationError::Storage(e.to_string()))?;

            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {EVENT_COLUMNS} FROM calendar_events
                     WHERE user_id = ?1 AND source_record_id = ?2
                     ORDER BY start_time ASC"
                ))
                .map_err(|e| ApplicationError::Storage(e.to_string()))?;

            let events: Vec<CalendarEvent> = stmt
                .query_map(params![user_id_str, record_id], row_to_event)
                .map_err(|e| ApplicationError::Storage(e.to_string()))?
                .filter_map(Result::ok)
                .collect();

            Ok(events)
        })
        .await
        .map_err(|e| ApplicationError::Internal(e.to_string()))?
    }

    #[instrument(skip(self))]
    async fn get_by_source_slot(
        &self,
        user_id: UserId,
        record_id: &str,
        slot: &str,
    ) -> Result<Option<CalendarEvent>, ApplicationError> {
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
                    "SELECT {EVENT_COLUMNS} FROM calendar_events
                     WHERE user_id = ?1 AND source_record_id = ?2 AND source_slot = ?3"
                ),
                params![user_id_str, record_id, slot],
                row_to_event,
            )
            .optional()
            .map_err(|e| ApplicationError::Storage(e.to_string()))
        })
        .await
        .map_err(|e| ApplicationError::Internal(e.to_string()))?
    }

    #[instrument(skip(self), fields(event_id = %id))]
    async fn mark_pushed(
        &self,
        user_id: UserId,
        id: &EventId,
        provider: Provider,
        external_id: &str,
        pushed_at: DateTime<Utc>,
    ) -> Result<(), ApplicationError> {
        let pool = Arc::clone(&self.pool);
        let id_str = id.to_string();
        let user_id_str = user_id.to_string();
        let external_id = external_id.to_string();

        task::spawn_blocking(move || {
            let conn = pool
                .get()
                .map_err(|e| ApplicationError::Storage(e.to_string()))?;

            // Deliberately leaves updated_at alone so a concurrent local edit
            // made during the push still counts as pending.
            let affected = conn
                .execute(
                    "UPDATE calendar_events SET
                        provider = ?1, external_id = ?2, last_pushed_at = ?3
                     WHERE id = ?4 AND user_id = ?5",
                    params![
                        provider.as_str(),
                        external_id,
                        pushed_at.to_rfc3339(),
                        id_str,
                        user_id_str,
                    ],
                )
                .map_err(|e| ApplicationError::Storage(e.to_string()))?;

            if affected == 0 {
                return Err(ApplicationError::NotFound(format!("event {id_str}")));
            }

            Ok(())
        })
        .await
        .map_err(|e| ApplicationError::Internal(e.to_string()))?
    }

    #[instrument(skip(self), fields(event_id = %id))]
    async fn delete(&self, user_id: UserId, id: &EventId) -> Result<bool, ApplicationError> {
        let pool = Arc::clone(&self.pool);
        let id_str = id.to_string();
        let user_id_str = user_id.to_string();

        task::spawn_blocking(move || {
            let conn = pool
                .get()
                .map_err(|e| ApplicationError::Storage(e.to_string()))?;

            let affected = conn
                .execute(
                    "DELETE FROM calendar_events WHERE id = ?1 AND user_id = ?2",
                    params![id_str, user_id_str],
                )
                .map_err(|e| ApplicationError::Storage(e.to_string()))?;

            debug!(deleted = affected > 0, "Deleted calendar event");
            Ok(affected > 0)
        })
        .await
        .map_err(|e| ApplicationError::Internal(e.to_string()))?
    }
}

/// Convert a database row to a `CalendarEvent` domain entity
fn row_to_event(row: &Row<'_>) -> rusqlite::Result<CalendarEvent> {
    let id_str: String = row.get(0)?;
    let user_id_str: String = row.get(1)?;
    let provider_str: Option<String> = row.get(2)?;
    let title: String = row.get(3)?;
    let description: Option<String> = row.get(4)?;
    let start_time_str: String = row.get(5)?;
    let end_time_str: String = row.get(6)?;
    let location: Option<String> = row.get(7)?;
    let event_type_str: String = row.get(8)?;
    let external_id: Option<String> = row.get(9)?;
    let source_record_id: Option<String> = row.get(10)?;
    let source_slot: Option<String> = row.get(11)?;
    let created_at_str: String = row.get(12)?;
    let updated_at_str: String = row.get(13)?;
    let last_pushed_at_str: Option<String> = row.get(14)?;

    let id = EventId::parse(&id_str).unwrap_or_else(|_| EventId::from(Uuid::new_v4()));
    let user_id = UserId::parse(&user_id_str).unwrap_or_else(|_| UserId::from(Uuid::new_v4()));
    let provider = provider_str.and_then(|s| Provider::from_str(&s).ok());

    Ok(CalendarEvent {
        id,
        user_id,
        provider,
        title,
        description,
        start_time: parse_instant(&start_time_str),
        end_time: parse_instant(&end_time_str),
        location,
        event_type: str_to_event_type(&event_type_str),
        external_id,
        source_record_id,
        source_slot,
        created_at: parse_instant(&created_at_str),
        updated_at: parse_instant(&updated_at_str),
        last_pushed_at: last_pushed_at_str.map(|s| parse_instant(&s)),
    })
}

/// Convert an `EventType` to its database string representation
const fn event_type_to_str(event_type: EventType) -> &'static str {
    match event_type {
        EventType::Deadline => "deadline",
        EventType::FollowUp => "follow_up",
        EventType::Appointment => "appointment",
        EventType::Imported => "imported",
    }
}

/// Convert a database string to an `EventType`
fn str_to_event_type(s: &str) -> EventType {
    match s {
        "deadline" => EventType::Deadline,
        "follow_up" => EventType::FollowUp,
        "appointment" => EventType::Appointment,
        _ => EventType::Imported,
    }
}
