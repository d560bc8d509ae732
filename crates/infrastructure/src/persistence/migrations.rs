//! Database migrations
//!
//! Manages database schema versioning. Migration SQL is embedded in this
//! module; bump `SCHEMA_VERSION`, add a `migrate_vX` function and call it
//! from `run_migrations` when the schema grows.
//!
//! Rollbacks are manual: fix the underlying issue, repair the database if
//! needed, and re-run.

use rusqlite::Connection;
use tracing::{debug, error, info};

use super::connection::DatabaseError;

/// Current schema version
const SCHEMA_VERSION: i32 = 1;

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    let current_version = get_schema_version(conn)?;

    if current_version < SCHEMA_VERSION {
        info!(
            from_version = current_version,
            to_version = SCHEMA_VERSION,
            "Running database migrations"
        );

        if current_version < 1 {
            if let Err(e) = migrate_v1(conn) {
                error!(version = 1, error = %e, "Migration V001 (initial schema) failed");
                return Err(e);
            }
        }

        set_schema_version(conn, SCHEMA_VERSION)?;
        info!(version = SCHEMA_VERSION, "Database migrations complete");
    } else {
        debug!(version = current_version, "Database schema is up to date");
    }

    Ok(())
}

/// Get current schema version
fn get_schema_version(conn: &Connection) -> Result<i32, DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        [],
    )?;

    let version: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    Ok(version)
}

/// Set schema version
fn set_schema_version(conn: &Connection, version: i32) -> Result<(), DatabaseError> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

/// Migration to version 1: Initial schema
fn migrate_v1(conn: &Connection) -> Result<(), DatabaseError> {
    debug!("Applying migration V001: Initial schema");

    conn.execute_batch(
        "
        -- Provider OAuth credentials, one row per (user, provider)
        CREATE TABLE IF NOT EXISTS credentials (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            provider TEXT NOT NULL CHECK(provider IN ('google', 'outlook')),
            access_token TEXT NOT NULL,
            refresh_token TEXT NOT NULL,
            expires_at TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        -- Local calendar events, possibly bound to a provider copy
        CREATE TABLE IF NOT EXISTS calendar_events (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            provider TEXT CHECK(provider IN ('google', 'outlook')),
            title TEXT NOT NULL,
            description TEXT,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            location TEXT,
            event_type TEXT NOT NULL CHECK(event_type IN ('deadline', 'follow_up', 'appointment', 'imported')),
            external_id TEXT,
            source_record_id TEXT,
            source_slot TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            last_pushed_at TEXT
        );

        -- Dispatchable reminders
        CREATE TABLE IF NOT EXISTS reminders (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            linked_record_id TEXT NOT NULL,
            slot TEXT,
            title TEXT NOT NULL,
            due_at TEXT NOT NULL,
            is_sent INTEGER NOT NULL DEFAULT 0,
            sent_at TEXT,
            is_dismissed INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        -- One credential per (user, provider); connect replaces via upsert
        CREATE UNIQUE INDEX IF NOT EXISTS ux_credentials_user_provider
            ON credentials(user_id, provider);

        -- external_id is the merge key within a provider
        CREATE UNIQUE INDEX IF NOT EXISTS ux_events_provider_external
            ON calendar_events(provider, external_id)
            WHERE external_id IS NOT NULL;

        -- One derived event/reminder per record slot
        CREATE UNIQUE INDEX IF NOT EXISTS ux_events_record_slot
            ON calendar_events(user_id, source_record_id, source_slot)
            WHERE source_record_id IS NOT NULL;
        CREATE UNIQUE INDEX IF NOT EXISTS ux_reminders_record_slot
            ON reminders(user_id, linked_record_id, slot)
            WHERE slot IS NOT NULL;

        CREATE INDEX IF NOT EXISTS idx_events_user ON calendar_events(user_id);
        CREATE INDEX IF NOT EXISTS idx_events_source_record ON calendar_events(user_id, source_record_id);
        CREATE INDEX IF NOT EXISTS idx_reminders_due ON reminders(is_sent, is_dismissed, due_at);
        CREATE INDEX IF NOT EXISTS idx_reminders_record ON reminders(user_id, linked_record_id);
        ",
    )?;

    Ok(())
}
