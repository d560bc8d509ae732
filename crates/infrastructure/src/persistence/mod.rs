//! Persistence layer - SQLite storage adapters

pub mod connection;
pub mod credential_store;
pub mod event_store;
pub mod migrations;
pub mod reminder_store;

pub use connection::{ConnectionPool, DatabaseError, PooledConn, create_pool};
pub use credential_store::SqliteCredentialStore;
pub use event_store::SqliteEventStore;
pub use reminder_store::SqliteReminderStore;
