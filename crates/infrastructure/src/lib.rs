//! Infrastructure layer - Adapters for external systems
//!
//! Implements ports defined in the application layer: SQLite persistence,
//! the sweep scheduler, retry, configuration, and logging.

pub mod adapters;
pub mod config;
pub mod persistence;
pub mod retry;
pub mod scheduled_tasks;
pub mod scheduler;
pub mod telemetry;

pub use adapters::LogNotifier;
pub use config::{
    AppConfig, DatabaseConfig, Environment, GoogleAppConfig, OutlookAppConfig, ReminderAppConfig,
    SyncAppConfig,
};
pub use persistence::{
    ConnectionPool, SqliteCredentialStore, SqliteEventStore, SqliteReminderStore, create_pool,
};
pub use retry::{RetryConfig, Retryable, with_retry};
pub use scheduled_tasks::{
    DISPATCH_SCAN_TASK, SYNC_SWEEP_TASK, create_dispatch_scan_task, create_sync_sweep_task,
};
pub use scheduler::{SchedulerConfig, SchedulerError, SweepEvent, SweepScheduler, SweepStats};
pub use telemetry::{TelemetryConfig, init_telemetry};
