//! Application configuration
//!
//! Split into focused sub-modules:
//! - `database`: SQLite settings
//! - `providers`: per-provider OAuth and API endpoints
//! - `sync`: sweep windows, cron schedules, reminder lead times
//!
//! Values load from an optional `calsync.toml` file overlaid with
//! `CALSYNC_*` environment variables (double underscore as the section
//! separator, e.g. `CALSYNC_DATABASE__PATH`).

mod database;
mod providers;
mod sync;

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

pub use database::DatabaseConfig;
pub use providers::{GoogleAppConfig, OutlookAppConfig};
pub use sync::{ReminderAppConfig, SyncAppConfig};

/// Shared default for boolean `true` fields across config structs
pub(crate) const fn default_true() -> bool {
    true
}

/// Application environment (development or production)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Development environment
    #[default]
    Development,
    /// Production environment
    Production,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            _ => Err(format!(
                "Invalid environment: {s}. Use 'development' or 'production'"
            )),
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application environment
    #[serde(default)]
    pub environment: Environment,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Sync configuration
    #[serde(default)]
    pub sync: SyncAppConfig,

    /// Reminder configuration
    #[serde(default)]
    pub reminders: ReminderAppConfig,

    /// Backoff policy for provider calls made by the background sweeps
    #[serde(default)]
    pub retry: crate::retry::RetryConfig,

    /// Logging configuration
    #[serde(default)]
    pub telemetry: crate::telemetry::TelemetryConfig,

    /// Google Calendar configuration; absent means the provider is disabled
    #[serde(default)]
    pub google: Option<GoogleAppConfig>,

    /// Outlook configuration; absent means the provider is disabled
    #[serde(default)]
    pub outlook: Option<OutlookAppConfig>,
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns a [`config::ConfigError`] when sources fail to parse or the
    /// merged tree does not deserialize.
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from("calsync")
    }

    /// Load configuration with a custom file stem (used by tests)
    ///
    /// # Errors
    ///
    /// Returns a [`config::ConfigError`] when sources fail to parse or the
    /// merged tree does not deserialize.
    pub fn load_from(file_stem: &str) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(file_stem).required(false))
            .add_source(
                config::Environment::with_prefix("CALSYNC")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let app: Self = settings.try_deserialize()?;
        info!(
            environment = %app.environment,
            google = app.google.is_some(),
            outlook = app.outlook.is_some(),
            "configuration loaded"
        );
        Ok(app)
    }

    /// Names of providers with configuration present
    #[must_use]
    pub fn configured_providers(&self) -> Vec<&'static str> {
        let mut providers = Vec::new();
        if self.google.is_some() {
            providers.push("google");
        }
        if self.outlook.is_some() {
            providers.push("outlook");
        }
        providers
    }
}
