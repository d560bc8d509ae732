//! Sync and reminder dispatch configuration

use domain::value_objects::SyncWindow;
use serde::{Deserialize, Serialize};

use crate::scheduler::schedules;

/// Background sync settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncAppConfig {
    /// Days of remote history to pull
    #[serde(default = "default_days_back")]
    pub days_back: i64,

    /// Days of upcoming remote events to pull
    #[serde(default = "default_days_forward")]
    pub days_forward: i64,

    /// Cron expression for the sync sweep
    #[serde(default = "default_sync_cron")]
    pub sweep_cron: String,

    /// Access token refresh margin in seconds
    #[serde(default = "default_refresh_margin")]
    pub refresh_margin_secs: i64,
}

const fn default_days_back() -> i64 {
    90
}

const fn default_days_forward() -> i64 {
    180
}

fn default_sync_cron() -> String {
    schedules::EVERY_15_MINUTES.to_string()
}

const fn default_refresh_margin() -> i64 {
    300
}

impl Default for SyncAppConfig {
    fn default() -> Self {
        Self {
            days_back: default_days_back(),
            days_forward: default_days_forward(),
            sweep_cron: default_sync_cron(),
            refresh_margin_secs: default_refresh_margin(),
        }
    }
}

impl SyncAppConfig {
    /// The pull window as a domain value
    #[must_use]
    pub const fn window(&self) -> SyncWindow {
        SyncWindow::new(self.days_back, self.days_forward)
    }
}

/// Reminder projection and dispatch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderAppConfig {
    /// How far ahead of a record date the derived reminder fires, in hours
    #[serde(default = "default_lead_hours")]
    pub lead_hours: i64,

    /// Duration assigned to derived events, in minutes
    #[serde(default = "default_event_duration")]
    pub event_duration_minutes: i64,

    /// Cron expression for the dispatch scan
    #[serde(default = "default_dispatch_cron")]
    pub dispatch_cron: String,
}

const fn default_lead_hours() -> i64 {
    24
}

const fn default_event_duration() -> i64 {
    60
}

fn default_dispatch_cron() -> String {
    schedules::EVERY_MINUTE.to_string()
}

impl Default for ReminderAppConfig {
    fn default() -> Self {
        Self {
            lead_hours: default_lead_hours(),
            event_duration_minutes: default_event_duration(),
            dispatch_cron: default_dispatch_cron(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn sync_defaults() {
        let config = SyncAppConfig::default();
        assert_eq!(config.days_back, 90);
        assert_eq!(config.days_forward, 180);
        assert_eq!(config.refresh_margin_secs, 300);
    }

    #[test]
    fn window_reflects_spans() {
        let config = SyncAppConfig {
            days_back: 7,
            days_forward: 14,
            ..Default::default()
        };
        let now = Utc::now();
        let (start, end) = config.window().bounds(now);
        assert_eq!(now - start, chrono::Duration::days(7));
        assert_eq!(end - now, chrono::Duration::days(14));
    }

    #[test]
    fn reminder_defaults() {
        let config = ReminderAppConfig::default();
        assert_eq!(config.lead_hours, 24);
        assert_eq!(config.event_duration_minutes, 60);
        assert_eq!(config.dispatch_cron, schedules::EVERY_MINUTE);
    }
}
