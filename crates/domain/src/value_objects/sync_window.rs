//! Bounded time window for provider synchronization

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A bounded window around "now" for pulling provider events
///
/// The pull direction of sync is bounded to avoid unbounded local growth and
/// provider API quota exhaustion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncWindow {
    /// How many days into the past to sync
    pub days_back: i64,
    /// How many days into the future to sync
    pub days_forward: i64,
}

impl SyncWindow {
    /// Create a new sync window
    #[must_use]
    pub const fn new(days_back: i64, days_forward: i64) -> Self {
        Self {
            days_back,
            days_forward,
        }
    }

    /// Compute the concrete (start, end) bounds around a reference instant
    #[must_use]
    pub fn bounds(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        (
            now - Duration::days(self.days_back.max(0)),
            now + Duration::days(self.days_forward.max(0)),
        )
    }

    /// Check whether an instant falls inside the window
    #[must_use]
    pub fn contains(&self, now: DateTime<Utc>, instant: DateTime<Utc>) -> bool {
        let (start, end) = self.bounds(now);
        instant >= start && instant <= end
    }
}

impl Default for SyncWindow {
    /// Roughly three months back, six months forward
    fn default() -> Self {
        Self::new(90, 180)
    }
}
