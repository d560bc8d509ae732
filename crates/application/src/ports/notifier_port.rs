//! Notifier port - delivery channel for dispatched reminders

use async_trait::async_trait;
use domain::entities::Reminder;
#[cfg(test)]
use mockall::automock;

use crate::error::ApplicationError;

/// Port for delivering a reminder to the user
///
/// Called only after the dispatcher has claimed the reminder; a delivery
/// failure is recorded but never re-arms the reminder.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NotifierPort: Send + Sync {
    /// Deliver one reminder
    async fn notify(&self, reminder: &Reminder) -> Result<(), ApplicationError>;
}
