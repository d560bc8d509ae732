//! Log-backed reminder notifier
//!
//! Default delivery channel: writes each dispatched reminder to the
//! structured log. Deployments wanting push or email delivery swap in
//! another [`NotifierPort`] implementation.

use application::{error::ApplicationError, ports::NotifierPort};
use async_trait::async_trait;
use domain::entities::Reminder;
use tracing::{info, instrument};

/// Notifier that emits reminders as log records
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

impl LogNotifier {
    /// Create a new log notifier
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NotifierPort for LogNotifier {
    #[instrument(skip(self, reminder), fields(reminder_id = %reminder.id))]
    async fn notify(&self, reminder: &Reminder) -> Result<(), ApplicationError> {
        info!(
            user_id = %reminder.user_id,
            record_id = %reminder.linked_record_id,
            due_at = %reminder.due_at,
            title = %reminder.title,
            "reminder due"
        );
        Ok(())
    }
}
