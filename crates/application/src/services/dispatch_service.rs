//! Dispatch service - at-most-once delivery of due reminders

use std::sync::Arc;

use chrono::{DateTime, Utc};
use domain::value_objects::{ReminderId, UserId};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::error::ApplicationError;
use crate::ports::{NotifierPort, ReminderStorePort};

/// One failed delivery within a dispatch scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchError {
    /// Reminder whose delivery failed
    pub reminder_id: ReminderId,
    /// Human-readable failure description
    pub message: String,
}

/// Outcome of one dispatch scan
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchReport {
    /// Reminders claimed and handed to the notifier
    pub processed: u32,
    /// Reminders skipped because another scan claimed them first
    pub skipped: u32,
    /// Delivery failures (the reminder stays sent regardless)
    pub errors: Vec<DispatchError>,
}

/// Scans for due reminders and fires their side effect at most once
///
/// The claim is a conditional storage update, so two overlapping scans over
/// the same due set cannot both deliver the same reminder. Delivery failures
/// after a successful claim do not re-arm the reminder; losing a notification
/// is preferred over duplicating one.
pub struct DispatchService<R: ReminderStorePort> {
    reminders: Arc<R>,
    notifier: Arc<dyn NotifierPort>,
}

impl<R: ReminderStorePort> DispatchService<R> {
    /// Create a new dispatch service
    #[must_use]
    pub fn new(reminders: Arc<R>, notifier: Arc<dyn NotifierPort>) -> Self {
        Self {
            reminders,
            notifier,
        }
    }

    /// Claim and deliver every reminder due at `now`
    ///
    /// # Errors
    ///
    /// Returns an error only when the due listing itself fails; per-reminder
    /// failures are collected in the report.
    #[instrument(skip(self))]
    pub async fn dispatch_due(&self, now: DateTime<Utc>) -> Result<DispatchReport, ApplicationError> {
        let due = self.reminders.list_due(now).await?;
        let mut report = DispatchReport::default();

        for reminder in due {
            match self.reminders.claim_sent(&reminder.id, now).await {
                Ok(true) => {
                    report.processed += 1;
                    if let Err(err) = self.notifier.notify(&reminder).await {
                        warn!(reminder_id = %reminder.id, error = %err, "delivery failed");
                        report.errors.push(DispatchError {
                            reminder_id: reminder.id,
                            message: err.to_string(),
                        });
                    }
                }
                Ok(false) => {
                    // Another scan got there first.
                    report.skipped += 1;
                }
                Err(err) => {
                    warn!(reminder_id = %reminder.id, error = %err, "claim failed");
                    report.errors.push(DispatchError {
                        reminder_id: reminder.id,
                        message: err.to_string(),
                    });
                }
            }
        }

        if report.processed > 0 || !report.errors.is_empty() {
            info!(
                processed = report.processed,
                skipped = report.skipped,
                errors = report.errors.len(),
                "dispatch scan finished"
            );
        }
        Ok(report)
    }

    /// Dismiss a reminder so it is never dispatched
    ///
    /// Dismissing an already-sent reminder is allowed and simply marks it.
    ///
    /// # Errors
    ///
    /// Returns [`ApplicationError::NotFound`] when the reminder does not
    /// exist for this user.
    #[instrument(skip(self))]
    pub async fn dismiss(
        &self,
        user_id: UserId,
        reminder_id: &ReminderId,
    ) -> Result<(), ApplicationError> {
        let existed = self.reminders.dismiss(user_id, reminder_id).await?;
        if !existed {
            return Err(ApplicationError::NotFound(format!(
                "reminder {reminder_id}"
            )));
        }
        Ok(())
    }
}
