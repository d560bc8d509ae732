//! Factory functions for the recurring background sweeps
//!
//! Pre-built task closures for the scheduler to run:
//! - Calendar sync sweep (every 15 minutes by default)
//! - Reminder dispatch scan (every minute by default)

use std::sync::Arc;

use application::{
    ports::{CredentialStorePort, EventStorePort, ReminderStorePort},
    services::{DispatchService, SyncService},
};
use chrono::Utc;
use futures::future::BoxFuture;
use tracing::{debug, error, info, warn};

use crate::retry::{RetryConfig, with_retry};

/// Task name for the calendar sync sweep
pub const SYNC_SWEEP_TASK: &str = "sync_sweep";
/// Task name for the reminder dispatch scan
pub const DISPATCH_SCAN_TASK: &str = "dispatch_scan";

/// Create the calendar sync sweep task closure
///
/// Walks every active credential, pushing local changes and pulling remote
/// ones. Transient failures of the whole sweep are retried with backoff;
/// per-item failures are already folded into the sync reports.
pub fn create_sync_sweep_task<C, E>(
    sync_service: Arc<SyncService<C, E>>,
    retry_config: RetryConfig,
) -> impl Fn() -> BoxFuture<'static, Result<(), String>> + Send + Sync + 'static
where
    C: CredentialStorePort + 'static,
    E: EventStorePort + 'static,
{
    move || {
        let service = Arc::clone(&sync_service);
        let retry_config = retry_config.clone();

        Box::pin(async move {
            debug!("Starting calendar sync sweep");

            let outcomes = with_retry(&retry_config, || service.sync_all())
                .await
                .map_err(|e| {
                    error!(error = %e, "Sync sweep failed");
                    format!("Sync sweep failed: {e}")
                })?;

            let mut pushed = 0;
            let mut pulled = 0;
            let mut failed = 0;
            for outcome in &outcomes {
                pushed += outcome.report.pushed;
                pulled += outcome.report.pulled;
                failed += outcome.report.errors.len();
                if !outcome.report.is_clean() {
                    warn!(
                        user_id = %outcome.user_id,
                        provider = %outcome.provider,
                        errors = outcome.report.errors.len(),
                        "Sync completed with item failures"
                    );
                }
            }

            info!(
                credentials = outcomes.len(),
                pushed, pulled, failed, "Calendar sync sweep completed"
            );
            Ok(())
        })
    }
}

/// Create the reminder dispatch scan task closure
///
/// Claims and delivers due reminders. Failed deliveries are logged and
/// never re-armed, so the scan itself only fails on storage errors.
pub fn create_dispatch_scan_task<R>(
    dispatch_service: Arc<DispatchService<R>>,
) -> impl Fn() -> BoxFuture<'static, Result<(), String>> + Send + Sync + 'static
where
    R: ReminderStorePort + 'static,
{
    move || {
        let service = Arc::clone(&dispatch_service);

        Box::pin(async move {
            debug!("Scanning for due reminders");

            match service.dispatch_due(Utc::now()).await {
                Ok(report) => {
                    if report.processed > 0 || !report.errors.is_empty() {
                        info!(
                            processed = report.processed,
                            skipped = report.skipped,
                            failed = report.errors.len(),
                            "Reminder dispatch scan completed"
                        );
                    } else {
                        debug!("No due reminders");
                    }
                    Ok(())
                }
                Err(e) => {
                    error!(error = %e, "Reminder dispatch scan failed");
                    Err(format!("Dispatch scan failed: {e}"))
                }
            }
        })
    }
}
