//! Cron-based scheduler for recurring background sweeps
//!
//! Drives the two periodic jobs of this service: the calendar sync sweep
//! and the reminder dispatch sweep. Uses `tokio-cron-scheduler` for
//! cron-based scheduling.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

/// Scheduler errors
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Invalid cron expression
    #[error("Invalid cron expression: {0}")]
    InvalidCronExpression(String),

    /// Task not found
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// Internal scheduler error
    #[error("Internal scheduler error: {0}")]
    Internal(String),
}

impl From<JobSchedulerError> for SchedulerError {
    fn from(err: JobSchedulerError) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Statistics for a scheduled sweep
#[derive(Debug, Clone)]
pub struct SweepStats {
    /// Task name
    pub name: String,
    /// Cron expression
    pub cron_expression: String,
    /// Number of successful runs
    pub success_count: u64,
    /// Number of failed runs
    pub failure_count: u64,
    /// Last run time
    pub last_run: Option<DateTime<Utc>>,
    /// Last error message
    pub last_error: Option<String>,
}

/// Internal task metadata
struct TaskMetadata {
    name: String,
    cron_expression: String,
    job_id: Uuid,
    success_count: AtomicU64,
    failure_count: AtomicU64,
    last_run: RwLock<Option<DateTime<Utc>>>,
    last_error: RwLock<Option<String>>,
}

impl TaskMetadata {
    fn new(name: String, cron_expression: String, job_id: Uuid) -> Self {
        Self {
            name,
            cron_expression,
            job_id,
            success_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            last_run: RwLock::new(None),
            last_error: RwLock::new(None),
        }
    }

    fn to_stats(&self) -> SweepStats {
        SweepStats {
            name: self.name.clone(),
            cron_expression: self.cron_expression.clone(),
            success_count: self.success_count.load(Ordering::Relaxed),
            failure_count: self.failure_count.load(Ordering::Relaxed),
            last_run: *self.last_run.read(),
            last_error: self.last_error.read().clone(),
        }
    }

    fn record_success(&self) {
        self.success_count.fetch_add(1, Ordering::Relaxed);
        *self.last_run.write() = Some(Utc::now());
    }

    fn record_failure(&self, error: String) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
        *self.last_run.write() = Some(Utc::now());
        *self.last_error.write() = Some(error);
    }
}

/// Completion event sent to the event channel after each run
#[derive(Debug, Clone)]
pub struct SweepEvent {
    /// Task name
    pub task_name: String,
    /// Whether the run succeeded
    pub success: bool,
    /// Error message if failed
    pub error: Option<String>,
    /// Run duration in milliseconds
    pub duration_ms: u64,
    /// When the run completed
    pub completed_at: DateTime<Utc>,
}

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Whether to start the scheduler immediately
    pub auto_start: bool,
    /// Event buffer size
    pub event_buffer_size: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            auto_start: true,
            event_buffer_size: 100,
        }
    }
}

/// Predefined cron expressions (6 fields: sec min hour day month weekday)
pub mod schedules {
    /// Every minute
    pub const EVERY_MINUTE: &str = "0 * * * * *";
    /// Every 5 minutes
    pub const EVERY_5_MINUTES: &str = "0 */5 * * * *";
    /// Every 15 minutes
    pub const EVERY_15_MINUTES: &str = "0 */15 * * * *";
    /// Every hour
    pub const HOURLY: &str = "0 0 * * * *";
}

/// Scheduler for recurring background sweeps
pub struct SweepScheduler {
    scheduler: AsyncMutex<JobScheduler>,
    tasks: Arc<RwLock<HashMap<String, Arc<TaskMetadata>>>>,
    running: Arc<AtomicBool>,
    event_tx: mpsc::Sender<SweepEvent>,
    event_rx: Arc<RwLock<Option<mpsc::Receiver<SweepEvent>>>>,
}

impl std::fmt::Debug for SweepScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SweepScheduler")
            .field("running", &self.running.load(Ordering::Relaxed))
            .field("task_count", &self.tasks.read().len())
            .finish_non_exhaustive()
    }
}

impl SweepScheduler {
    /// Create a new scheduler
    #[instrument(skip_all)]
    pub async fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        let scheduler = JobScheduler::new().await?;
        let (event_tx, event_rx) = mpsc::channel(config.event_buffer_size);

        let instance = Self {
            scheduler: AsyncMutex::new(scheduler),
            tasks: Arc::new(RwLock::new(HashMap::new())),
            running: Arc::new(AtomicBool::new(false)),
            event_tx,
            event_rx: Arc::new(RwLock::new(Some(event_rx))),
        };

        if config.auto_start {
            instance.start().await?;
        }

        info!("Sweep scheduler initialized");
        Ok(instance)
    }

    /// Start the scheduler
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<(), SchedulerError> {
        if self.running.load(Ordering::Relaxed) {
            debug!("Scheduler already running");
            return Ok(());
        }

        self.scheduler.lock().await.start().await?;
        self.running.store(true, Ordering::Relaxed);
        info!("Sweep scheduler started");
        Ok(())
    }

    /// Stop the scheduler gracefully
    ///
    /// `tokio-cron-scheduler` does not support restart after shutdown;
    /// create a new scheduler instead.
    #[instrument(skip(self))]
    pub async fn stop(&self) -> Result<(), SchedulerError> {
        if !self.running.load(Ordering::Relaxed) {
            debug!("Scheduler already stopped");
            return Ok(());
        }

        self.scheduler.lock().await.shutdown().await?;
        self.running.store(false, Ordering::Relaxed);
        info!("Sweep scheduler stopped");
        Ok(())
    }

    /// Check if the scheduler is running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Take the event receiver (can only be called once)
    pub fn take_event_receiver(&self) -> Option<mpsc::Receiver<SweepEvent>> {
        self.event_rx.write().take()
    }

    /// Add a recurring sweep
    ///
    /// The task future reports failure as a string; the scheduler records
    /// outcomes and forwards a [`SweepEvent`] per run.
    #[instrument(skip(self, task))]
    pub async fn add_task<F, Fut>(
        &self,
        name: &str,
        cron_expression: &str,
        task: F,
    ) -> Result<(), SchedulerError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), String>> + Send + 'static,
    {
        cron_expression.parse::<cron::Schedule>().map_err(|e| {
            SchedulerError::InvalidCronExpression(format!("{cron_expression}: {e}"))
        })?;

        let task_name = name.to_string();
        let tasks = Arc::clone(&self.tasks);
        let event_tx = self.event_tx.clone();

        let job = Job::new_async(cron_expression, move |_uuid, _lock| {
            let name = task_name.clone();
            let tasks = Arc::clone(&tasks);
            let event_tx = event_tx.clone();
            let task_future = task();

            Box::pin(async move {
                debug!(task = %name, "Starting scheduled sweep");
                let start = std::time::Instant::now();
                let result = task_future.await;
                let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

                let (success, error) = match result {
                    Ok(()) => {
                        if let Some(metadata) = tasks.read().get(&name) {
                            metadata.record_success();
                        }
                        info!(task = %name, duration_ms, "Sweep completed");
                        (true, None)
                    }
                    Err(e) => {
                        if let Some(metadata) = tasks.read().get(&name) {
                            metadata.record_failure(e.clone());
                        }
                        error!(task = %name, error = %e, duration_ms, "Sweep failed");
                        (false, Some(e))
                    }
                };

                let _ = event_tx.try_send(SweepEvent {
                    task_name: name,
                    success,
                    error,
                    duration_ms,
                    completed_at: Utc::now(),
                });
            })
        })
        .map_err(|e| SchedulerError::InvalidCronExpression(e.to_string()))?;

        let job_id = job.guid();
        self.scheduler.lock().await.add(job).await?;

        let metadata = Arc::new(TaskMetadata::new(
            name.to_string(),
            cron_expression.to_string(),
            job_id,
        ));
        self.tasks.write().insert(name.to_string(), metadata);

        info!(task = %name, cron = %cron_expression, "Sweep scheduled");
        Ok(())
    }

    /// Remove a scheduled sweep
    #[instrument(skip(self))]
    pub async fn remove_task(&self, name: &str) -> Result<(), SchedulerError> {
        let metadata = self
            .tasks
            .write()
            .remove(name)
            .ok_or_else(|| SchedulerError::TaskNotFound(name.to_string()))?;

        self.scheduler.lock().await.remove(&metadata.job_id).await?;
        info!(task = %name, "Sweep removed");
        Ok(())
    }

    /// Get statistics for a specific sweep
    #[must_use]
    pub fn get_task_stats(&self, name: &str) -> Option<SweepStats> {
        self.tasks.read().get(name).map(|m| m.to_stats())
    }

    /// Get statistics for all sweeps
    #[must_use]
    pub fn get_all_stats(&self) -> Vec<SweepStats> {
        self.tasks.read().values().map(|m| m.to_stats()).collect()
    }

    /// List all scheduled sweep names
    #[must_use]
    pub fn list_tasks(&self) -> Vec<String> {
        self.tasks.read().keys().cloned().collect()
    }

    /// Number of scheduled sweeps
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.tasks.read().len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use tokio::time::sleep;

    use super::*;

    #[tokio::test]
    async fn scheduler_creation_without_autostart() {
        let config = SchedulerConfig {
            auto_start: false,
            ..Default::default()
        };
        let scheduler = SweepScheduler::new(config).await.unwrap();
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn scheduler_start_stop() {
        let scheduler = SweepScheduler::new(SchedulerConfig::default())
            .await
            .unwrap();
        assert!(scheduler.is_running());

        scheduler.stop().await.unwrap();
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn add_and_remove_task() {
        let scheduler = SweepScheduler::new(SchedulerConfig::default())
            .await
            .unwrap();

        scheduler
            .add_task("sync-sweep", schedules::HOURLY, || async { Ok(()) })
            .await
            .unwrap();
        assert_eq!(scheduler.task_count(), 1);
        assert!(scheduler.list_tasks().contains(&"sync-sweep".to_string()));

        scheduler.remove_task("sync-sweep").await.unwrap();
        assert_eq!(scheduler.task_count(), 0);

        scheduler.stop().await.unwrap();
    }

    #[tokio::test]
    async fn invalid_cron_expression_rejected() {
        let scheduler = SweepScheduler::new(SchedulerConfig::default())
            .await
            .unwrap();

        let result = scheduler
            .add_task("bad", "not a cron", || async { Ok(()) })
            .await;
        assert!(matches!(
            result,
            Err(SchedulerError::InvalidCronExpression(_))
        ));

        scheduler.stop().await.unwrap();
    }

    #[tokio::test]
    async fn remove_nonexistent_task_errors() {
        let scheduler = SweepScheduler::new(SchedulerConfig::default())
            .await
            .unwrap();

        let result = scheduler.remove_task("nope").await;
        assert!(matches!(result, Err(SchedulerError::TaskNotFound(_))));

        scheduler.stop().await.unwrap();
    }

    #[tokio::test]
    async fn task_executes_and_records_success() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);

        let scheduler = SweepScheduler::new(SchedulerConfig::default())
            .await
            .unwrap();

        scheduler
            .add_task("counter", "* * * * * *", move || {
                let counter = Arc::clone(&counter_clone);
                async move {
                    counter.fetch_add(1, Ordering::Relaxed);
                    Ok(())
                }
            })
            .await
            .unwrap();

        sleep(Duration::from_secs(2)).await;

        assert!(counter.load(Ordering::Relaxed) >= 1);
        let stats = scheduler.get_task_stats("counter").unwrap();
        assert!(stats.success_count >= 1);
        assert_eq!(stats.failure_count, 0);

        scheduler.stop().await.unwrap();
    }

    #[tokio::test]
    async fn failing_task_records_error() {
        let scheduler = SweepScheduler::new(SchedulerConfig::default())
            .await
            .unwrap();

        scheduler
            .add_task("failing", "* * * * * *", || async {
                Err("provider unreachable".to_string())
            })
            .await
            .unwrap();

        sleep(Duration::from_secs(2)).await;

        let stats = scheduler.get_task_stats("failing").unwrap();
        assert!(stats.failure_count >= 1);
        assert_eq!(stats.last_error.as_deref(), Some("provider unreachable"));

        scheduler.stop().await.unwrap();
    }

    #[tokio::test]
    async fn event_receiver_sees_completions() {
        let scheduler = SweepScheduler::new(SchedulerConfig::default())
            .await
            .unwrap();

        let mut receiver = scheduler.take_event_receiver().unwrap();
        assert!(scheduler.take_event_receiver().is_none());

        scheduler
            .add_task("evented", "* * * * * *", || async { Ok(()) })
            .await
            .unwrap();

        let event = tokio::time::timeout(Duration::from_secs(3), receiver.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.task_name, "evented");
        assert!(event.success);

        scheduler.stop().await.unwrap();
    }

    #[test]
    fn predefined_schedules_parse() {
        for expr in [
            schedules::EVERY_MINUTE,
            schedules::EVERY_5_MINUTES,
            schedules::EVERY_15_MINUTES,
            schedules::HOURLY,
        ] {
            assert!(expr.parse::<cron::Schedule>().is_ok(), "{expr}");
        }
    }

    #[tokio::test]
    async fn all_stats_cover_every_task() {
        let scheduler = SweepScheduler::new(SchedulerConfig::default())
            .await
            .unwrap();

        scheduler
            .add_task("a", schedules::HOURLY, || async { Ok(()) })
            .await
            .unwrap();
        scheduler
            .add_task("b", schedules::EVERY_15_MINUTES, || async { Ok(()) })
            .await
            .unwrap();

        assert_eq!(scheduler.get_all_stats().len(), 2);
        assert!(scheduler.get_task_stats("c").is_none());

        scheduler.stop().await.unwrap();
    }
}
