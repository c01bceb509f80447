//! Sync coordinator
//!
//! Owns the scheduling policy for the two sync jobs so callers never
//! duplicate it: periodic runs on a shared interval with a flex-window
//! jitter, coalesced immediate triggers, per-kind overlap protection,
//! and exponential backoff on retryable outcomes.

use super::{DownloadReconciler, SyncOutcome, UploadDispatcher};
use crate::config;
use crate::error::{AppError, Result};
use crate::remote::RemoteApi;
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, Notify, RwLock};
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

/// Cheap, cloneable trigger handle for UI collaborators.
///
/// Triggers are coalesced: `Notify` holds at most one permit, so a new
/// request while one is already queued replaces it instead of stacking.
/// A run that has already started always completes.
#[derive(Clone)]
pub struct SyncHandle {
    reconcile: Arc<Notify>,
    upload: Arc<Notify>,
}

impl SyncHandle {
    pub fn new() -> Self {
        Self {
            reconcile: Arc::new(Notify::new()),
            upload: Arc::new(Notify::new()),
        }
    }

    /// Request an immediate server → store reconcile
    pub fn trigger_reconcile(&self) {
        self.reconcile.notify_one();
    }

    /// Request an immediate drain of pending local mutations
    pub fn trigger_upload(&self) {
        self.upload.notify_one();
    }
}

impl Default for SyncHandle {
    fn default() -> Self {
        Self::new()
    }
}

pub struct SyncCoordinator<A: RemoteApi> {
    scheduler: Arc<RwLock<JobScheduler>>,
    reconciler: Arc<DownloadReconciler<A>>,
    dispatcher: Arc<UploadDispatcher<A>>,
    handle: SyncHandle,
    job_ids: Arc<RwLock<Vec<Uuid>>>,
    // One lock per job kind: a periodic run and an immediate run of the
    // same kind never overlap; different kinds run freely in parallel.
    reconcile_lock: Arc<Mutex<()>>,
    upload_lock: Arc<Mutex<()>>,
    auth_required: watch::Sender<bool>,
}

impl<A: RemoteApi + 'static> SyncCoordinator<A> {
    pub async fn new(
        reconciler: DownloadReconciler<A>,
        dispatcher: UploadDispatcher<A>,
    ) -> Result<Self> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::Scheduler(format!("Failed to create scheduler: {}", e)))?;

        let (auth_required, _) = watch::channel(false);

        Ok(Self {
            scheduler: Arc::new(RwLock::new(scheduler)),
            reconciler: Arc::new(reconciler),
            dispatcher: Arc::new(dispatcher),
            handle: SyncHandle::new(),
            job_ids: Arc::new(RwLock::new(Vec::new())),
            reconcile_lock: Arc::new(Mutex::new(())),
            upload_lock: Arc::new(Mutex::new(())),
            auth_required,
        })
    }

    /// Trigger handle for capture/edit surfaces and "sync now" actions
    pub fn handle(&self) -> SyncHandle {
        self.handle.clone()
    }

    /// Observe whether the last cycle ended in an authentication failure.
    /// Raised on a fatal 401 outcome, lowered by the next successful run.
    pub fn auth_required(&self) -> watch::Receiver<bool> {
        self.auth_required.subscribe()
    }

    /// Start the scheduler and the immediate-trigger workers
    pub async fn start(&self) -> Result<()> {
        {
            let scheduler = self.scheduler.read().await;
            scheduler
                .start()
                .await
                .map_err(|e| AppError::Scheduler(format!("Failed to start scheduler: {}", e)))?;
        }

        let reconciler = Arc::clone(&self.reconciler);
        self.spawn_immediate_worker(
            "reconcile",
            Arc::clone(&self.handle.reconcile),
            Arc::clone(&self.reconcile_lock),
            move || {
                let reconciler = Arc::clone(&reconciler);
                async move { reconciler.run().await }
            },
        );

        let dispatcher = Arc::clone(&self.dispatcher);
        self.spawn_immediate_worker(
            "upload",
            Arc::clone(&self.handle.upload),
            Arc::clone(&self.upload_lock),
            move || {
                let dispatcher = Arc::clone(&dispatcher);
                async move { dispatcher.run().await }
            },
        );

        tracing::info!("Sync coordinator started");
        Ok(())
    }

    fn spawn_immediate_worker<F, Fut>(
        &self,
        name: &'static str,
        notify: Arc<Notify>,
        lock: Arc<Mutex<()>>,
        runner: F,
    ) where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<SyncOutcome>> + Send + 'static,
    {
        let auth_required = self.auth_required.clone();

        tokio::spawn(async move {
            loop {
                notify.notified().await;
                let _guard = lock.lock().await;
                tracing::debug!("Immediate {} triggered", name);
                run_with_backoff(name, &runner, &auth_required).await;
            }
        });
    }

    /// Register (or re-register) both periodic jobs on the given interval.
    /// Any previously scheduled pair is cancelled first, so changing the
    /// interval never leaves a stale schedule behind.
    pub async fn schedule_periodic(&self, interval_minutes: u64) -> Result<()> {
        let interval = interval_minutes.max(config::MIN_SYNC_INTERVAL_MINUTES);
        let flex_secs = flex_minutes(interval) * 60;
        let cron = interval_to_cron(interval);

        self.cancel_periodic().await?;

        let reconciler = Arc::clone(&self.reconciler);
        let reconcile_job = build_job(
            cron.clone(),
            flex_secs,
            "reconcile",
            Arc::clone(&self.reconcile_lock),
            self.auth_required.clone(),
            move || {
                let reconciler = Arc::clone(&reconciler);
                async move { reconciler.run().await }
            },
        )?;

        let dispatcher = Arc::clone(&self.dispatcher);
        let upload_job = build_job(
            cron.clone(),
            flex_secs,
            "upload",
            Arc::clone(&self.upload_lock),
            self.auth_required.clone(),
            move || {
                let dispatcher = Arc::clone(&dispatcher);
                async move { dispatcher.run().await }
            },
        )?;

        let ids = vec![reconcile_job.guid(), upload_job.guid()];

        {
            let scheduler = self.scheduler.write().await;
            for job in [reconcile_job, upload_job] {
                scheduler
                    .add(job)
                    .await
                    .map_err(|e| AppError::Scheduler(format!("Failed to schedule job: {}", e)))?;
            }
        }

        *self.job_ids.write().await = ids;

        tracing::info!(
            "Periodic sync scheduled every {} min (flex {} min, cron {})",
            interval,
            flex_minutes(interval),
            cron
        );
        Ok(())
    }

    /// Cancel both periodic jobs if scheduled
    pub async fn cancel_periodic(&self) -> Result<()> {
        let mut ids = self.job_ids.write().await;
        if ids.is_empty() {
            return Ok(());
        }

        let scheduler = self.scheduler.write().await;
        for id in ids.drain(..) {
            scheduler
                .remove(&id)
                .await
                .map_err(|e| AppError::Scheduler(format!("Failed to remove job: {}", e)))?;
        }

        tracing::info!("Periodic sync jobs cancelled");
        Ok(())
    }

    /// Shutdown scheduler gracefully
    pub async fn shutdown(&self) -> Result<()> {
        let mut scheduler = self.scheduler.write().await;
        scheduler
            .shutdown()
            .await
            .map_err(|e| AppError::Scheduler(format!("Failed to shutdown scheduler: {}", e)))?;
        tracing::info!("Sync coordinator shutdown");
        Ok(())
    }
}

fn build_job<F, Fut>(
    cron: String,
    flex_secs: u64,
    name: &'static str,
    lock: Arc<Mutex<()>>,
    auth_required: watch::Sender<bool>,
    runner: F,
) -> Result<Job>
where
    F: Fn() -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = Result<SyncOutcome>> + Send + 'static,
{
    Job::new_async(cron.as_str(), move |_uuid, _scheduler| {
        let lock = Arc::clone(&lock);
        let auth_required = auth_required.clone();
        let runner = runner.clone();

        Box::pin(async move {
            // Jitter within the flex window so runs can coalesce with
            // other background work instead of landing on exact ticks
            let jitter = { rand::thread_rng().gen_range(0..flex_secs.max(1)) };
            tokio::time::sleep(Duration::from_secs(jitter)).await;

            let _guard = lock.lock().await;
            tracing::debug!("Periodic {} starting", name);
            run_with_backoff(name, &runner, &auth_required).await;
        })
    })
    .map_err(|e| AppError::Scheduler(format!("Failed to create {} job: {}", name, e)))
}

/// Run one cycle, retrying `Retry` outcomes with exponential backoff.
/// A `Fatal` outcome raises the auth-required flag and stops; any
/// successful cycle lowers it.
async fn run_with_backoff<F, Fut>(name: &str, run: F, auth_required: &watch::Sender<bool>)
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<SyncOutcome>>,
{
    for attempt in 0..config::MAX_RETRY_ATTEMPTS {
        match run().await {
            Ok(SyncOutcome::Success) => {
                let _ = auth_required.send(false);
                return;
            }
            Ok(SyncOutcome::Fatal) => {
                tracing::error!("{} halted: re-authentication required", name);
                let _ = auth_required.send(true);
                return;
            }
            Ok(SyncOutcome::Retry) => {
                tracing::debug!("{} cycle will be retried", name);
            }
            Err(e) => {
                tracing::error!("{} cycle failed: {}", name, e);
            }
        }

        if attempt + 1 < config::MAX_RETRY_ATTEMPTS {
            let delay = config::BACKOFF_BASE_SECS * (1 << attempt);
            tokio::time::sleep(Duration::from_secs(delay)).await;
        }
    }

    tracing::warn!(
        "{} gave up after {} attempts, awaiting next schedule",
        name,
        config::MAX_RETRY_ATTEMPTS
    );
}

/// Convert an interval in minutes to a six-field cron expression
fn interval_to_cron(minutes: u64) -> String {
    if minutes >= 60 && minutes % 60 == 0 {
        let hours = minutes / 60;
        if hours == 1 {
            "0 0 * * * *".to_string()
        } else {
            format!("0 0 */{} * * *", hours)
        }
    } else {
        format!("0 */{} * * * *", minutes)
    }
}

/// Flex window: a third of the interval, at least the configured minimum
fn flex_minutes(interval_minutes: u64) -> u64 {
    (interval_minutes / 3).max(config::MIN_FLEX_MINUTES)
}
