//! Scheduler service for running sync-all on a cron schedule.

use std::sync::Arc;

use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use crate::error::{AppError, Result};
use crate::services::SyncService;

/// Job execution context providing access to application services.
#[derive(Clone)]
pub struct JobContext {
    pub sync: SyncService,
}

/// The scheduler service managing background jobs.
pub struct Scheduler {
    scheduler: JobScheduler,
}

impl Scheduler {
    /// Create a new scheduler wrapped in Arc for shared access.
    pub async fn new_shared(cron: &str, ctx: JobContext) -> Result<Arc<Self>> {
        Ok(Arc::new(Self::new(cron, ctx).await?))
    }

    /// Create a new scheduler with the sync-all job registered on `cron`.
    pub async fn new(cron: &str, ctx: JobContext) -> Result<Self> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to create scheduler: {}", e)))?;

        Self::add_sync_all_job(&scheduler, cron, ctx).await?;

        Ok(Self { scheduler })
    }

    /// Start the scheduler.
    pub async fn start(&self) -> Result<()> {
        self.scheduler
            .start()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to start scheduler: {}", e)))
    }

    async fn add_sync_all_job(scheduler: &JobScheduler, cron: &str, ctx: JobContext) -> Result<()> {
        let job = Job::new_async(cron, move |_uuid, _lock| {
            let ctx = ctx.clone();
            Box::pin(async move {
                run_sync_all_job(&ctx).await;
            })
        })
        .map_err(map_scheduler_error)?;

        scheduler.add(job).await.map_err(map_scheduler_error)?;
        tracing::debug!(cron = cron, "Scheduled sync_all job");
        Ok(())
    }
}

/// Map JobSchedulerError to AppError.
fn map_scheduler_error(e: JobSchedulerError) -> AppError {
    AppError::Internal(format!("Scheduler error: {}", e))
}

/// Imports recent albums for every tracked artist and logs the totals.
pub async fn run_sync_all_job(ctx: &JobContext) {
    tracing::info!("Running sync_all job");

    match ctx.sync.sync_all().await {
        Ok(report) => {
            let failed_artists = report.artists.iter().filter(|a| !a.errors.is_empty()).count();
            tracing::info!(
                artists = report.artists.len(),
                new_albums = report.new_albums,
                new_tracks = report.new_tracks,
                failed_artists,
                "sync_all job completed"
            );
        }
        Err(e) => tracing::error!(error = %e, "sync_all job failed"),
    }
}
