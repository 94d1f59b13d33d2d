use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{error, info};

pub mod tasks;

/// Job scheduler for background tasks
pub struct JobScheduler {
    context: Arc<crate::context::AppContext>,
}

impl JobScheduler {
    pub fn new(context: Arc<crate::context::AppContext>) -> Self {
        Self { context }
    }

    /// Start all background jobs
    pub fn start(self: Arc<Self>) {
        info!("Starting background job scheduler");

        tokio::spawn(Self::anonymous_pool_prune_job(Arc::clone(&self)));
        tokio::spawn(Self::history_retention_job(Arc::clone(&self)));

        info!("Background jobs started");
    }

    /// Prune idle anonymous pool entries (runs every 15 minutes)
    async fn anonymous_pool_prune_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(900));

        loop {
            interval.tick().await;

            let pruned = tasks::prune_anonymous_pool(&scheduler.context).await;
            if pruned > 0 {
                info!("Pruned {} idle anonymous pool entries", pruned);
            }
        }
    }

    /// Delete prompt history past the retention window (runs daily)
    async fn history_retention_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(86_400));

        loop {
            interval.tick().await;
            info!("Running history retention sweep");

            match tasks::sweep_history(&scheduler.context).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Removed {} prompt history rows past retention", count);
                    }
                }
                Err(e) => error!("History retention sweep failed: {}", e),
            }
        }
    }
}
