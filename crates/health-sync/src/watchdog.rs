//! Re-enqueues sync jobs that stopped being scheduled.

use async_trait::async_trait;
use log::info;

use crate::scheduler::{ExistingJobPolicy, Job, JobOutcome, JobScheduler, JobSpec};

/// Periodic check that every watched job is `Enqueued` or `Running`.
///
/// Anything else (missing, cancelled, finished, crashed) is enqueued again
/// with `Keep`, so a concurrent healthy enqueue is never disturbed.
pub struct Watchdog {
    scheduler: JobScheduler,
    watched: Vec<JobSpec>,
}

impl Watchdog {
    pub fn new(scheduler: JobScheduler, watched: Vec<JobSpec>) -> Self {
        Self { scheduler, watched }
    }

    /// Returns the names of the jobs that had to be re-enqueued.
    pub async fn check(&self) -> Vec<String> {
        let mut revived = Vec::new();
        for spec in &self.watched {
            let state = self.scheduler.state(&spec.name).await;
            if state.map(|state| state.is_active()).unwrap_or(false) {
                continue;
            }
            info!(
                "[HealthSync] Watchdog re-enqueuing '{}' (state {:?})",
                spec.name, state
            );
            if self
                .scheduler
                .enqueue(spec.clone(), ExistingJobPolicy::Keep)
                .await
            {
                revived.push(spec.name.clone());
            }
        }
        revived
    }
}

#[async_trait]
impl Job for Watchdog {
    async fn run(&self) -> JobOutcome {
        self.check().await;
        JobOutcome::Success
    }
}
