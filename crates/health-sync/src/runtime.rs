//! Wires the push, pull and watchdog jobs into one scheduler.

use log::info;
use std::sync::Arc;
use std::time::Duration;

use migraineme_core::sync::{
    HEALTH_PULL_INTERVAL_SECS, HEALTH_PUSH_INTERVAL_SECS, HEALTH_WATCHDOG_INTERVAL_SECS,
    PULL_JOB_NAME, PUSH_JOB_NAME, WATCHDOG_JOB_NAME,
};

use crate::pull::PullWorker;
use crate::push::PushWorker;
use crate::scheduler::{ExistingJobPolicy, JobOutcome, JobScheduler, JobSpec};
use crate::watchdog::Watchdog;

pub struct HealthSyncRuntime {
    scheduler: JobScheduler,
    push: Arc<PushWorker>,
    pull: Arc<PullWorker>,
}

impl HealthSyncRuntime {
    pub fn new(scheduler: JobScheduler, push: Arc<PushWorker>, pull: Arc<PullWorker>) -> Self {
        Self {
            scheduler,
            push,
            pull,
        }
    }

    pub fn scheduler(&self) -> &JobScheduler {
        &self.scheduler
    }

    fn sync_job_specs(&self) -> Vec<JobSpec> {
        vec![
            JobSpec::periodic(
                PULL_JOB_NAME,
                Duration::from_secs(HEALTH_PULL_INTERVAL_SECS),
                self.pull.clone(),
            ),
            JobSpec::periodic(
                PUSH_JOB_NAME,
                Duration::from_secs(HEALTH_PUSH_INTERVAL_SECS),
                self.push.clone(),
            ),
        ]
    }

    /// Schedules pull, push and the watchdog. Safe to call repeatedly.
    pub async fn ensure_health_sync_scheduled(&self) {
        let specs = self.sync_job_specs();
        for spec in &specs {
            self.scheduler
                .enqueue_periodic(spec.clone(), ExistingJobPolicy::Keep)
                .await;
        }

        let watchdog = Arc::new(Watchdog::new(self.scheduler.clone(), specs));
        let watchdog_interval = Duration::from_secs(HEALTH_WATCHDOG_INTERVAL_SECS);
        self.scheduler
            .enqueue_periodic(
                JobSpec::periodic(WATCHDOG_JOB_NAME, watchdog_interval, watchdog)
                    .with_initial_delay(watchdog_interval),
                ExistingJobPolicy::Keep,
            )
            .await;
        info!("[HealthSync] Background sync scheduled");
    }

    pub async fn ensure_health_sync_stopped(&self) {
        self.scheduler.cancel_all().await;
        info!("[HealthSync] Background sync stopped");
    }

    /// Runs a push immediately unless one is already in flight.
    pub async fn push_now(&self) -> Option<JobOutcome> {
        self.scheduler.run_now(PUSH_JOB_NAME).await
    }

    /// Runs a pull immediately unless one is already in flight.
    pub async fn pull_now(&self) -> Option<JobOutcome> {
        self.scheduler.run_now(PULL_JOB_NAME).await
    }
}
