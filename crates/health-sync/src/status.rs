//! Read-only view of sync health.

use serde::Serialize;
use std::sync::Arc;

use migraineme_core::sync::{
    OutboxRepositoryTrait, OutboxStatusCounts, SyncStateRepositoryTrait, SyncWorker,
};

use crate::error::Result;
use crate::scheduler::{JobScheduler, JobStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusReport {
    pub outbox: OutboxStatusCounts,
    pub has_changes_token: bool,
    pub last_pull_at: Option<String>,
    pub last_push_at: Option<String>,
    pub last_error: Option<String>,
    pub last_error_worker: Option<SyncWorker>,
    pub jobs: Vec<JobStatus>,
}

pub struct SyncStatusService {
    outbox: Arc<dyn OutboxRepositoryTrait>,
    state: Arc<dyn SyncStateRepositoryTrait>,
    scheduler: JobScheduler,
}

impl SyncStatusService {
    pub fn new(
        outbox: Arc<dyn OutboxRepositoryTrait>,
        state: Arc<dyn SyncStateRepositoryTrait>,
        scheduler: JobScheduler,
    ) -> Self {
        Self {
            outbox,
            state,
            scheduler,
        }
    }

    pub async fn report(&self) -> Result<SyncStatusReport> {
        let outbox = self.outbox.count_by_status()?;
        let state = self.state.get_state()?;
        Ok(SyncStatusReport {
            outbox,
            has_changes_token: state.changes_token.is_some(),
            last_pull_at: state.last_pull_at,
            last_push_at: state.last_push_at,
            last_error: state.last_error,
            last_error_worker: state.last_error_worker,
            jobs: self.scheduler.statuses().await,
        })
    }
}
