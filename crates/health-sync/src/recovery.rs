//! Manual recovery operations for the outbox and checkpoint.

use chrono::{Duration as ChronoDuration, Utc};
use log::info;
use std::sync::Arc;

use migraineme_core::sync::{OutboxRepositoryTrait, SyncStateRepositoryTrait};
use migraineme_core::Error;

use crate::error::{HealthSyncError, Result};

pub struct RecoveryService {
    outbox: Arc<dyn OutboxRepositoryTrait>,
    state: Arc<dyn SyncStateRepositoryTrait>,
}

impl RecoveryService {
    pub fn new(
        outbox: Arc<dyn OutboxRepositoryTrait>,
        state: Arc<dyn SyncStateRepositoryTrait>,
    ) -> Self {
        Self { outbox, state }
    }

    /// `failed` entries become eligible again with a zero retry count.
    pub async fn reset_failed(&self) -> Result<usize> {
        let count = self.outbox.reset_failed().await?;
        info!("[Outbox] Reset {} failed entries to pending", count);
        Ok(count)
    }

    /// Every non-pending entry, permanent failures included, back to `pending`.
    pub async fn reset_all(&self) -> Result<usize> {
        let count = self.outbox.reset_all_non_pending().await?;
        info!("[Outbox] Reset {} non-pending entries to pending", count);
        Ok(count)
    }

    /// Clears the checkpoint and the outbox so the next pull backfills.
    ///
    /// The checkpoint goes first: if the outbox clear fails, the next pull
    /// still rebuilds everything.
    pub async fn wipe_for_full_resync(&self) -> Result<usize> {
        self.state.clear().await?;
        let removed = self.outbox.clear().await?;
        info!(
            "[Outbox] Wiped {} entries and the changes token; next pull is a full backfill",
            removed
        );
        Ok(removed)
    }

    /// Deletes non-pending entries older than `older_than_days`.
    pub async fn purge_stale(&self, older_than_days: i64) -> Result<usize> {
        if older_than_days < 1 {
            return Err(HealthSyncError::Storage(Error::validation(
                "older_than_days must be at least 1",
            )));
        }
        let cutoff = Utc::now() - ChronoDuration::days(older_than_days);
        let count = self.outbox.purge_non_pending_older_than(cutoff).await?;
        info!(
            "[Outbox] Purged {} quarantined entries older than {} days",
            count, older_than_days
        );
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use migraineme_core::sync::{outbox_timestamp, OUTBOX_MAX_RETRIES};

    use crate::test_support::{setup_repos, steps_entry, Repos};

    fn service(repos: &Repos) -> RecoveryService {
        RecoveryService::new(repos.outbox.clone(), repos.state.clone())
    }

    async fn quarantine(repos: &Repos, failed_id: i64, permanent_id: i64) {
        for _ in 0..OUTBOX_MAX_RETRIES {
            repos
                .outbox
                .increment_retry(vec![failed_id], Some("timeout".to_string()))
                .await
                .expect("retry");
        }
        repos
            .outbox
            .mark_permanent_failure(vec![permanent_id], Some("400".to_string()))
            .await
            .expect("permanent");
    }

    #[tokio::test]
    async fn reset_failed_leaves_permanent_failures_alone() {
        let repos = setup_repos();
        let failed = repos.outbox.insert(steps_entry("hc-1", 1, 0)).await.expect("insert");
        let permanent = repos.outbox.insert(steps_entry("hc-2", 2, 1)).await.expect("insert");
        quarantine(&repos, failed, permanent).await;

        assert_eq!(service(&repos).reset_failed().await.expect("reset"), 1);
        let counts = repos.outbox.count_by_status().expect("counts");
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.permanent_failure, 1);

        assert_eq!(service(&repos).reset_all().await.expect("reset all"), 1);
        let batch = repos.outbox.get_batch(10, None).expect("batch");
        assert_eq!(batch.len(), 2);
        assert!(batch.iter().all(|e| e.retry_count == 0));
    }

    #[tokio::test]
    async fn wipe_forces_backfill_and_empties_outbox() {
        let repos = setup_repos();
        repos.outbox.insert(steps_entry("hc-1", 1, 0)).await.expect("insert");
        repos
            .state
            .record_pull("tok-1".to_string())
            .await
            .expect("token");

        assert_eq!(service(&repos).wipe_for_full_resync().await.expect("wipe"), 1);
        assert_eq!(repos.outbox.count().expect("count"), 0);
        assert!(repos.state.get_state().expect("state").needs_full_resync());
    }

    #[tokio::test]
    async fn purge_stale_only_removes_old_quarantined_rows() {
        let repos = setup_repos();
        let forty_days_ago = outbox_timestamp(Utc::now() - ChronoDuration::days(40));
        let aged = |source_id: &str, count: i64| {
            let mut entry = steps_entry(source_id, count, 0);
            entry.created_at = forty_days_ago.clone();
            entry
        };
        let old_failed = repos.outbox.insert(aged("hc-old", 1)).await.expect("insert");
        let old_pending = repos.outbox.insert(aged("hc-pending", 2)).await.expect("insert");
        let mut fresh = steps_entry("hc-fresh", 3, 0);
        fresh.created_at = outbox_timestamp(Utc::now());
        let fresh_permanent = repos.outbox.insert(fresh).await.expect("insert");
        quarantine(&repos, old_failed, fresh_permanent).await;

        assert_eq!(service(&repos).purge_stale(30).await.expect("purge"), 1);
        let counts = repos.outbox.count_by_status().expect("counts");
        assert_eq!(counts.failed, 0);
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.permanent_failure, 1);
        assert_eq!(
            repos.outbox.get_batch(10, None).expect("batch")[0].id,
            old_pending
        );

        assert!(service(&repos).purge_stale(0).await.is_err());
    }
}
