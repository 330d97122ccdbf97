//! Drains the outbox into the backend.

use async_trait::async_trait;
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use migraineme_core::health::RecordType;
use migraineme_core::sync::{
    OutboxEntry, OutboxOperation, OutboxRepositoryTrait, SyncRetryClass, SyncStateRepositoryTrait,
    SyncWorker, OUTBOX_BATCH_SIZE,
};

use crate::client::HealthBackend;
use crate::error::{HealthSyncError, Result};
use crate::scheduler::{Job, JobOutcome};
use crate::token::TokenProvider;
use crate::types::{PushReport, Session};

/// Failures of one batch grouped by error message, so rows sharing a cause
/// are updated with one statement.
#[derive(Default)]
struct BatchFailures {
    transient: BTreeMap<String, Vec<i64>>,
    permanent: BTreeMap<String, Vec<i64>>,
}

pub struct PushWorker {
    outbox: Arc<dyn OutboxRepositoryTrait>,
    state: Arc<dyn SyncStateRepositoryTrait>,
    backend: Arc<dyn HealthBackend>,
    tokens: Arc<dyn TokenProvider>,
    record_type: Option<RecordType>,
    batch_size: i64,
}

impl PushWorker {
    pub fn new(
        outbox: Arc<dyn OutboxRepositoryTrait>,
        state: Arc<dyn SyncStateRepositoryTrait>,
        backend: Arc<dyn HealthBackend>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        Self {
            outbox,
            state,
            backend,
            tokens,
            record_type: None,
            batch_size: OUTBOX_BATCH_SIZE,
        }
    }

    /// Restrict the worker to one record type.
    pub fn for_record_type(mut self, record_type: RecordType) -> Self {
        self.record_type = Some(record_type);
        self
    }

    /// Pushes every eligible entry once.
    ///
    /// Batches continue after the last row attempted, so rows that failed
    /// transiently in this run are not re-read until the next one.
    pub async fn run_once(&self) -> Result<PushReport> {
        let run_id = Uuid::now_v7();
        let mut report = PushReport::default();
        let mut cached_session: Option<Session> = None;
        let mut cursor = None;

        loop {
            let batch = self
                .outbox
                .get_batch_after(self.batch_size, self.record_type, cursor.take())?;
            if batch.is_empty() {
                break;
            }
            let full_batch = batch.len() as i64 >= self.batch_size;
            cursor = batch.last().map(OutboxEntry::cursor);
            report.batches += 1;

            let session = match cached_session.take() {
                Some(session) => session,
                None => self.tokens.session().await?,
            };
            self.push_batch(&session, &batch, &mut report).await?;
            cached_session = Some(session);

            if !full_batch {
                break;
            }
            tokio::task::yield_now().await;
        }

        self.state.mark_push_completed().await?;
        info!(
            "[HealthSync] Push run {} complete: batches={} attempted={} delivered={} retried={} quarantined={} permanently_failed={}",
            run_id,
            report.batches,
            report.attempted,
            report.delivered,
            report.retried,
            report.quarantined,
            report.permanently_failed
        );
        Ok(report)
    }

    async fn push_batch(
        &self,
        session: &Session,
        batch: &[OutboxEntry],
        report: &mut PushReport,
    ) -> Result<()> {
        let mut delivered = Vec::new();
        let mut failures = BatchFailures::default();
        let mut auth_error: Option<HealthSyncError> = None;

        for entry in batch {
            let result = match entry.operation {
                OutboxOperation::Upsert => self.backend.upsert_record(session, entry).await,
                OutboxOperation::Delete => self.backend.delete_record(session, entry).await,
            };
            let err = match result {
                Ok(()) => {
                    delivered.push(entry.id);
                    report.attempted += 1;
                    continue;
                }
                Err(err) => err,
            };

            match err.retry_class() {
                SyncRetryClass::ReauthRequired => {
                    auth_error = Some(err);
                    break;
                }
                SyncRetryClass::Retryable => {
                    report.attempted += 1;
                    failures
                        .transient
                        .entry(err.to_string())
                        .or_default()
                        .push(entry.id);
                }
                SyncRetryClass::Permanent => {
                    report.attempted += 1;
                    failures
                        .permanent
                        .entry(err.to_string())
                        .or_default()
                        .push(entry.id);
                }
            }
        }

        // Record outcomes for rows already attempted, even if auth stopped the batch.
        if !delivered.is_empty() {
            report.delivered += self.outbox.delete_by_ids(delivered).await?;
        }
        for (message, ids) in failures.transient {
            warn!(
                "[HealthSync] {} entries failed transiently: {}",
                ids.len(),
                message
            );
            let attempted = ids.len();
            let moved = self.outbox.increment_retry(ids, Some(message)).await?;
            report.retried += attempted - moved.min(attempted);
            report.quarantined += moved;
        }
        for (message, ids) in failures.permanent {
            warn!(
                "[HealthSync] {} entries rejected permanently: {}",
                ids.len(),
                message
            );
            report.permanently_failed += self
                .outbox
                .mark_permanent_failure(ids, Some(message))
                .await?;
        }

        if let Some(err) = auth_error {
            warn!("[HealthSync] Push stopped, session rejected: {}", err);
            self.tokens.invalidate().await;
            return Err(err);
        }
        debug!(
            "[HealthSync] Batch of {} processed ({} delivered so far)",
            batch.len(),
            report.delivered
        );
        Ok(())
    }
}

#[async_trait]
impl Job for PushWorker {
    async fn run(&self) -> JobOutcome {
        match self.run_once().await {
            Ok(_) => JobOutcome::Success,
            Err(err) => {
                warn!("[HealthSync] Push run failed: {}", err);
                if let Err(state_err) = self
                    .state
                    .mark_error(SyncWorker::Push, err.to_string())
                    .await
                {
                    warn!("[HealthSync] Failed to record push error: {}", state_err);
                }
                match err.retry_class() {
                    SyncRetryClass::Permanent => JobOutcome::Failure(err.to_string()),
                    SyncRetryClass::Retryable | SyncRetryClass::ReauthRequired => {
                        JobOutcome::Retry(err.to_string())
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    use migraineme_core::sync::{NewOutboxEntry, OutboxStatus, OUTBOX_MAX_RETRIES};

    use crate::test_support::{setup_repos, steps_entry, Repos};
    use crate::token::StaticTokenProvider;

    /// Backend that answers by source record id; unknown ids succeed.
    struct FakeBackend {
        statuses: HashMap<String, u16>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeBackend {
        fn failing(statuses: &[(&str, u16)]) -> Arc<Self> {
            Arc::new(Self {
                statuses: statuses
                    .iter()
                    .map(|(id, status)| (id.to_string(), *status))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            })
        }

        async fn respond(&self, entry: &OutboxEntry) -> Result<()> {
            self.calls.lock().await.push(entry.source_record_id.clone());
            match self.statuses.get(&entry.source_record_id) {
                Some(status) => Err(HealthSyncError::api(*status, format!("status {}", status))),
                None => Ok(()),
            }
        }

        async fn calls(&self) -> Vec<String> {
            self.calls.lock().await.clone()
        }
    }

    #[async_trait]
    impl HealthBackend for FakeBackend {
        async fn upsert_record(&self, _session: &Session, entry: &OutboxEntry) -> Result<()> {
            self.respond(entry).await
        }

        async fn delete_record(&self, _session: &Session, entry: &OutboxEntry) -> Result<()> {
            self.respond(entry).await
        }
    }

    fn worker(repos: &Repos, backend: Arc<FakeBackend>) -> PushWorker {
        PushWorker::new(
            repos.outbox.clone(),
            repos.state.clone(),
            backend,
            Arc::new(StaticTokenProvider::new("access", "user-1")),
        )
    }

    async fn seed(repos: &Repos, entries: Vec<NewOutboxEntry>) {
        repos.outbox.insert_batch(entries).await.expect("seed outbox");
    }

    fn all_entries(repos: &Repos) -> Vec<OutboxEntry> {
        let mut entries = Vec::new();
        let mut cursor = None;
        loop {
            // get_batch_after only returns pending rows; count_by_status covers the rest.
            let batch = repos
                .outbox
                .get_batch_after(500, None, cursor.take())
                .expect("batch");
            if batch.is_empty() {
                break;
            }
            cursor = batch.last().map(OutboxEntry::cursor);
            entries.extend(batch);
        }
        entries
    }

    #[tokio::test]
    async fn delivers_sixty_entries_in_two_batches() {
        let repos = setup_repos();
        seed(
            &repos,
            (0..60)
                .map(|i| steps_entry(&format!("hc-{}", i), i, i))
                .collect(),
        )
        .await;
        let backend = FakeBackend::failing(&[]);

        let report = worker(&repos, backend.clone()).run_once().await.expect("push");
        assert_eq!(report.batches, 2);
        assert_eq!(report.attempted, 60);
        assert_eq!(report.delivered, 60);
        assert_eq!(repos.outbox.count().expect("count"), 0);
        assert_eq!(backend.calls().await.first().map(String::as_str), Some("hc-0"));
        assert!(repos.state.get_state().expect("state").last_push_at.is_some());
    }

    #[tokio::test]
    async fn empty_outbox_is_a_successful_no_op() {
        let repos = setup_repos();
        let report = worker(&repos, FakeBackend::failing(&[]))
            .run_once()
            .await
            .expect("push");
        assert_eq!(report, PushReport::default());
    }

    #[tokio::test]
    async fn transient_failures_are_attempted_once_per_run() {
        let repos = setup_repos();
        let failing: Vec<(String, u16)> = (0..50).map(|i| (format!("hc-{}", i), 503)).collect();
        let failing_refs: Vec<(&str, u16)> =
            failing.iter().map(|(id, status)| (id.as_str(), *status)).collect();
        seed(
            &repos,
            (0..60)
                .map(|i| steps_entry(&format!("hc-{}", i), i, i))
                .collect(),
        )
        .await;
        let backend = FakeBackend::failing(&failing_refs);

        let report = worker(&repos, backend.clone()).run_once().await.expect("push");
        assert_eq!(backend.calls().await.len(), 60);
        assert_eq!(report.delivered, 10);
        assert_eq!(report.retried, 50);

        let remaining = all_entries(&repos);
        assert_eq!(remaining.len(), 50);
        assert!(remaining.iter().all(|e| e.retry_count == 1));
        assert!(remaining
            .iter()
            .all(|e| e.last_error.as_deref() == Some("API error (503): status 503")));
    }

    #[tokio::test]
    async fn fifth_transient_failure_moves_entry_to_failed() {
        let repos = setup_repos();
        seed(&repos, vec![steps_entry("hc-flaky", 1, 0)]).await;
        let push = worker(&repos, FakeBackend::failing(&[("hc-flaky", 429)]));

        for _ in 0..OUTBOX_MAX_RETRIES - 1 {
            let report = push.run_once().await.expect("push");
            assert_eq!(report.retried, 1);
        }
        let report = push.run_once().await.expect("push");
        assert_eq!(report.quarantined, 1);

        let counts = repos.outbox.count_by_status().expect("counts");
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.pending, 0);
        let report = push.run_once().await.expect("push");
        assert_eq!(report.attempted, 0);
    }

    #[tokio::test]
    async fn client_error_is_permanent_without_retries() {
        let repos = setup_repos();
        seed(
            &repos,
            vec![steps_entry("hc-bad", 1, 0), steps_entry("hc-good", 2, 1)],
        )
        .await;

        let report = worker(&repos, FakeBackend::failing(&[("hc-bad", 400)]))
            .run_once()
            .await
            .expect("push");
        assert_eq!(report.permanently_failed, 1);
        assert_eq!(report.delivered, 1);

        let counts = repos.outbox.count_by_status().expect("counts");
        assert_eq!(counts.permanent_failure, 1);
        assert_eq!(counts.total(), 1);
    }

    #[tokio::test]
    async fn auth_failure_stops_run_and_leaves_rest_untouched() {
        let repos = setup_repos();
        seed(
            &repos,
            vec![
                steps_entry("hc-0", 1, 0),
                steps_entry("hc-1", 2, 1),
                steps_entry("hc-2", 3, 2),
            ],
        )
        .await;
        let backend = FakeBackend::failing(&[("hc-1", 401)]);
        let push = worker(&repos, backend.clone());

        let err = push.run_once().await.unwrap_err();
        assert_eq!(err.retry_class(), SyncRetryClass::ReauthRequired);
        assert_eq!(backend.calls().await, vec!["hc-0", "hc-1"]);

        let remaining = all_entries(&repos);
        let ids: Vec<&str> = remaining.iter().map(|e| e.source_record_id.as_str()).collect();
        assert_eq!(ids, vec!["hc-1", "hc-2"]);
        assert!(remaining.iter().all(|e| e.retry_count == 0));

        assert!(matches!(push.run().await, JobOutcome::Retry(_)));
        let state = repos.state.get_state().expect("state");
        assert!(state.last_error.is_some());
        assert_eq!(state.last_error_worker, Some(SyncWorker::Push));
    }

    #[tokio::test]
    async fn signed_out_push_touches_nothing() {
        let repos = setup_repos();
        seed(&repos, vec![steps_entry("hc-0", 1, 0)]).await;
        let backend = FakeBackend::failing(&[]);
        let push = PushWorker::new(
            repos.outbox.clone(),
            repos.state.clone(),
            backend.clone(),
            Arc::new(StaticTokenProvider::signed_out()),
        );

        assert!(push.run_once().await.is_err());
        assert!(backend.calls().await.is_empty());
        assert_eq!(repos.outbox.count().expect("count"), 1);
    }

    #[tokio::test]
    async fn record_type_filter_limits_the_run() {
        let repos = setup_repos();
        let mut weight = steps_entry("hc-weight", 0, 0);
        weight.record_type = RecordType::Weight;
        weight.payload = r#"{"weight_kg":71.5}"#.to_string();
        seed(&repos, vec![weight, steps_entry("hc-steps", 5, 1)]).await;
        let backend = FakeBackend::failing(&[]);

        let report = worker(&repos, backend.clone())
            .for_record_type(RecordType::Weight)
            .run_once()
            .await
            .expect("push");
        assert_eq!(report.delivered, 1);
        assert_eq!(backend.calls().await, vec!["hc-weight"]);
        let remaining = all_entries(&repos);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].status, OutboxStatus::Pending);
    }
}
