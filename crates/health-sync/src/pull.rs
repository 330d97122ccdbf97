//! Stages health source changes into the outbox.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use log::{debug, info, warn};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use migraineme_core::health::RecordType;
use migraineme_core::sync::{
    NewOutboxEntry, OutboxOperation, OutboxRepositoryTrait, SyncRetryClass,
    SyncStateRepositoryTrait, SyncWorker,
};

use crate::error::Result;
use crate::scheduler::{Job, JobOutcome};
use crate::source::HealthSource;
use crate::types::{HealthChange, PullMode, PullReport, TimeRange};

pub struct PullWorker {
    source: Arc<dyn HealthSource>,
    outbox: Arc<dyn OutboxRepositoryTrait>,
    state: Arc<dyn SyncStateRepositoryTrait>,
    record_types: Vec<RecordType>,
}

#[derive(Default)]
struct Staged {
    upserts: usize,
    deletes: usize,
}

impl PullWorker {
    pub fn new(
        source: Arc<dyn HealthSource>,
        outbox: Arc<dyn OutboxRepositoryTrait>,
        state: Arc<dyn SyncStateRepositoryTrait>,
    ) -> Self {
        Self {
            source,
            outbox,
            state,
            record_types: RecordType::ALL.to_vec(),
        }
    }

    pub fn with_record_types(mut self, record_types: Vec<RecordType>) -> Self {
        self.record_types = record_types;
        self
    }

    /// Reads everything new since the stored token and stages it.
    ///
    /// Without a token (first run, after a wipe, or when the source expired
    /// it) the whole lookback window is scanned. The checkpoint is written
    /// after every successful run, even when nothing changed.
    pub async fn run_once(&self) -> Result<PullReport> {
        let run_id = Uuid::now_v7();
        let state = self.state.get_state()?;

        let report = match state.changes_token {
            Some(token) => match self.incremental(token).await? {
                Some(report) => report,
                None => {
                    info!("[HealthSync] Changes token expired; falling back to full backfill");
                    self.backfill().await?
                }
            },
            None => self.backfill().await?,
        };

        self.state.record_pull(report.changes_token.clone()).await?;
        info!(
            "[HealthSync] Pull run {} complete: mode={:?} upserts={} deletes={}",
            run_id, report.mode, report.staged_upserts, report.staged_deletes
        );
        Ok(report)
    }

    /// Full window scan. The token is taken first so changes made during the
    /// scan are picked up by the next incremental read.
    async fn backfill(&self) -> Result<PullReport> {
        let token = self.source.changes_token(&self.record_types).await?;
        let now = Utc::now();
        let mut staged = Staged::default();

        for record_type in &self.record_types {
            let range = TimeRange {
                start: now - ChronoDuration::days(record_type.backfill_lookback_days()),
                end: now,
            };
            let mut page_token: Option<String> = None;
            loop {
                let page = self
                    .source
                    .read_records(*record_type, range, page_token.take())
                    .await?;
                let entries = page
                    .records
                    .iter()
                    .filter(|record| record.record_type() == *record_type)
                    .map(NewOutboxEntry::upsert)
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                staged.upserts += entries.len();
                if !entries.is_empty() {
                    self.outbox.insert_batch(entries).await?;
                }

                match page.next_page_token {
                    Some(next) if !next.is_empty() => page_token = Some(next),
                    _ => break,
                }
                tokio::task::yield_now().await;
            }
            debug!(
                "[HealthSync] Backfilled {} ({} days)",
                record_type,
                record_type.backfill_lookback_days()
            );
        }

        Ok(PullReport {
            mode: PullMode::Backfill,
            staged_upserts: staged.upserts,
            staged_deletes: staged.deletes,
            changes_token: token,
        })
    }

    /// Delta read. Returns `None` when the source no longer honours the token.
    async fn incremental(&self, token: String) -> Result<Option<PullReport>> {
        let wanted: HashSet<RecordType> = self.record_types.iter().copied().collect();
        let today = Utc::now().date_naive();
        let mut token = token;
        let mut staged = Staged::default();

        loop {
            let page = self.source.changes(&token).await?;
            if page.token_expired {
                return Ok(None);
            }

            let mut entries = Vec::with_capacity(page.changes.len());
            for change in &page.changes {
                let entry = match change {
                    HealthChange::Upsert { record } => NewOutboxEntry::upsert(record)?,
                    HealthChange::Deletion { record } => NewOutboxEntry::delete(
                        record.record_id.clone(),
                        record.record_type,
                        record.date.unwrap_or(today),
                    ),
                };
                if !wanted.contains(&entry.record_type) {
                    continue;
                }
                match entry.operation {
                    OutboxOperation::Upsert => staged.upserts += 1,
                    OutboxOperation::Delete => staged.deletes += 1,
                }
                entries.push(entry);
            }
            if !entries.is_empty() {
                self.outbox.insert_batch(entries).await?;
            }

            if !page.next_token.is_empty() {
                token = page.next_token;
            }
            if !page.has_more {
                break;
            }
            tokio::task::yield_now().await;
        }

        Ok(Some(PullReport {
            mode: PullMode::Incremental,
            staged_upserts: staged.upserts,
            staged_deletes: staged.deletes,
            changes_token: token,
        }))
    }
}

#[async_trait]
impl Job for PullWorker {
    async fn run(&self) -> JobOutcome {
        match self.run_once().await {
            Ok(_) => JobOutcome::Success,
            Err(err) => {
                warn!("[HealthSync] Pull run failed: {}", err);
                if let Err(state_err) = self
                    .state
                    .mark_error(SyncWorker::Pull, err.to_string())
                    .await
                {
                    warn!("[HealthSync] Failed to record pull error: {}", state_err);
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
