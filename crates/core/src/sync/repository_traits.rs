use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{
    NewOutboxEntry, OutboxBatchCursor, OutboxEntry, OutboxStatusCounts, SyncState, SyncWorker,
};
use crate::errors::Result;
use crate::health::RecordType;

/// Durable queue of health record mutations awaiting delivery.
///
/// Reads are synchronous; writes are serialized through the storage writer.
#[async_trait]
pub trait OutboxRepositoryTrait: Send + Sync {
    /// Inserts or replaces the entry for `source_record_id`. Returns the new row id.
    async fn insert(&self, entry: NewOutboxEntry) -> Result<i64>;

    /// Inserts or replaces all entries in one transaction.
    async fn insert_batch(&self, entries: Vec<NewOutboxEntry>) -> Result<usize>;

    /// Oldest pending entries first.
    fn get_batch(&self, limit: i64, record_type: Option<RecordType>) -> Result<Vec<OutboxEntry>>;

    /// Pending entries strictly after `after` in drain order.
    fn get_batch_after(
        &self,
        limit: i64,
        record_type: Option<RecordType>,
        after: Option<OutboxBatchCursor>,
    ) -> Result<Vec<OutboxEntry>>;

    async fn delete_by_ids(&self, ids: Vec<i64>) -> Result<usize>;

    /// Records a transient failure. Returns how many entries moved to `failed`.
    async fn increment_retry(&self, ids: Vec<i64>, last_error: Option<String>) -> Result<usize>;

    async fn mark_permanent_failure(
        &self,
        ids: Vec<i64>,
        last_error: Option<String>,
    ) -> Result<usize>;

    fn count(&self) -> Result<i64>;

    fn count_by_status(&self) -> Result<OutboxStatusCounts>;

    async fn clear(&self) -> Result<usize>;

    /// `failed` back to `pending`.
    async fn reset_failed(&self) -> Result<usize>;

    /// Every non-pending entry, including `permanent_failure`, back to `pending`.
    async fn reset_all_non_pending(&self) -> Result<usize>;

    /// Deletes quarantined entries created before `cutoff`.
    async fn purge_non_pending_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}

/// Singleton incremental-read checkpoint.
#[async_trait]
pub trait SyncStateRepositoryTrait: Send + Sync {
    fn get_state(&self) -> Result<SyncState>;

    /// Stores the token and stamps `last_pull_at`, even when the token is unchanged.
    /// Clears `last_error` only if the pull worker set it.
    async fn record_pull(&self, changes_token: String) -> Result<()>;

    /// Stamps `last_push_at`. Clears `last_error` only if the push worker set it.
    async fn mark_push_completed(&self) -> Result<()>;

    async fn mark_error(&self, worker: SyncWorker, message: String) -> Result<()>;

    /// Drops the token so the next pull backfills.
    async fn clear(&self) -> Result<()>;
}
