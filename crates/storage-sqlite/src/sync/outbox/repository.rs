//! Repository for the health outbox table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::dsl::count_star;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use log::debug;
use std::sync::Arc;

use migraineme_core::errors::Result;
use migraineme_core::health::RecordType;
use migraineme_core::sync::{
    outbox_timestamp, transition, NewOutboxEntry, OutboxBatchCursor, OutboxEntry, OutboxEvent,
    OutboxRepositoryTrait, OutboxStatus, OutboxStatusCounts, OUTBOX_MAX_RETRIES,
};

use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::StorageError;
use crate::schema::health_outbox;

use super::model::{enum_from_db, enum_to_db, NewOutboxEntryDB, OutboxEntryDB};

fn replace_entry(conn: &mut SqliteConnection, entry: NewOutboxEntry) -> Result<i64> {
    let row = NewOutboxEntryDB::try_from(entry)?;
    let id = diesel::replace_into(health_outbox::table)
        .values(&row)
        .returning(health_outbox::id)
        .get_result::<i64>(conn)
        .map_err(StorageError::from)?;
    Ok(id)
}

/// Applies `event` to every matching row through the status state machine.
/// Returns the rows whose status changed, with their new status.
fn apply_event(
    conn: &mut SqliteConnection,
    rows: Vec<OutboxEntryDB>,
    event: OutboxEvent,
    last_error: Option<String>,
) -> Result<Vec<OutboxStatus>> {
    let mut changed = Vec::new();
    for row in rows {
        let current: OutboxStatus = enum_from_db(&row.status)?;
        let next = transition(current, row.retry_count, event, OUTBOX_MAX_RETRIES)?;
        if next.status == current && next.retry_count == row.retry_count {
            continue;
        }

        let error_value = match event {
            OutboxEvent::TransientFailure | OutboxEvent::PermanentFailure => last_error.clone(),
            OutboxEvent::ResetFailed | OutboxEvent::ResetAll => None,
        };
        diesel::update(health_outbox::table.find(row.id))
            .set((
                health_outbox::status.eq(enum_to_db(&next.status)?),
                health_outbox::retry_count.eq(next.retry_count),
                health_outbox::last_error.eq(error_value),
            ))
            .execute(conn)
            .map_err(StorageError::from)?;
        if next.status != current {
            changed.push(next.status);
        }
    }
    Ok(changed)
}

pub struct OutboxRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl OutboxRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }

    async fn apply_to_ids(
        &self,
        ids: Vec<i64>,
        event: OutboxEvent,
        last_error: Option<String>,
    ) -> Result<Vec<OutboxStatus>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        self.writer
            .exec(move |conn| {
                // Rows replaced or reset since they were read are no longer pending; skip them.
                let rows = health_outbox::table
                    .filter(health_outbox::id.eq_any(&ids))
                    .filter(health_outbox::status.eq(enum_to_db(&OutboxStatus::Pending)?))
                    .load::<OutboxEntryDB>(conn)
                    .map_err(StorageError::from)?;
                apply_event(conn, rows, event, last_error)
            })
            .await
    }

    async fn apply_to_quarantined(&self, event: OutboxEvent) -> Result<usize> {
        self.writer
            .exec(move |conn| {
                let rows = health_outbox::table
                    .filter(health_outbox::status.ne(enum_to_db(&OutboxStatus::Pending)?))
                    .load::<OutboxEntryDB>(conn)
                    .map_err(StorageError::from)?;
                Ok(apply_event(conn, rows, event, None)?.len())
            })
            .await
    }
}

#[async_trait]
impl OutboxRepositoryTrait for OutboxRepository {
    async fn insert(&self, entry: NewOutboxEntry) -> Result<i64> {
        self.writer
            .exec(move |conn| replace_entry(conn, entry))
            .await
    }

    async fn insert_batch(&self, entries: Vec<NewOutboxEntry>) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        self.writer
            .exec(move |conn| {
                let count = entries.len();
                for entry in entries {
                    replace_entry(conn, entry)?;
                }
                debug!("[Outbox] Staged {} entries", count);
                Ok(count)
            })
            .await
    }

    fn get_batch(&self, limit: i64, record_type: Option<RecordType>) -> Result<Vec<OutboxEntry>> {
        self.get_batch_after(limit, record_type, None)
    }

    fn get_batch_after(
        &self,
        limit: i64,
        record_type: Option<RecordType>,
        after: Option<OutboxBatchCursor>,
    ) -> Result<Vec<OutboxEntry>> {
        let mut conn = get_connection(&self.pool)?;

        let mut query = health_outbox::table
            .filter(health_outbox::status.eq(enum_to_db(&OutboxStatus::Pending)?))
            .into_boxed();
        if let Some(record_type) = record_type {
            query = query.filter(health_outbox::record_type.eq(record_type.as_str()));
        }
        if let Some(cursor) = after {
            query = query.filter(
                health_outbox::created_at.gt(cursor.created_at.clone()).or(health_outbox::created_at
                    .eq(cursor.created_at)
                    .and(health_outbox::id.gt(cursor.id))),
            );
        }

        let rows = query
            .order((health_outbox::created_at.asc(), health_outbox::id.asc()))
            .limit(limit)
            .load::<OutboxEntryDB>(&mut conn)
            .map_err(StorageError::from)?;

        rows.into_iter().map(OutboxEntry::try_from).collect()
    }

    async fn delete_by_ids(&self, ids: Vec<i64>) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        self.writer
            .exec(move |conn| {
                let deleted =
                    diesel::delete(health_outbox::table.filter(health_outbox::id.eq_any(ids)))
                        .execute(conn)
                        .map_err(StorageError::from)?;
                Ok(deleted)
            })
            .await
    }

    async fn increment_retry(&self, ids: Vec<i64>, last_error: Option<String>) -> Result<usize> {
        let changed = self
            .apply_to_ids(ids, OutboxEvent::TransientFailure, last_error)
            .await?;
        Ok(changed
            .into_iter()
            .filter(|status| *status == OutboxStatus::Failed)
            .count())
    }

    async fn mark_permanent_failure(
        &self,
        ids: Vec<i64>,
        last_error: Option<String>,
    ) -> Result<usize> {
        let changed = self
            .apply_to_ids(ids, OutboxEvent::PermanentFailure, last_error)
            .await?;
        Ok(changed.len())
    }

    fn count(&self) -> Result<i64> {
        let mut conn = get_connection(&self.pool)?;
        let total = health_outbox::table
            .select(count_star())
            .first::<i64>(&mut conn)
            .map_err(StorageError::from)?;
        Ok(total)
    }

    fn count_by_status(&self) -> Result<OutboxStatusCounts> {
        let mut conn = get_connection(&self.pool)?;
        let rows = health_outbox::table
            .group_by(health_outbox::status)
            .select((health_outbox::status, count_star()))
            .load::<(String, i64)>(&mut conn)
            .map_err(StorageError::from)?;

        let mut counts = OutboxStatusCounts::default();
        for (status, total) in rows {
            match enum_from_db::<OutboxStatus>(&status)? {
                OutboxStatus::Pending => counts.pending = total,
                OutboxStatus::Failed => counts.failed = total,
                OutboxStatus::PermanentFailure => counts.permanent_failure = total,
            }
        }
        Ok(counts)
    }

    async fn clear(&self) -> Result<usize> {
        self.writer
            .exec(move |conn| {
                let deleted = diesel::delete(health_outbox::table)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(deleted)
            })
            .await
    }

    async fn reset_failed(&self) -> Result<usize> {
        self.apply_to_quarantined(OutboxEvent::ResetFailed).await
    }

    async fn reset_all_non_pending(&self) -> Result<usize> {
        self.apply_to_quarantined(OutboxEvent::ResetAll).await
    }

    async fn purge_non_pending_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let cutoff_value = outbox_timestamp(cutoff);
        self.writer
            .exec(move |conn| {
                let deleted = diesel::delete(
                    health_outbox::table
                        .filter(health_outbox::status.ne(enum_to_db(&OutboxStatus::Pending)?))
                        .filter(health_outbox::created_at.lt(cutoff_value)),
                )
                .execute(conn)
                .map_err(StorageError::from)?;
                Ok(deleted)
            })
            .await
    }
}
