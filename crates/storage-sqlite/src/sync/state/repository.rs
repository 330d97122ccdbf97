//! Repository for the singleton health sync checkpoint.

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use std::sync::Arc;

use migraineme_core::errors::Result;
use migraineme_core::sync::{SyncState, SyncStateRepositoryTrait, SyncWorker};

use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::StorageError;
use crate::schema::health_sync_state;
use crate::sync::outbox::model::enum_to_db;

use super::model::{SyncStateDB, SYNC_STATE_ROW_ID};

pub struct SyncStateRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl SyncStateRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

/// Clears `last_error` when `worker` was the one that reported it.
fn clear_own_error(conn: &mut SqliteConnection, worker: SyncWorker) -> Result<()> {
    diesel::update(
        health_sync_state::table
            .filter(health_sync_state::last_error_worker.eq(enum_to_db(&worker)?)),
    )
    .set((
        health_sync_state::last_error.eq::<Option<String>>(None),
        health_sync_state::last_error_worker.eq::<Option<String>>(None),
    ))
    .execute(conn)
    .map_err(StorageError::from)?;
    Ok(())
}

#[async_trait]
impl SyncStateRepositoryTrait for SyncStateRepository {
    fn get_state(&self) -> Result<SyncState> {
        let mut conn = get_connection(&self.pool)?;
        let row = health_sync_state::table
            .find(SYNC_STATE_ROW_ID)
            .first::<SyncStateDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?;
        match row {
            Some(row) => row.into_state(),
            None => Ok(SyncState::default()),
        }
    }

    async fn record_pull(&self, changes_token: String) -> Result<()> {
        self.writer
            .exec(move |conn| {
                let now = Utc::now().to_rfc3339();
                diesel::insert_into(health_sync_state::table)
                    .values(SyncStateDB {
                        changes_token: Some(changes_token.clone()),
                        last_pull_at: Some(now.clone()),
                        ..SyncStateDB::empty()
                    })
                    .on_conflict(health_sync_state::id)
                    .do_update()
                    .set((
                        health_sync_state::changes_token.eq(Some(changes_token)),
                        health_sync_state::last_pull_at.eq(Some(now)),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                clear_own_error(conn, SyncWorker::Pull)
            })
            .await
    }

    async fn mark_push_completed(&self) -> Result<()> {
        self.writer
            .exec(move |conn| {
                let now = Utc::now().to_rfc3339();
                diesel::insert_into(health_sync_state::table)
                    .values(SyncStateDB {
                        last_push_at: Some(now.clone()),
                        ..SyncStateDB::empty()
                    })
                    .on_conflict(health_sync_state::id)
                    .do_update()
                    .set(health_sync_state::last_push_at.eq(Some(now)))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                clear_own_error(conn, SyncWorker::Push)
            })
            .await
    }

    async fn mark_error(&self, worker: SyncWorker, message: String) -> Result<()> {
        self.writer
            .exec(move |conn| {
                let worker = enum_to_db(&worker)?;
                diesel::insert_into(health_sync_state::table)
                    .values(SyncStateDB {
                        last_error: Some(message.clone()),
                        last_error_worker: Some(worker.clone()),
                        ..SyncStateDB::empty()
                    })
                    .on_conflict(health_sync_state::id)
                    .do_update()
                    .set((
                        health_sync_state::last_error.eq(Some(message)),
                        health_sync_state::last_error_worker.eq(Some(worker)),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn clear(&self) -> Result<()> {
        self.writer
            .exec(move |conn| {
                diesel::delete(health_sync_state::table)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }
}
