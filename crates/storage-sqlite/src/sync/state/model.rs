use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use migraineme_core::errors::Result;
use migraineme_core::sync::{SyncState, SyncWorker};

use crate::sync::outbox::model::enum_from_db;

/// Fixed primary key of the singleton state row.
pub const SYNC_STATE_ROW_ID: i32 = 1;

#[derive(
    Queryable,
    Identifiable,
    Insertable,
    AsChangeset,
    Selectable,
    Debug,
    Clone,
    Serialize,
    Deserialize,
)]
#[diesel(table_name = crate::schema::health_sync_state)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SyncStateDB {
    pub id: i32,
    pub changes_token: Option<String>,
    pub last_pull_at: Option<String>,
    pub last_push_at: Option<String>,
    pub last_error: Option<String>,
    pub last_error_worker: Option<String>,
}

impl SyncStateDB {
    pub fn empty() -> Self {
        Self {
            id: SYNC_STATE_ROW_ID,
            changes_token: None,
            last_pull_at: None,
            last_push_at: None,
            last_error: None,
            last_error_worker: None,
        }
    }
}

impl SyncStateDB {
    pub fn into_state(self) -> Result<SyncState> {
        Ok(SyncState {
            changes_token: self.changes_token,
            last_pull_at: self.last_pull_at,
            last_push_at: self.last_push_at,
            last_error: self.last_error,
            last_error_worker: self
                .last_error_worker
                .as_deref()
                .map(enum_from_db::<SyncWorker>)
                .transpose()?,
        })
    }
}
