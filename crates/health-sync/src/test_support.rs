//! Shared fixtures: real SQLite repositories in a temp directory.

use chrono::{Duration as ChronoDuration, NaiveDate, TimeZone, Utc};
use std::sync::Arc;
use tempfile::tempdir;

use migraineme_core::health::RecordType;
use migraineme_core::sync::{outbox_timestamp, NewOutboxEntry, OutboxOperation};
use migraineme_storage_sqlite::{
    create_pool, init, run_migrations, spawn_writer, OutboxRepository, SyncStateRepository,
};

pub(crate) struct Repos {
    pub outbox: Arc<OutboxRepository>,
    pub state: Arc<SyncStateRepository>,
}

pub(crate) fn setup_repos() -> Repos {
    let app_data = tempdir()
        .expect("tempdir")
        .keep()
        .to_string_lossy()
        .to_string();
    let db_path = init(&app_data).expect("init db");
    run_migrations(&db_path).expect("migrate db");
    let pool = create_pool(&db_path).expect("create pool");
    let writer = spawn_writer(pool.as_ref().clone());
    Repos {
        outbox: Arc::new(OutboxRepository::new(Arc::clone(&pool), writer.clone())),
        state: Arc::new(SyncStateRepository::new(pool, writer)),
    }
}

/// Steps upsert created `minute` minutes after a fixed origin.
pub(crate) fn steps_entry(source_id: &str, count: i64, minute: i64) -> NewOutboxEntry {
    let origin = Utc.with_ymd_and_hms(2026, 3, 1, 6, 0, 0).unwrap();
    NewOutboxEntry {
        source_record_id: source_id.to_string(),
        record_type: RecordType::Steps,
        operation: OutboxOperation::Upsert,
        record_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
        payload: format!(r#"{{"count":{}}}"#, count),
        created_at: outbox_timestamp(origin + ChronoDuration::minutes(minute)),
    }
}
