//! Database models for the health outbox table.

use chrono::NaiveDate;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use migraineme_core::errors::{Error, Result};
use migraineme_core::sync::{NewOutboxEntry, OutboxEntry, OutboxStatus};

const RECORD_DATE_FORMAT: &str = "%Y-%m-%d";

pub(crate) fn enum_to_db<T: serde::Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?.trim_matches('"').to_string())
}

pub(crate) fn enum_from_db<T: serde::de::DeserializeOwned>(value: &str) -> Result<T> {
    Ok(serde_json::from_str(&format!("\"{}\"", value))?)
}

#[derive(
    Queryable,
    Identifiable,
    AsChangeset,
    Selectable,
    Debug,
    Clone,
    Serialize,
    Deserialize,
)]
#[diesel(table_name = crate::schema::health_outbox)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct OutboxEntryDB {
    pub id: i64,
    pub source_record_id: String,
    pub record_type: String,
    pub operation: String,
    pub record_date: String,
    pub payload: String,
    pub created_at: String,
    pub retry_count: i32,
    pub status: String,
    pub last_error: Option<String>,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::health_outbox)]
pub struct NewOutboxEntryDB {
    pub source_record_id: String,
    pub record_type: String,
    pub operation: String,
    pub record_date: String,
    pub payload: String,
    pub created_at: String,
    pub retry_count: i32,
    pub status: String,
    pub last_error: Option<String>,
}

impl TryFrom<NewOutboxEntry> for NewOutboxEntryDB {
    type Error = Error;

    fn try_from(entry: NewOutboxEntry) -> Result<Self> {
        Ok(Self {
            source_record_id: entry.source_record_id,
            record_type: entry.record_type.as_str().to_string(),
            operation: enum_to_db(&entry.operation)?,
            record_date: entry.record_date.format(RECORD_DATE_FORMAT).to_string(),
            payload: entry.payload,
            created_at: entry.created_at,
            retry_count: 0,
            status: enum_to_db(&OutboxStatus::Pending)?,
            last_error: None,
        })
    }
}

impl TryFrom<OutboxEntryDB> for OutboxEntry {
    type Error = Error;

    fn try_from(row: OutboxEntryDB) -> Result<Self> {
        let record_date = NaiveDate::parse_from_str(&row.record_date, RECORD_DATE_FORMAT)
            .map_err(|e| {
                Error::validation(format!(
                    "Outbox row {} has invalid record_date '{}': {}",
                    row.id, row.record_date, e
                ))
            })?;
        Ok(OutboxEntry {
            id: row.id,
            source_record_id: row.source_record_id,
            record_type: row.record_type.parse()?,
            operation: enum_from_db(&row.operation)?,
            record_date,
            payload: row.payload,
            created_at: row.created_at,
            retry_count: row.retry_count,
            status: enum_from_db(&row.status)?,
            last_error: row.last_error,
        })
    }
}
