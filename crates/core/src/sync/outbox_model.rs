//! Outbox domain models.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::Result;
use crate::health::{HealthRecord, RecordType};

/// Mutation the backend should apply for an outbox entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxOperation {
    Upsert,
    Delete,
}

/// Local outbox lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    Pending,
    Failed,
    PermanentFailure,
}

impl fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OutboxStatus::Pending => "pending",
            OutboxStatus::Failed => "failed",
            OutboxStatus::PermanentFailure => "permanent_failure",
        };
        f.write_str(label)
    }
}

/// One pending change to a remote health row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxEntry {
    pub id: i64,
    pub source_record_id: String,
    pub record_type: RecordType,
    pub operation: OutboxOperation,
    pub record_date: NaiveDate,
    pub payload: String,
    pub created_at: String,
    pub retry_count: i32,
    pub status: OutboxStatus,
    pub last_error: Option<String>,
}

impl OutboxEntry {
    /// Keyset position of this entry in drain order.
    pub fn cursor(&self) -> OutboxBatchCursor {
        OutboxBatchCursor {
            created_at: self.created_at.clone(),
            id: self.id,
        }
    }
}

/// Insert form of an outbox entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOutboxEntry {
    pub source_record_id: String,
    pub record_type: RecordType,
    pub operation: OutboxOperation,
    pub record_date: NaiveDate,
    pub payload: String,
    pub created_at: String,
}

impl NewOutboxEntry {
    pub fn upsert(record: &HealthRecord) -> Result<Self> {
        Ok(Self {
            source_record_id: record.id.clone(),
            record_type: record.record_type(),
            operation: OutboxOperation::Upsert,
            record_date: record.date,
            payload: record.data.to_payload()?,
            created_at: outbox_timestamp(Utc::now()),
        })
    }

    pub fn delete(
        source_record_id: impl Into<String>,
        record_type: RecordType,
        record_date: NaiveDate,
    ) -> Self {
        Self {
            source_record_id: source_record_id.into(),
            record_type,
            operation: OutboxOperation::Delete,
            record_date,
            payload: "{}".to_string(),
            created_at: outbox_timestamp(Utc::now()),
        }
    }
}

/// Position after which the next batch starts, in `(created_at, id)` order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxBatchCursor {
    pub created_at: String,
    pub id: i64,
}

/// Row counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxStatusCounts {
    pub pending: i64,
    pub failed: i64,
    pub permanent_failure: i64,
}

impl OutboxStatusCounts {
    pub fn total(&self) -> i64 {
        self.pending + self.failed + self.permanent_failure
    }
}

/// Fixed-width RFC3339 timestamp so lexical order equals time order.
pub fn outbox_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::{RecordData, StepsPayload};
    use chrono::TimeZone;

    #[test]
    fn timestamps_sort_lexically() {
        let earlier = outbox_timestamp(Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap());
        let later = outbox_timestamp(Utc.with_ymd_and_hms(2026, 1, 1, 10, 0, 0).unwrap());
        assert_eq!(earlier, "2026-01-01T09:00:00.000Z");
        assert!(earlier < later);
    }

    #[test]
    fn upsert_entry_copies_record_identity() {
        let record = HealthRecord {
            id: "steps-42".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 2, 14).unwrap(),
            data: RecordData::Steps(StepsPayload { count: 8123 }),
        };
        let entry = NewOutboxEntry::upsert(&record).expect("entry");
        assert_eq!(entry.source_record_id, "steps-42");
        assert_eq!(entry.record_type, RecordType::Steps);
        assert_eq!(entry.operation, OutboxOperation::Upsert);
        assert_eq!(entry.payload, r#"{"count":8123}"#);
    }

    #[test]
    fn status_serialization_matches_storage_values() {
        let actual = [
            OutboxStatus::Pending,
            OutboxStatus::Failed,
            OutboxStatus::PermanentFailure,
        ]
        .iter()
        .map(|status| serde_json::to_string(status).expect("serialize status"))
        .collect::<Vec<_>>();
        assert_eq!(
            actual,
            vec!["\"pending\"", "\"failed\"", "\"permanent_failure\""]
        );
    }
}
