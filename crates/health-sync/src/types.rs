//! Wire types for the backend, the health source bridge and run reports.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use migraineme_core::health::{HealthRecord, RecordType};

/// Authenticated backend session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub user_id: String,
}

/// PostgREST error body.
#[derive(Debug, Clone, Deserialize)]
pub struct PostgrestErrorResponse {
    pub code: Option<String>,
    pub message: Option<String>,
    pub details: Option<String>,
    pub hint: Option<String>,
}

impl PostgrestErrorResponse {
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if let Some(code) = &self.code {
            parts.push(code.clone());
        }
        if let Some(message) = &self.message {
            parts.push(message.clone());
        }
        if let Some(details) = &self.details {
            parts.push(details.clone());
        }
        if let Some(hint) = &self.hint {
            parts.push(format!("hint: {}", hint));
        }
        parts.join(": ")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SupabaseTokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: Option<u64>,
    pub user: Option<SupabaseUser>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SupabaseUser {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SupabaseErrorResponse {
    pub error: Option<String>,
    pub error_description: Option<String>,
    pub msg: Option<String>,
}

/// Half-open time window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// A record removed from the health source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedRecord {
    pub record_id: String,
    pub record_type: RecordType,
    pub date: Option<NaiveDate>,
}

/// One incremental change reported by the health source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HealthChange {
    Upsert { record: HealthRecord },
    Deletion { record: DeletedRecord },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangesPage {
    #[serde(default)]
    pub changes: Vec<HealthChange>,
    /// Empty when the source sends none, as it does for an expired token.
    #[serde(default)]
    pub next_token: String,
    #[serde(default)]
    pub has_more: bool,
    /// The source no longer remembers the token; a full backfill is required.
    #[serde(default)]
    pub token_expired: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordsPage {
    #[serde(default)]
    pub records: Vec<HealthRecord>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangesTokenResponse {
    pub token: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangesTokenRequest {
    pub record_types: Vec<RecordType>,
}

/// Counters for one push run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushReport {
    pub batches: usize,
    pub attempted: usize,
    pub delivered: usize,
    pub retried: usize,
    pub quarantined: usize,
    pub permanently_failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PullMode {
    Backfill,
    Incremental,
}

/// Counters for one pull run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PullReport {
    pub mode: PullMode,
    pub staged_upserts: usize,
    pub staged_deletes: usize,
    #[serde(skip)]
    pub changes_token: String,
}
