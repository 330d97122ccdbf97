use serde::{Deserialize, Serialize};

/// Background worker that owns a run-level error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncWorker {
    Pull,
    Push,
}

/// Singleton checkpoint for incremental reads from the health source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    /// Opaque changes token. `None` means the next pull must backfill.
    pub changes_token: Option<String>,
    pub last_pull_at: Option<String>,
    pub last_push_at: Option<String>,
    pub last_error: Option<String>,
    /// Worker that reported `last_error`; only that worker's next success clears it.
    pub last_error_worker: Option<SyncWorker>,
}

impl SyncState {
    pub fn needs_full_resync(&self) -> bool {
        self.changes_token.is_none()
    }
}
