//! SQLite storage for the health outbox and its sync checkpoint.

pub mod outbox;
pub mod state;

pub use outbox::{OutboxEntryDB, OutboxRepository};
pub use state::{SyncStateDB, SyncStateRepository};
