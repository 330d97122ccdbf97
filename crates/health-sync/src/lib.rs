//! Health sync for MigraineMe.
//!
//! Moves records from the on-device health store into the backend through a
//! durable local outbox:
//! - [`PullWorker`] stages changes from a [`HealthSource`] into the outbox.
//! - [`PushWorker`] drains the outbox into a [`HealthBackend`].
//! - [`JobScheduler`] runs both periodically, with a [`Watchdog`] that
//!   re-enqueues them if they disappear.

mod client;
mod error;
mod pull;
mod push;
mod recovery;
mod runtime;
mod scheduler;
mod source;
mod status;
mod token;
mod types;
mod watchdog;

#[cfg(test)]
mod test_support;

pub use client::{backend_row, BackendClient, HealthBackend};
pub use error::{HealthSyncError, Result};
pub use pull::PullWorker;
pub use push::PushWorker;
pub use recovery::RecoveryService;
pub use runtime::HealthSyncRuntime;
pub use scheduler::{
    ExistingJobPolicy, Job, JobKind, JobOutcome, JobScheduler, JobSpec, JobState, JobStatus,
};
pub use source::{HealthSource, HttpHealthSource};
pub use status::{SyncStatusReport, SyncStatusService};
pub use token::{StaticTokenProvider, SupabaseTokenProvider, TokenProvider};
pub use types::*;
pub use watchdog::Watchdog;
