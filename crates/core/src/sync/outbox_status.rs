//! Status transitions for outbox entries.
//!
//! ```text
//! pending --transient (retry < max)--> pending
//! pending --transient (retry >= max)--> failed
//! pending --permanent--> permanent_failure
//! failed --reset_failed | reset_all--> pending
//! permanent_failure --reset_all--> pending
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::OutboxStatus;

/// Something that happened to an outbox entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxEvent {
    TransientFailure,
    PermanentFailure,
    ResetFailed,
    ResetAll,
}

/// Status and retry count after applying an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutboxTransition {
    pub status: OutboxStatus,
    pub retry_count: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot apply {event:?} to an outbox entry in status {status}")]
pub struct InvalidTransition {
    pub status: OutboxStatus,
    pub event: OutboxEvent,
}

/// Applies `event` to an entry currently in `status` with `retry_count` retries.
pub fn transition(
    status: OutboxStatus,
    retry_count: i32,
    event: OutboxEvent,
    max_retries: i32,
) -> Result<OutboxTransition, InvalidTransition> {
    let next = match (status, event) {
        (OutboxStatus::Pending, OutboxEvent::TransientFailure) => {
            let retry_count = retry_count.saturating_add(1);
            let status = if retry_count >= max_retries {
                OutboxStatus::Failed
            } else {
                OutboxStatus::Pending
            };
            OutboxTransition {
                status,
                retry_count,
            }
        }
        (OutboxStatus::Pending, OutboxEvent::PermanentFailure) => OutboxTransition {
            status: OutboxStatus::PermanentFailure,
            retry_count,
        },
        (OutboxStatus::Failed, OutboxEvent::ResetFailed | OutboxEvent::ResetAll)
        | (OutboxStatus::PermanentFailure, OutboxEvent::ResetAll) => OutboxTransition {
            status: OutboxStatus::Pending,
            retry_count: 0,
        },
        (
            OutboxStatus::Pending | OutboxStatus::PermanentFailure,
            OutboxEvent::ResetFailed | OutboxEvent::ResetAll,
        ) => OutboxTransition {
            status,
            retry_count,
        },
        (
            OutboxStatus::Failed | OutboxStatus::PermanentFailure,
            OutboxEvent::TransientFailure | OutboxEvent::PermanentFailure,
        ) => return Err(InvalidTransition { status, event }),
    };
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::OUTBOX_MAX_RETRIES;

    fn apply(status: OutboxStatus, retry_count: i32, event: OutboxEvent) -> OutboxTransition {
        transition(status, retry_count, event, OUTBOX_MAX_RETRIES).expect("valid transition")
    }

    #[test]
    fn transient_failure_below_threshold_stays_pending() {
        let next = apply(OutboxStatus::Pending, 0, OutboxEvent::TransientFailure);
        assert_eq!(next.status, OutboxStatus::Pending);
        assert_eq!(next.retry_count, 1);
    }

    #[test]
    fn fifth_transient_failure_quarantines_entry() {
        let next = apply(OutboxStatus::Pending, 4, OutboxEvent::TransientFailure);
        assert_eq!(next.retry_count, 5);
        assert_eq!(next.status, OutboxStatus::Failed);
    }

    #[test]
    fn permanent_failure_ignores_retry_count() {
        let next = apply(OutboxStatus::Pending, 0, OutboxEvent::PermanentFailure);
        assert_eq!(next.status, OutboxStatus::PermanentFailure);
        assert_eq!(next.retry_count, 0);
    }

    #[test]
    fn reset_failed_leaves_permanent_failures_alone() {
        let failed = apply(OutboxStatus::Failed, 5, OutboxEvent::ResetFailed);
        assert_eq!(failed.status, OutboxStatus::Pending);
        assert_eq!(failed.retry_count, 0);

        let permanent = apply(OutboxStatus::PermanentFailure, 2, OutboxEvent::ResetFailed);
        assert_eq!(permanent.status, OutboxStatus::PermanentFailure);
        assert_eq!(permanent.retry_count, 2);
    }

    #[test]
    fn reset_all_revives_permanent_failures() {
        let next = apply(OutboxStatus::PermanentFailure, 1, OutboxEvent::ResetAll);
        assert_eq!(next.status, OutboxStatus::Pending);
        assert_eq!(next.retry_count, 0);
    }

    #[test]
    fn failures_on_quarantined_entries_are_rejected() {
        let err = transition(
            OutboxStatus::Failed,
            5,
            OutboxEvent::TransientFailure,
            OUTBOX_MAX_RETRIES,
        )
        .unwrap_err();
        assert_eq!(err.status, OutboxStatus::Failed);
        assert!(transition(
            OutboxStatus::PermanentFailure,
            0,
            OutboxEvent::PermanentFailure,
            OUTBOX_MAX_RETRIES,
        )
        .is_err());
    }
}
