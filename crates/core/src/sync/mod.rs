//! Health sync domain models and repository contracts.

mod health_sync_engine;
mod health_sync_scheduler;
mod outbox_model;
mod outbox_status;
mod repository_traits;
mod sync_state_model;

pub use health_sync_engine::*;
pub use health_sync_scheduler::*;
pub use outbox_model::*;
pub use outbox_status::*;
pub use repository_traits::*;
pub use sync_state_model::*;
