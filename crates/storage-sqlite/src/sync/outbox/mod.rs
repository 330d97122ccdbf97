//! SQLite persistence for the health outbox.

pub(crate) mod model;
mod repository;

pub use model::{NewOutboxEntryDB, OutboxEntryDB};
pub use repository::OutboxRepository;
