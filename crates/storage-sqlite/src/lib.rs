//! SQLite storage for MigraineMe health sync.
//!
//! Reads go straight to the connection pool. Writes are funneled through a
//! single writer thread (`db::WriteHandle`) so every mutation runs in its own
//! immediate transaction and writers never contend for the database lock.

pub mod db;
pub mod errors;
pub mod schema;
pub mod sync;

pub use db::{
    create_pool, get_connection, init, run_migrations, spawn_writer, DbPool, WriteHandle,
};
pub use errors::StorageError;
pub use sync::{OutboxRepository, SyncStateRepository};
