//! Core domain for MigraineMe health sync.
//!
//! Storage backends and the sync runtime depend on this crate; it has no I/O of its own.

pub mod errors;
pub mod health;
pub mod sync;

pub use errors::{DatabaseError, Error, Result};
