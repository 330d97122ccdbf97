//! Health record types read from the platform health source.

mod record_data;
mod record_type;

pub use record_data::*;
pub use record_type::*;
