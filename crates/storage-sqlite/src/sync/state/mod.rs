mod model;
mod repository;

pub use model::SyncStateDB;
pub use repository::SyncStateRepository;
