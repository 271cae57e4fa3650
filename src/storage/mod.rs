//! Persistence: repository trees, pending pool, encrypted keystore

pub mod keystore;
pub mod pending_pool;
pub mod repository;

pub use keystore::Keystore;
pub use pending_pool::PendingPool;
pub use repository::Repository;
