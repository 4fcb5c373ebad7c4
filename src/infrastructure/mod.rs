//! Infrastructure layer - external concerns

pub mod crypto;
pub mod database;
pub mod seed;
pub mod sensor;
pub mod storage;

pub use database::repositories::SeaOrmRepositoryProvider;
pub use database::{init_database, DatabaseConfig};
pub use sensor::SensorFeedClient;
pub use storage::InMemoryRepositoryProvider;
