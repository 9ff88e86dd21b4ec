//! Storage infrastructure - In-memory and PostgreSQL backends

mod factory;
mod in_memory;
pub mod migrations;
mod postgres;

pub use factory::{StorageFactory, StorageHandles};
pub use in_memory::{InMemoryDatabase, InMemoryUnitOfWork};
pub use migrations::{run_storage_migrations, Migration, PostgresMigrator};
pub use postgres::{PostgresConfig, PostgresDatabase, PostgresUnitOfWork};
