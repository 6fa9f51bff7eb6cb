//! Store adapters for Warden.

#![forbid(unsafe_code)]

mod in_memory_assignment_store;
mod postgres_assignment_store;
mod root_seed;

pub use in_memory_assignment_store::{InMemoryAssignmentStore, InjectedFault};
pub use postgres_assignment_store::PostgresAssignmentStore;
pub use root_seed::{RootSeed, seed_root_role};

/// Embedded schema migrations for the PostgreSQL store.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
