//! Shared database configuration and connection bootstrap.
//! Used by the test harness and the migration CLI.

pub mod config;
pub mod error;
pub mod infra;

pub use config::db;
pub use config::db::{DbConfig, DbKind, DbOwner, DbTarget, SchemaPolicy};
pub use error::ConnectionError;
pub use infra::db::core::{bootstrap_test_db, build_admin_pool, connect};
pub use infra::db::migrate::migrate_locked;
pub use infra::db::schema::ensure_schema;
