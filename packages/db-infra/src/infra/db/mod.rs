pub mod core;
pub mod locking;
pub mod migrate;
pub mod schema;

pub use self::core::{bootstrap_test_db, build_admin_pool, build_session_statements, connect};
pub use migrate::migrate_locked;
pub use schema::ensure_schema;
