#![allow(dead_code)]

use txn_harness::{ConnectionError, TestDb};

// Logging is auto-installed for every test binary
#[ctor::ctor]
fn init_logging() {
    txn_harness::logging::init();
}

/// Connect using `.env.test` and the process environment. With nothing
/// configured this is a migrated in-memory SQLite database.
pub async fn test_db() -> Result<TestDb, ConnectionError> {
    TestDb::from_env().await
}
