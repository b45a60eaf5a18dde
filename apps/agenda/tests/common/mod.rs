#![allow(dead_code)]

use txn_harness::{ConnectionError, TestDb};

// Logging is auto-installed for every test binary
#[ctor::ctor]
fn init_logging() {
    txn_harness::logging::init();
}

pub async fn test_db() -> Result<TestDb, ConnectionError> {
    TestDb::from_env().await
}

pub fn today() -> time::Date {
    time::OffsetDateTime::now_utc().date()
}
