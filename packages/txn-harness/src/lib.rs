#![deny(clippy::wildcard_imports)]
#![cfg_attr(test, allow(clippy::wildcard_imports))]

//! Transaction-per-test isolation.
//!
//! Connect once with [`TestDb`], then wrap every test body in
//! [`TestDb::run`]: the body gets a transaction that is always rolled back,
//! whether it returns `Ok`, returns `Err`, or panics.

pub mod error;
pub mod guard;
pub mod logging;
pub mod suite;
pub mod test_db;
pub mod unique;

pub use db_infra::{ConnectionError, DbConfig, DbKind, SchemaPolicy};
pub use error::HarnessError;
pub use futures::future::BoxFuture;
pub use guard::TestTxn;
pub use suite::{BoxError, CaseReport, Outcome, Suite, SuiteReport};
pub use test_db::TestDb;
pub use unique::unique_str;
