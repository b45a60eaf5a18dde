#![deny(clippy::wildcard_imports)]
#![cfg_attr(test, allow(clippy::wildcard_imports))]

pub mod db;
pub mod entities;
pub mod error;
pub mod repos;
pub mod services;

pub use db::txn::with_txn;
pub use error::AppError;
