//! Infrastructure layer - connection pools and schema bootstrap.

pub mod db;
