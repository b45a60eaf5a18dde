use sea_orm::DbErr;
use thiserror::Error;

/// Startup failures. All of them are fatal for a test run.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Configuration error: {message}")]
    Config { message: String },
    #[error("failed to connect to {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("schema not ready on {target}: {detail}")]
    Schema { target: String, detail: String },
    #[error("migration lock on {target}: {detail}")]
    Lock { target: String, detail: String },
    #[error("database error during bootstrap: {0}")]
    Db(#[from] DbErr),
}

impl ConnectionError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}
