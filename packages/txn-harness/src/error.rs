use db_infra::ConnectionError;
use sea_orm::DbErr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error("failed to begin test transaction {id}: {source}")]
    Begin {
        id: u64,
        #[source]
        source: DbErr,
    },
    #[error("failed to roll back test transaction {id}: {source}")]
    Rollback {
        id: u64,
        #[source]
        source: DbErr,
    },
    #[error("database error: {0}")]
    Db(#[from] DbErr),
    /// A failure reported by a test body itself.
    #[error("test failure: {0}")]
    Failure(String),
}

impl HarnessError {
    pub fn failure(detail: impl Into<String>) -> Self {
        Self::Failure(detail.into())
    }
}
