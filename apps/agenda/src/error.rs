use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {detail}")]
    Validation { code: &'static str, detail: String },
    #[error("Not found: {detail}")]
    NotFound { code: &'static str, detail: String },
    #[error("Database error: {detail}")]
    Db { detail: String },
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation { code, .. } | AppError::NotFound { code, .. } => code,
            AppError::Db { .. } => "DB_ERROR",
        }
    }

    pub fn invalid(code: &'static str, detail: impl Into<String>) -> Self {
        Self::Validation {
            code,
            detail: detail.into(),
        }
    }

    pub fn not_found(code: &'static str, detail: impl Into<String>) -> Self {
        Self::NotFound {
            code,
            detail: detail.into(),
        }
    }

    pub fn db(detail: impl Into<String>) -> Self {
        Self::Db {
            detail: detail.into(),
        }
    }
}

impl From<sea_orm::DbErr> for AppError {
    fn from(e: sea_orm::DbErr) -> Self {
        AppError::db(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_follow_variant() {
        assert_eq!(AppError::invalid("TITLE_EMPTY", "x").code(), "TITLE_EMPTY");
        assert_eq!(AppError::not_found("NO_APPT", "x").code(), "NO_APPT");
        let from_db: AppError = sea_orm::DbErr::Custom("gone".into()).into();
        assert_eq!(from_db.code(), "DB_ERROR");
        assert!(from_db.to_string().contains("gone"));
    }
}
