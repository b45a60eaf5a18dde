use sea_orm::{EntityTrait, TransactionTrait};
use time::Date;
use tracing::debug;

use crate::db::txn::with_txn;
use crate::entities::appointments;
use crate::error::AppError;
use crate::repos::appointments as appointments_repo;

pub const MAX_TITLE_LEN: usize = 200;

fn validate_title(title: &str) -> Result<&str, AppError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(AppError::invalid(
            "TITLE_EMPTY",
            "appointment title must not be empty",
        ));
    }
    if trimmed.chars().count() > MAX_TITLE_LEN {
        return Err(AppError::invalid(
            "TITLE_TOO_LONG",
            format!("appointment title exceeds {MAX_TITLE_LEN} characters"),
        ));
    }
    Ok(trimmed)
}

/// Validate `title` and store a new appointment on `date`.
pub async fn schedule<C: TransactionTrait>(
    conn: &C,
    title: &str,
    date: Date,
) -> Result<appointments::Model, AppError> {
    let title = validate_title(title)?.to_string();

    let created = with_txn(conn, |txn| {
        Box::pin(async move { Ok(appointments_repo::create(txn, &title, date).await?) })
    })
    .await?;

    debug!(
        "appointment=scheduled id={} scheduled_on={}",
        created.id, created.scheduled_on
    );
    Ok(created)
}

/// Remove appointment `id`, failing with `NotFound` if it does not exist.
pub async fn cancel<C: TransactionTrait>(conn: &C, id: i32) -> Result<(), AppError> {
    with_txn(conn, |txn| {
        Box::pin(async move {
            let Some(existing) = appointments_repo::find_by_id(txn, id).await? else {
                return Err(AppError::not_found(
                    "APPOINTMENT_NOT_FOUND",
                    format!("appointment {id} not found"),
                ));
            };
            appointments::Entity::delete_by_id(existing.id)
                .exec(txn)
                .await?;
            Ok(())
        })
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_title_trims() {
        assert_eq!(validate_title("  standup  ").unwrap(), "standup");
    }

    #[test]
    fn test_validate_title_rejects_blank_and_long() {
        let blank = validate_title("   ").unwrap_err();
        assert_eq!(blank.code(), "TITLE_EMPTY");

        let long = "x".repeat(MAX_TITLE_LEN + 1);
        let err = validate_title(&long).unwrap_err();
        assert_eq!(err.code(), "TITLE_TOO_LONG");
    }
}
