//! Appointment queries (generic over ConnectionTrait).

use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Select, Set,
};
use time::Date;

use crate::entities::appointments::{self, Column, Entity};

/// Appointments scheduled on `date`. Compose further filters onto it.
pub fn scheduled_on(date: Date) -> Select<Entity> {
    Entity::find().filter(Column::ScheduledOn.eq(date))
}

pub async fn find_scheduled_on<C: ConnectionTrait + Send + Sync>(
    conn: &C,
    date: Date,
) -> Result<Vec<appointments::Model>, DbErr> {
    scheduled_on(date)
        .order_by_asc(Column::Id)
        .all(conn)
        .await
}

pub async fn find_by_id<C: ConnectionTrait + Send + Sync>(
    conn: &C,
    id: i32,
) -> Result<Option<appointments::Model>, DbErr> {
    Entity::find_by_id(id).one(conn).await
}

pub async fn create<C: ConnectionTrait + Send + Sync>(
    conn: &C,
    title: &str,
    date: Date,
) -> Result<appointments::Model, DbErr> {
    appointments::ActiveModel {
        title: Set(title.to_string()),
        scheduled_on: Set(date),
        ..Default::default()
    }
    .insert(conn)
    .await
}

pub async fn count_titled<C: ConnectionTrait + Send + Sync>(
    conn: &C,
    title: &str,
) -> Result<u64, DbErr> {
    Entity::find()
        .filter(Column::Title.eq(title))
        .count(conn)
        .await
}

/// Returns the number of rows removed.
pub async fn delete_titled<C: ConnectionTrait + Send + Sync>(
    conn: &C,
    title: &str,
) -> Result<u64, DbErr> {
    let res = Entity::delete_many()
        .filter(Column::Title.eq(title))
        .exec(conn)
        .await?;
    Ok(res.rows_affected)
}
