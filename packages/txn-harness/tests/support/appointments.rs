//! A local mirror of the `appointments` table plus a few seeding helpers.

use sea_orm::entity::prelude::*;
use sea_orm::{PaginatorTrait, Set};
use time::macros::date;
use time::Date;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "appointments")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub title: String,
    pub scheduled_on: Date,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

pub async fn insert(conn: &impl ConnectionTrait, title: &str) -> Result<Model, DbErr> {
    ActiveModel {
        title: Set(title.to_string()),
        scheduled_on: Set(date!(2026 - 03 - 01)),
        ..Default::default()
    }
    .insert(conn)
    .await
}

pub async fn count_titled(conn: &impl ConnectionTrait, title: &str) -> Result<u64, DbErr> {
    Entity::find()
        .filter(Column::Title.eq(title))
        .count(conn)
        .await
}

pub async fn count_all(conn: &impl ConnectionTrait) -> Result<u64, DbErr> {
    Entity::find().count(conn).await
}
