use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(Iden)]
enum Appointments {
    Table,
    Id,
    Title,
    ScheduledOn,
}

const IDX_SCHEDULED_ON: &str = "idx_appointments_scheduled_on";

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Appointments::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Appointments::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Appointments::Title).string().not_null())
                    .col(ColumnDef::new(Appointments::ScheduledOn).date().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name(IDX_SCHEDULED_ON)
                    .table(Appointments::Table)
                    .col(Appointments::ScheduledOn)
                    .to_owned(),
            )
            .await
    }

    // The index goes away with its table.
    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Appointments::Table).to_owned())
            .await
    }
}
