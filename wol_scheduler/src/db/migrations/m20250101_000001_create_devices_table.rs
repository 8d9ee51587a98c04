//! Migration to create the devices table

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Devices::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Devices::Id)
                            .char_len(36)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Devices::Name).string_len(100).not_null())
                    .col(ColumnDef::new(Devices::Mac).char_len(12).not_null())
                    .col(ColumnDef::new(Devices::InternalHost).string_len(255).null())
                    .col(
                        ColumnDef::new(Devices::InternalPort)
                            .integer()
                            .not_null()
                            .default(9),
                    )
                    .col(ColumnDef::new(Devices::ExternalHost).string_len(255).null())
                    .col(
                        ColumnDef::new(Devices::ExternalPort)
                            .integer()
                            .not_null()
                            .default(9),
                    )
                    .col(ColumnDef::new(Devices::StatusProbePort).integer().null())
                    .col(
                        ColumnDef::new(Devices::LastSeenAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Devices::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Devices::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Devices::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub(crate) enum Devices {
    Table,
    Id,
    Name,
    Mac,
    InternalHost,
    InternalPort,
    ExternalHost,
    ExternalPort,
    StatusProbePort,
    LastSeenAt,
    CreatedAt,
    UpdatedAt,
}
