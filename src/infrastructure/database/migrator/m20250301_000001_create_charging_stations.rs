//! Create charging_stations table

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ChargingStations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ChargingStations::Id)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ChargingStations::Power)
                            .double()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ChargingStations::PowerConsumption)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(ChargingStations::Status)
                            .string()
                            .not_null()
                            .default("free"),
                    )
                    .col(ColumnDef::new(ChargingStations::ReservedBy).big_integer())
                    .col(ColumnDef::new(ChargingStations::UsingBy).big_integer())
                    .col(
                        ColumnDef::new(ChargingStations::LastConnection)
                            .timestamp_with_time_zone(),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ChargingStations::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum ChargingStations {
    Table,
    Id,
    Power,
    PowerConsumption,
    Status,
    ReservedBy,
    UsingBy,
    LastConnection,
}
