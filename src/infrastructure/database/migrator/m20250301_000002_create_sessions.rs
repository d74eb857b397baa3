//! Create sessions table

use sea_orm_migration::prelude::*;

use super::m20250301_000001_create_charging_stations::ChargingStations;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Sessions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Sessions::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Sessions::StationId).big_integer().not_null())
                    .col(ColumnDef::new(Sessions::UserId).big_integer().not_null())
                    .col(
                        ColumnDef::new(Sessions::StartTime)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Sessions::EndTime).timestamp_with_time_zone())
                    .col(ColumnDef::new(Sessions::EnergyConsumed).double())
                    .col(
                        ColumnDef::new(Sessions::InitialElectricityMeter)
                            .double()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Sessions::EndElectricityMeter).double())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_sessions_station")
                            .from(Sessions::Table, Sessions::StationId)
                            .to(ChargingStations::Table, ChargingStations::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Open-session lookups filter on (station_id, end_time IS NULL)
        manager
            .create_index(
                Index::create()
                    .name("idx_sessions_station_open")
                    .table(Sessions::Table)
                    .col(Sessions::StationId)
                    .col(Sessions::EndTime)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Sessions::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Sessions {
    Table,
    Id,
    StationId,
    UserId,
    StartTime,
    EndTime,
    EnergyConsumed,
    InitialElectricityMeter,
    EndElectricityMeter,
}
