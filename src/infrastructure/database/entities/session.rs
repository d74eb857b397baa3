//! Charging session entity

use sea_orm::entity::prelude::*;

use crate::domain::ChargingSession;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "sessions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub station_id: i64,
    pub user_id: i64,

    pub start_time: DateTimeUtc,

    /// Null while the session is open
    #[sea_orm(nullable)]
    pub end_time: Option<DateTimeUtc>,

    /// kWh
    #[sea_orm(nullable, column_type = "Double")]
    pub energy_consumed: Option<f64>,

    /// Station meter snapshot at session start (kWh)
    #[sea_orm(column_type = "Double")]
    pub initial_electricity_meter: f64,

    #[sea_orm(nullable, column_type = "Double")]
    pub end_electricity_meter: Option<f64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::station::Entity",
        from = "Column::StationId",
        to = "super::station::Column::Id"
    )]
    Station,
}

impl Related<super::station::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Station.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for ChargingSession {
    fn from(m: Model) -> Self {
        ChargingSession {
            id: m.id,
            station_id: m.station_id,
            user_id: m.user_id,
            start_time: m.start_time,
            end_time: m.end_time,
            energy_consumed: m.energy_consumed,
            initial_electricity_meter: m.initial_electricity_meter,
            end_electricity_meter: m.end_electricity_meter,
        }
    }
}
