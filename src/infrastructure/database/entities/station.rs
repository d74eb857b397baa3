//! ChargingStation entity

use sea_orm::entity::prelude::*;
use tracing::warn;

use crate::domain::{Station, StationStatus};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "charging_stations")]
pub struct Model {
    /// Station ids are provisioned externally, never auto-assigned
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i64,

    /// Rated power in kW
    #[sea_orm(column_type = "Double")]
    pub power: f64,

    /// Cumulative meter in kWh
    #[sea_orm(column_type = "Double")]
    pub power_consumption: f64,

    /// Status: free, reserved, busy
    pub status: String,

    #[sea_orm(nullable)]
    pub reserved_by: Option<i64>,

    #[sea_orm(nullable)]
    pub using_by: Option<i64>,

    #[sea_orm(nullable)]
    pub last_connection: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::session::Entity")]
    Sessions,
}

impl Related<super::session::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Sessions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for Station {
    fn from(m: Model) -> Self {
        let status = StationStatus::parse(&m.status).unwrap_or_else(|| {
            warn!(
                station_id = m.id,
                status = %m.status,
                "Unrecognized stored station status, treating as free"
            );
            StationStatus::Free
        });
        Station {
            id: m.id,
            power: m.power,
            power_consumption: m.power_consumption,
            status,
            reserved_by: m.reserved_by,
            using_by: m.using_by,
            last_connection: m.last_connection,
        }
    }
}
