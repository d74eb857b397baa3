//! Session ledger: persisted record of charging sessions
//!
//! `open_session`/`close_session` run inside the transition guard's
//! transaction so the session row and the station row move together.
//! The telemetry path (`update_energy`) and the resync read run on
//! their own connection.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use tracing::debug;

use crate::domain::{ChargingSession, ConflictReason, DomainError, DomainResult};
use crate::infrastructure::database::entities::{session, station};

/// Insert the session row for a just-started charge. Returns the new id.
pub async fn open_session<C: ConnectionTrait>(
    conn: &C,
    station_id: i64,
    user_id: i64,
    initial_meter: f64,
) -> DomainResult<i64> {
    let model = session::ActiveModel {
        station_id: Set(station_id),
        user_id: Set(user_id),
        start_time: Set(Utc::now()),
        initial_electricity_meter: Set(initial_meter),
        ..Default::default()
    };
    let inserted = model.insert(conn).await?;
    Ok(inserted.id)
}

/// Close an open session with its final accounting.
pub async fn close_session<C: ConnectionTrait>(
    conn: &C,
    open: session::Model,
    end_time: DateTime<Utc>,
    energy_consumed: f64,
    end_meter: f64,
) -> DomainResult<()> {
    let mut active: session::ActiveModel = open.into();
    active.end_time = Set(Some(end_time));
    active.energy_consumed = Set(Some(energy_consumed));
    active.end_electricity_meter = Set(Some(end_meter));
    active.update(conn).await?;
    Ok(())
}

/// Read/telemetry surface of the ledger.
pub struct SessionLedger {
    db: DatabaseConnection,
}

impl SessionLedger {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Advisory energy report from the station for its open session.
    ///
    /// Accepted only while the session is open and owned by `user_id`.
    /// Reports below the recorded value are rejected: open-session energy
    /// is monotonically non-decreasing. Also stamps `last_connection`.
    pub async fn update_energy(
        &self,
        station_id: i64,
        session_id: i64,
        user_id: i64,
        energy: f64,
    ) -> DomainResult<()> {
        let open = session::Entity::find_by_id(session_id)
            .filter(session::Column::StationId.eq(station_id))
            .filter(session::Column::EndTime.is_null())
            .one(&self.db)
            .await?
            .ok_or(DomainError::SessionNotFound(station_id))?;

        if open.user_id != user_id {
            return Err(DomainError::OwnershipViolation { station_id });
        }
        if open.energy_consumed.is_some_and(|recorded| energy < recorded) {
            return Err(DomainError::conflict(ConflictReason::EnergyRegression));
        }

        debug!(station_id, session_id, energy, "Recording session energy");
        let mut active: session::ActiveModel = open.into();
        active.energy_consumed = Set(Some(energy));
        active.update(&self.db).await?;

        self.touch_last_connection(station_id).await
    }

    /// Stamp `last_connection` for a station (heartbeat path).
    pub async fn touch_last_connection(&self, station_id: i64) -> DomainResult<()> {
        let model = station::Entity::find_by_id(station_id)
            .one(&self.db)
            .await?
            .ok_or(DomainError::StationNotFound(station_id))?;

        let mut active: station::ActiveModel = model.into();
        active.last_connection = Set(Some(Utc::now()));
        active.update(&self.db).await?;
        Ok(())
    }

    /// The open session for a station, if any (the `init` resync read).
    pub async fn open_session_for_station(
        &self,
        station_id: i64,
    ) -> DomainResult<Option<ChargingSession>> {
        let model = session::Entity::find()
            .filter(session::Column::StationId.eq(station_id))
            .filter(session::Column::EndTime.is_null())
            .one(&self.db)
            .await?;
        Ok(model.map(ChargingSession::from))
    }

    pub async fn find_session(&self, session_id: i64) -> DomainResult<Option<ChargingSession>> {
        let model = session::Entity::find_by_id(session_id).one(&self.db).await?;
        Ok(model.map(ChargingSession::from))
    }

    /// Session history for one station, newest first.
    pub async fn sessions_for_station(
        &self,
        station_id: i64,
    ) -> DomainResult<Vec<ChargingSession>> {
        let models = session::Entity::find()
            .filter(session::Column::StationId.eq(station_id))
            .order_by_desc(session::Column::Id)
            .all(&self.db)
            .await?;
        Ok(models.into_iter().map(ChargingSession::from).collect())
    }
}
