//! Transition guard: the station status state machine
//!
//! Every transition is one transaction: read the station row under a
//! pessimistic lock, validate against the state machine, write, commit.
//! Concurrent callers serialize on the row lock, so no one ever acts on
//! a stale status. Early returns drop the transaction, which rolls it
//! back and leaves state untouched.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use tracing::info;

use crate::domain::{energy_for_elapsed, DomainError, DomainResult, Station, StationStatus};
use crate::infrastructure::database::entities::{session, station};

use super::ledger;

/// Result of a successful `start` transition.
#[derive(Debug, Clone, PartialEq)]
pub struct StartOutcome {
    pub session_id: i64,
    pub user_id: i64,
}

/// Result of a successful `stop` transition.
#[derive(Debug, Clone, PartialEq)]
pub struct StopOutcome {
    pub session_id: i64,
    /// kWh folded into the station's cumulative meter
    pub energy_consumed: f64,
    pub end_electricity_meter: f64,
}

/// Serializes all status/ownership mutations for a station.
pub struct TransitionGuard {
    db: DatabaseConnection,
}

impl TransitionGuard {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Load the station row with `SELECT ... FOR UPDATE` inside `txn`.
    async fn load_locked(
        txn: &DatabaseTransaction,
        station_id: i64,
    ) -> DomainResult<station::Model> {
        station::Entity::find_by_id(station_id)
            .lock_exclusive()
            .one(txn)
            .await?
            .ok_or(DomainError::StationNotFound(station_id))
    }

    /// free → reserved
    pub async fn reserve(&self, station_id: i64, user_id: i64) -> DomainResult<Station> {
        let txn = self.db.begin().await?;
        let model = Self::load_locked(&txn, station_id).await?;
        Station::from(model.clone()).check_reserve()?;

        let mut active: station::ActiveModel = model.into();
        active.status = Set(StationStatus::Reserved.as_str().to_string());
        active.reserved_by = Set(Some(user_id));
        let updated = active.update(&txn).await?;
        txn.commit().await?;

        info!(station_id, user_id, "Station reserved");
        Ok(updated.into())
    }

    /// reserved → free
    pub async fn cancel(&self, station_id: i64, user_id: i64) -> DomainResult<Station> {
        let txn = self.db.begin().await?;
        let model = Self::load_locked(&txn, station_id).await?;
        Station::from(model.clone()).check_cancel(user_id)?;

        let mut active: station::ActiveModel = model.into();
        active.status = Set(StationStatus::Free.as_str().to_string());
        active.reserved_by = Set(None);
        let updated = active.update(&txn).await?;
        txn.commit().await?;

        info!(station_id, user_id, "Reservation cancelled");
        Ok(updated.into())
    }

    /// free → busy or reserved → busy; opens the session row with the
    /// station's current meter as its initial reading.
    pub async fn start(&self, station_id: i64, user_id: i64) -> DomainResult<StartOutcome> {
        let txn = self.db.begin().await?;
        let model = Self::load_locked(&txn, station_id).await?;
        Station::from(model.clone()).check_start(user_id)?;

        let initial_meter = model.power_consumption;
        let mut active: station::ActiveModel = model.into();
        active.status = Set(StationStatus::Busy.as_str().to_string());
        active.reserved_by = Set(None);
        active.using_by = Set(Some(user_id));
        active.update(&txn).await?;

        let session_id = ledger::open_session(&txn, station_id, user_id, initial_meter).await?;
        txn.commit().await?;

        info!(station_id, user_id, session_id, "Charging started");
        Ok(StartOutcome { session_id, user_id })
    }

    /// busy → free; closes the open session and advances the meter.
    ///
    /// `reported_energy` wins when the caller supplies a reading;
    /// otherwise the elapsed-time computation is authoritative.
    /// Telemetry updates never decide the final figure.
    pub async fn stop(
        &self,
        station_id: i64,
        user_id: i64,
        reported_energy: Option<f64>,
    ) -> DomainResult<StopOutcome> {
        let txn = self.db.begin().await?;
        let model = Self::load_locked(&txn, station_id).await?;
        Station::from(model.clone()).check_stop(user_id)?;

        let open = session::Entity::find()
            .filter(session::Column::StationId.eq(station_id))
            .filter(session::Column::EndTime.is_null())
            .one(&txn)
            .await?
            .ok_or(DomainError::SessionNotFound(station_id))?;

        let now = Utc::now();
        let energy = reported_energy
            .unwrap_or_else(|| energy_for_elapsed(model.power, open.start_time, now));
        let end_meter = open.initial_electricity_meter + energy;
        let session_id = open.id;

        ledger::close_session(&txn, open, now, energy, end_meter).await?;

        let meter = model.power_consumption;
        let mut active: station::ActiveModel = model.into();
        active.status = Set(StationStatus::Free.as_str().to_string());
        active.reserved_by = Set(None);
        active.using_by = Set(None);
        active.power_consumption = Set(meter + energy);
        active.update(&txn).await?;
        txn.commit().await?;

        info!(station_id, user_id, session_id, energy, "Charging stopped");
        Ok(StopOutcome {
            session_id,
            energy_consumed: energy,
            end_electricity_meter: end_meter,
        })
    }

    /// Operator command: change the rated power of a station.
    pub async fn set_power(&self, station_id: i64, power: f64) -> DomainResult<Station> {
        let txn = self.db.begin().await?;
        let model = Self::load_locked(&txn, station_id).await?;

        let mut active: station::ActiveModel = model.into();
        active.power = Set(power);
        let updated = active.update(&txn).await?;
        txn.commit().await?;

        info!(station_id, power, "Rated power updated");
        Ok(updated.into())
    }

    /// Plain read of one station. The row is authoritative for status.
    pub async fn station(&self, station_id: i64) -> DomainResult<Station> {
        station::Entity::find_by_id(station_id)
            .one(&self.db)
            .await?
            .map(Station::from)
            .ok_or(DomainError::StationNotFound(station_id))
    }

    /// All stations, ordered by id.
    pub async fn list_stations(&self) -> DomainResult<Vec<Station>> {
        let models = station::Entity::find()
            .order_by_asc(station::Column::Id)
            .all(&self.db)
            .await?;
        Ok(models.into_iter().map(Station::from).collect())
    }
}
