//! State machine and ledger tests against an in-memory database.

use std::sync::Arc;

use chrono::{Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectOptions, Database, DatabaseConnection, EntityTrait,
    QueryFilter, Set,
};
use sea_orm_migration::MigratorTrait;

use fleet_coordinator::coordinator::{SessionLedger, TransitionGuard};
use fleet_coordinator::domain::{ConflictReason, DomainError, StationStatus};
use fleet_coordinator::infrastructure::database::entities::{session, station};
use fleet_coordinator::infrastructure::database::migrator::Migrator;

async fn test_db() -> DatabaseConnection {
    // a single pooled connection keeps the in-memory database alive
    // and shared across tasks
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).sqlx_logging(false);
    let db = Database::connect(options).await.unwrap();
    Migrator::up(&db, None).await.unwrap();
    db
}

async fn seed_station(db: &DatabaseConnection, id: i64, power: f64) {
    station::ActiveModel {
        id: Set(id),
        power: Set(power),
        power_consumption: Set(0.0),
        status: Set("free".to_string()),
        reserved_by: Set(None),
        using_by: Set(None),
        last_connection: Set(None),
    }
    .insert(db)
    .await
    .unwrap();
}

async fn fetch_station(db: &DatabaseConnection, id: i64) -> station::Model {
    station::Entity::find_by_id(id).one(db).await.unwrap().unwrap()
}

/// Backdate the open session so elapsed-time energy is measurable.
async fn backdate_open_session(db: &DatabaseConnection, station_id: i64, hours: i64) {
    let open = session::Entity::find()
        .filter(session::Column::StationId.eq(station_id))
        .filter(session::Column::EndTime.is_null())
        .one(db)
        .await
        .unwrap()
        .unwrap();
    let mut active: session::ActiveModel = open.into();
    active.start_time = Set(Utc::now() - Duration::hours(hours));
    active.update(db).await.unwrap();
}

#[tokio::test]
async fn reserve_conflicts_with_existing_reservation() {
    let db = test_db().await;
    seed_station(&db, 1, 11.0).await;
    let guard = TransitionGuard::new(db.clone());

    guard.reserve(1, 1).await.unwrap();

    let err = guard.reserve(1, 2).await.unwrap_err();
    assert!(matches!(
        err,
        DomainError::Conflict {
            reason: ConflictReason::AlreadyReserved
        }
    ));

    // the loser changed nothing
    let row = fetch_station(&db, 1).await;
    assert_eq!(row.status, "reserved");
    assert_eq!(row.reserved_by, Some(1));
}

#[tokio::test]
async fn concurrent_reserves_admit_exactly_one() {
    let db = test_db().await;
    seed_station(&db, 1, 11.0).await;
    let guard = Arc::new(TransitionGuard::new(db.clone()));

    let first = tokio::spawn({
        let guard = guard.clone();
        async move { guard.reserve(1, 1).await }
    });
    let second = tokio::spawn({
        let guard = guard.clone();
        async move { guard.reserve(1, 2).await }
    });

    let outcomes = [first.await.unwrap(), second.await.unwrap()];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);

    let row = fetch_station(&db, 1).await;
    assert_eq!(row.status, "reserved");
    assert!(row.reserved_by == Some(1) || row.reserved_by == Some(2));
}

#[tokio::test]
async fn start_honors_reservation_ownership() {
    let db = test_db().await;
    seed_station(&db, 1, 11.0).await;
    let guard = TransitionGuard::new(db.clone());

    guard.reserve(1, 1).await.unwrap();

    let err = guard.start(1, 2).await.unwrap_err();
    assert!(matches!(err, DomainError::OwnershipViolation { station_id: 1 }));

    let outcome = guard.start(1, 1).await.unwrap();
    assert_eq!(outcome.user_id, 1);

    let row = fetch_station(&db, 1).await;
    assert_eq!(row.status, "busy");
    assert_eq!(row.using_by, Some(1));
    assert_eq!(row.reserved_by, None);
}

#[tokio::test]
async fn start_from_free_needs_no_reservation() {
    let db = test_db().await;
    seed_station(&db, 1, 11.0).await;
    let guard = TransitionGuard::new(db.clone());

    guard.start(1, 7).await.unwrap();
    assert_eq!(fetch_station(&db, 1).await.status, "busy");
}

#[tokio::test]
async fn stop_by_non_owner_leaves_state_unchanged() {
    let db = test_db().await;
    seed_station(&db, 1, 11.0).await;
    let guard = TransitionGuard::new(db.clone());

    guard.start(1, 1).await.unwrap();

    let err = guard.stop(1, 2, None).await.unwrap_err();
    assert!(matches!(err, DomainError::OwnershipViolation { station_id: 1 }));

    let row = fetch_station(&db, 1).await;
    assert_eq!(row.status, "busy");
    assert_eq!(row.using_by, Some(1));
}

#[tokio::test]
async fn stop_computes_energy_from_elapsed_time() {
    let db = test_db().await;
    seed_station(&db, 1, 10.0).await;
    let guard = TransitionGuard::new(db.clone());

    let started = guard.start(1, 1).await.unwrap();
    backdate_open_session(&db, 1, 1).await;

    let outcome = guard.stop(1, 1, None).await.unwrap();
    assert_eq!(outcome.session_id, started.session_id);
    // 10 kW for one hour
    assert!((outcome.energy_consumed - 10.0).abs() < 0.01);
    assert!((outcome.end_electricity_meter - 10.0).abs() < 0.01);

    let row = fetch_station(&db, 1).await;
    assert_eq!(row.status, "free");
    assert_eq!(row.reserved_by, None);
    assert_eq!(row.using_by, None);
    assert!((row.power_consumption - 10.0).abs() < 0.01);

    let closed = session::Entity::find_by_id(started.session_id)
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    assert!(closed.end_time.is_some());
    assert!((closed.energy_consumed.unwrap() - 10.0).abs() < 0.01);
}

#[tokio::test]
async fn reported_reading_wins_over_elapsed_time() {
    let db = test_db().await;
    seed_station(&db, 1, 10.0).await;
    let guard = TransitionGuard::new(db.clone());

    guard.start(1, 1).await.unwrap();
    backdate_open_session(&db, 1, 2).await;

    let outcome = guard.stop(1, 1, Some(3.5)).await.unwrap();
    assert!((outcome.energy_consumed - 3.5).abs() < 1e-9);
    assert!((fetch_station(&db, 1).await.power_consumption - 3.5).abs() < 1e-9);
}

#[tokio::test]
async fn session_closes_exactly_once() {
    let db = test_db().await;
    seed_station(&db, 1, 11.0).await;
    let guard = TransitionGuard::new(db.clone());

    guard.start(1, 1).await.unwrap();
    guard.stop(1, 1, Some(1.0)).await.unwrap();

    let err = guard.stop(1, 1, Some(1.0)).await.unwrap_err();
    assert!(matches!(
        err,
        DomainError::Conflict {
            reason: ConflictReason::NotCharging
        }
    ));
}

#[tokio::test]
async fn cancel_requires_the_reservation_owner() {
    let db = test_db().await;
    seed_station(&db, 1, 11.0).await;
    let guard = TransitionGuard::new(db.clone());

    guard.reserve(1, 1).await.unwrap();

    let err = guard.cancel(1, 2).await.unwrap_err();
    assert!(matches!(err, DomainError::OwnershipViolation { station_id: 1 }));

    let station = guard.cancel(1, 1).await.unwrap();
    assert_eq!(station.status, StationStatus::Free);
    assert_eq!(station.reserved_by, None);
}

#[tokio::test]
async fn unknown_station_is_reported_as_not_found() {
    let db = test_db().await;
    let guard = TransitionGuard::new(db.clone());

    let err = guard.start(42, 1).await.unwrap_err();
    assert!(matches!(err, DomainError::StationNotFound(42)));
}

#[tokio::test]
async fn update_energy_is_monotonic() {
    let db = test_db().await;
    seed_station(&db, 1, 11.0).await;
    let guard = TransitionGuard::new(db.clone());
    let ledger = SessionLedger::new(db.clone());

    let started = guard.start(1, 1).await.unwrap();

    ledger.update_energy(1, started.session_id, 1, 5.0).await.unwrap();
    // equal is fine, a clock hiccup on the station is not an error
    ledger.update_energy(1, started.session_id, 1, 5.0).await.unwrap();

    let err = ledger
        .update_energy(1, started.session_id, 1, 4.0)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DomainError::Conflict {
            reason: ConflictReason::EnergyRegression
        }
    ));

    // the recorded figure survives the rejected report
    let row = session::Entity::find_by_id(started.session_id)
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.energy_consumed, Some(5.0));
}

#[tokio::test]
async fn update_energy_rejects_closed_sessions_and_wrong_owners() {
    let db = test_db().await;
    seed_station(&db, 1, 11.0).await;
    let guard = TransitionGuard::new(db.clone());
    let ledger = SessionLedger::new(db.clone());

    let started = guard.start(1, 1).await.unwrap();

    let err = ledger
        .update_energy(1, started.session_id, 2, 1.0)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::OwnershipViolation { station_id: 1 }));

    guard.stop(1, 1, Some(1.0)).await.unwrap();
    let err = ledger
        .update_energy(1, started.session_id, 1, 2.0)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::SessionNotFound(1)));
}

#[tokio::test]
async fn session_history_is_newest_first() {
    let db = test_db().await;
    seed_station(&db, 1, 11.0).await;
    let guard = TransitionGuard::new(db.clone());
    let ledger = SessionLedger::new(db.clone());

    let first = guard.start(1, 1).await.unwrap();
    guard.stop(1, 1, Some(1.0)).await.unwrap();
    let second = guard.start(1, 2).await.unwrap();

    let history = ledger.sessions_for_station(1).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, second.session_id);
    assert!(history[0].is_open());
    assert_eq!(history[1].id, first.session_id);
    assert!(!history[1].is_open());

    let found = ledger.find_session(first.session_id).await.unwrap().unwrap();
    assert_eq!(found.energy_consumed, Some(1.0));
    assert!(ledger.find_session(999).await.unwrap().is_none());
}

#[tokio::test]
async fn set_power_persists_and_stop_uses_it() {
    let db = test_db().await;
    seed_station(&db, 1, 10.0).await;
    let guard = TransitionGuard::new(db.clone());

    let station = guard.set_power(1, 20.0).await.unwrap();
    assert_eq!(station.power, 20.0);

    guard.start(1, 1).await.unwrap();
    backdate_open_session(&db, 1, 1).await;

    let outcome = guard.stop(1, 1, None).await.unwrap();
    assert!((outcome.energy_consumed - 20.0).abs() < 0.01);
}
