//! Message routing: one request in, exactly one reply out
//!
//! Requests arrive on two listeners: station links and the trusted
//! operator/API port. Each listener accepts its own subset of actions;
//! anything else gets a structured error reply and the connection
//! stays open.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::coordinator::{SessionLedger, SharedCommandDispatcher, TransitionGuard};
use crate::domain::{DomainError, StationStatus};
use crate::protocol::message::{Reply, Request, StationCommand, StationInfo};
use crate::registry::{ChannelKind, SharedConnectionRegistry};

/// Everything a connection handler needs to service requests.
#[derive(Clone)]
pub struct CoordinatorContext {
    pub guard: Arc<TransitionGuard>,
    pub ledger: Arc<SessionLedger>,
    pub registry: SharedConnectionRegistry,
    pub dispatcher: SharedCommandDispatcher,
}

impl From<DomainError> for Reply {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::Database(ref db) => {
                // internal detail stays out of the wire reply
                warn!(error = %db, "Persistence failure");
                Reply::error("internal error")
            }
            other => Reply::error(other.to_string()),
        }
    }
}

fn result_reply(result: Result<Reply, DomainError>) -> Reply {
    result.unwrap_or_else(Reply::from)
}

/// Handle one request on a station link.
///
/// `sender` is the connection's writer-task handle; `init` and
/// `register_command` register it so replies and pushed commands share
/// one writer.
pub async fn handle_station(
    req: Request,
    ctx: &CoordinatorContext,
    sender: &mpsc::UnboundedSender<String>,
) -> Reply {
    match req {
        Request::Init { station_id } => result_reply(init_station(ctx, station_id, sender).await),
        Request::RegisterCommand { station_id } => {
            result_reply(register_command(ctx, station_id, sender).await)
        }
        Request::Heartbeat { station_id } => result_reply(heartbeat(ctx, station_id).await),
        Request::Update {
            station_id,
            session_id,
            user_id,
            energy_consumed,
        } => {
            ctx.registry.touch(station_id);
            result_reply(
                ctx.ledger
                    .update_energy(station_id, session_id, user_id, energy_consumed)
                    .await
                    .map(|_| Reply::success()),
            )
        }
        Request::GetStatus { station_id } => result_reply(get_status(ctx, station_id).await),
        other => {
            warn!(action = other.action(), "Operator action on station channel");
            Reply::error(format!(
                "action '{}' is not accepted on the station channel",
                other.action()
            ))
        }
    }
}

/// Handle one request on the trusted operator/API link.
pub async fn handle_operator(req: Request, ctx: &CoordinatorContext) -> Reply {
    match req {
        Request::Reserve { station_id, user_id } => result_reply(
            ctx.guard
                .reserve(station_id, user_id)
                .await
                .map(|station| {
                    Reply::success()
                        .with_message("Station reserved")
                        .with_station_status(station.status)
                }),
        ),
        Request::Cancel { station_id, user_id } => result_reply(
            ctx.guard
                .cancel(station_id, user_id)
                .await
                .map(|station| {
                    Reply::success()
                        .with_message("Reservation cancelled")
                        .with_station_status(station.status)
                }),
        ),
        Request::StartCharging { station_id, user_id } => {
            result_reply(start_charging(ctx, station_id, user_id).await)
        }
        Request::StopCharging {
            station_id,
            user_id,
            energy_consumed,
        } => result_reply(stop_charging(ctx, station_id, user_id, energy_consumed).await),
        Request::SetPower { station_id, power } => {
            result_reply(set_power(ctx, station_id, power).await)
        }
        Request::GetStatus { station_id } => result_reply(get_status(ctx, station_id).await),
        Request::ListStations => result_reply(list_stations(ctx).await),
        other => {
            warn!(action = other.action(), "Station action on operator channel");
            Reply::error(format!(
                "action '{}' is not accepted on the operator channel",
                other.action()
            ))
        }
    }
}

// ── Station actions ────────────────────────────────────────────

async fn init_station(
    ctx: &CoordinatorContext,
    station_id: i64,
    sender: &mpsc::UnboundedSender<String>,
) -> Result<Reply, DomainError> {
    let station = ctx.guard.station(station_id).await?;

    // busy stations get their open session back so the local counter
    // resumes without double-counting
    let snapshot = if station.status == StationStatus::Busy {
        ctx.ledger
            .open_session_for_station(station_id)
            .await?
            .map(|s| s.snapshot())
    } else {
        None
    };

    ctx.registry
        .register(station_id, ChannelKind::Data, sender.clone());
    info!(station_id, status = %station.status, "Station initialized");

    let mut reply = Reply::success()
        .with_message("Station initialized")
        .with_station_status(station.status);
    reply.power = Some(station.power);
    reply.power_consumption = Some(station.power_consumption);
    reply.current_session = snapshot;
    Ok(reply)
}

async fn register_command(
    ctx: &CoordinatorContext,
    station_id: i64,
    sender: &mpsc::UnboundedSender<String>,
) -> Result<Reply, DomainError> {
    // refuse unknown ids so the registry never carries ghost entries
    ctx.guard.station(station_id).await?;
    ctx.registry
        .register(station_id, ChannelKind::Command, sender.clone());
    Ok(Reply::success().with_message("Command channel registered"))
}

async fn heartbeat(ctx: &CoordinatorContext, station_id: i64) -> Result<Reply, DomainError> {
    ctx.registry.touch(station_id);
    ctx.ledger.touch_last_connection(station_id).await?;
    Ok(Reply::success())
}

async fn get_status(ctx: &CoordinatorContext, station_id: i64) -> Result<Reply, DomainError> {
    let station = ctx.guard.station(station_id).await?;
    Ok(Reply::success().with_station_status(station.status))
}

// ── Operator actions ───────────────────────────────────────────

async fn start_charging(
    ctx: &CoordinatorContext,
    station_id: i64,
    user_id: i64,
) -> Result<Reply, DomainError> {
    let outcome = ctx.guard.start(station_id, user_id).await?;

    // dispatch is best-effort and strictly after commit; a miss never
    // unwinds the transition
    let delivered = ctx.dispatcher.send(
        station_id,
        &StationCommand::StartCharging {
            session_id: outcome.session_id,
            user_id,
        },
    );

    let message = if delivered {
        "Charging started"
    } else {
        "Charging started, station not connected"
    };
    Ok(Reply::success()
        .with_message(message)
        .with_session_id(outcome.session_id))
}

async fn stop_charging(
    ctx: &CoordinatorContext,
    station_id: i64,
    user_id: i64,
    reported_energy: Option<f64>,
) -> Result<Reply, DomainError> {
    let outcome = ctx.guard.stop(station_id, user_id, reported_energy).await?;

    let delivered = ctx
        .dispatcher
        .send(station_id, &StationCommand::StopCharging { user_id });

    let message = if delivered {
        "Charging stopped"
    } else {
        "Charging stopped, station not connected"
    };
    Ok(Reply::success()
        .with_message(message)
        .with_session_id(outcome.session_id)
        .with_energy(outcome.energy_consumed))
}

async fn set_power(
    ctx: &CoordinatorContext,
    station_id: i64,
    power: f64,
) -> Result<Reply, DomainError> {
    let station = ctx.guard.set_power(station_id, power).await?;
    ctx.dispatcher
        .send(station_id, &StationCommand::SetPower { power });

    let mut reply = Reply::success().with_message("Power updated");
    reply.power = Some(station.power);
    Ok(reply)
}

async fn list_stations(ctx: &CoordinatorContext) -> Result<Reply, DomainError> {
    let stations = ctx
        .guard
        .list_stations()
        .await?
        .into_iter()
        .map(|s| StationInfo {
            connected: ctx.registry.is_connected(s.id),
            id: s.id,
            power: s.power,
            status: s.status,
        })
        .collect();

    let mut reply = Reply::success();
    reply.stations = Some(stations);
    Ok(reply)
}
