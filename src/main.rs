//!
//! Fleet coordinator daemon: TCP front end for a fleet of EV charging
//! stations. Reads configuration from a TOML file
//! (~/.config/fleet-coordinator/config.toml).

use std::sync::Arc;

use sea_orm_migration::MigratorTrait;
use tracing::{error, info, warn};

use fleet_coordinator::config::AppConfig;
use fleet_coordinator::coordinator::{
    CommandDispatcher, HeartbeatMonitor, SessionLedger, TransitionGuard,
};
use fleet_coordinator::infrastructure::database::migrator::Migrator;
use fleet_coordinator::protocol::{CoordinatorContext, ProtocolServer};
use fleet_coordinator::registry::ConnectionRegistry;
use fleet_coordinator::support::shutdown::{listen_for_shutdown_signals, ShutdownSignal};
use fleet_coordinator::{default_config_path, init_database};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Load configuration ─────────────────────────────────────
    let config_path = std::env::var("FLEET_CONFIG")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| default_config_path());
    let app_cfg = match AppConfig::load(&config_path) {
        Ok(cfg) => {
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.logging.level)),
                )
                .init();
            info!("Configuration loaded from {}", config_path.display());
            cfg
        }
        Err(e) => {
            tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::new("info"))
                .init();
            error!("Failed to load config: {}. Using defaults.", e);
            AppConfig::default()
        }
    };

    info!("Starting fleet coordinator...");

    // ── Database ───────────────────────────────────────────────
    let db_config = app_cfg.database_config();
    info!("Database: {}", db_config.url);

    let db = match init_database(&db_config).await {
        Ok(db) => db,
        Err(e) => {
            error!("Failed to connect to database: {}", e);
            return Err(e.into());
        }
    };

    info!("Running database migrations...");
    if let Err(e) = Migrator::up(&db, None).await {
        error!("Failed to run migrations: {}", e);
        return Err(e.into());
    }
    info!("Migrations completed");

    // Seed a demo fleet on an empty database so the agent has
    // something to connect to out of the box
    seed_demo_stations(&db).await;

    // ── Coordinator core ───────────────────────────────────────
    let registry = ConnectionRegistry::shared();
    let guard = Arc::new(TransitionGuard::new(db.clone()));
    let ledger = Arc::new(SessionLedger::new(db.clone()));

    let liveness = app_cfg.liveness_config();
    let dispatcher = CommandDispatcher::shared(registry.clone(), liveness.offline_after_secs);

    let ctx = CoordinatorContext {
        guard,
        ledger,
        registry: registry.clone(),
        dispatcher,
    };

    // ── Shutdown handling ──────────────────────────────────────
    let shutdown = ShutdownSignal::new();
    tokio::spawn(listen_for_shutdown_signals(shutdown.clone()));

    // ── Background liveness sweep ──────────────────────────────
    let heartbeat_monitor = HeartbeatMonitor::new(registry, liveness);
    heartbeat_monitor.start(shutdown.clone());

    // ── Protocol server ────────────────────────────────────────
    let server = ProtocolServer::new(app_cfg.protocol_config(), ctx)
        .with_shutdown(shutdown.clone())
        .bind()
        .await?;

    info!("Coordinator started. Press Ctrl+C to shutdown gracefully.");

    if let Err(e) = server.run().await {
        error!("Protocol server error: {}", e);
    }

    // ── Final cleanup ──────────────────────────────────────────
    if let Err(e) = db.close().await {
        warn!("Error closing database connection: {}", e);
    } else {
        info!("Database connection closed");
    }

    info!("Fleet coordinator shutdown complete");
    Ok(())
}

/// Insert a small demo fleet when the stations table is empty.
async fn seed_demo_stations(db: &sea_orm::DatabaseConnection) {
    use fleet_coordinator::infrastructure::database::entities::station;
    use sea_orm::{ActiveModelTrait, EntityTrait, PaginatorTrait, Set};

    let count = station::Entity::find().count(db).await.unwrap_or(0);
    if count > 0 {
        return;
    }

    info!("Stations table empty, seeding demo fleet...");
    for (id, power) in [(1, 11.0), (2, 22.0), (3, 50.0)] {
        let model = station::ActiveModel {
            id: Set(id),
            power: Set(power),
            power_consumption: Set(0.0),
            status: Set("free".to_string()),
            reserved_by: Set(None),
            using_by: Set(None),
            last_connection: Set(None),
        };
        match model.insert(db).await {
            Ok(_) => info!(station_id = id, power, "Seeded station"),
            Err(e) => warn!(station_id = id, error = %e, "Failed to seed station"),
        }
    }
}
