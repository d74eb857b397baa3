//!
//! Reference station agent: connects a simulated charging station to
//! the coordinator and keeps a local energy counter.
//!
//! Usage: `station-agent <station-id> [server-addr]`, or via the
//! `STATION_ID` / `FLEET_SERVER` environment variables.

use tracing::{error, info};

use fleet_coordinator::agent::{AgentConfig, StationAgent};

fn parse_args() -> Option<(i64, String)> {
    let mut args = std::env::args().skip(1);

    let station_id = args
        .next()
        .or_else(|| std::env::var("STATION_ID").ok())?
        .parse()
        .ok()?;
    let server_addr = args
        .next()
        .or_else(|| std::env::var("FLEET_SERVER").ok())
        .unwrap_or_else(|| "127.0.0.1:9090".to_string());

    Some((station_id, server_addr))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let Some((station_id, server_addr)) = parse_args() else {
        error!("Usage: station-agent <station-id> [server-addr]");
        std::process::exit(2);
    };

    info!(station_id, server = %server_addr, "Starting station agent");
    let agent = StationAgent::new(AgentConfig::new(station_id, server_addr));

    if let Err(e) = agent.run().await {
        error!("Agent stopped: {}", e);
        return Err(e.into());
    }
    Ok(())
}
