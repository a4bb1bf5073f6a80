//! Jaipur Match Server
//!
//! Authoritative match engine for two-player Jaipur games over WebSocket.

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use jaipur::{GameServer, ServerConfig, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let default_level = if cfg!(feature = "debug-tracing") { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = ServerConfig::from_env();
    info!("Jaipur Server v{}", VERSION);
    info!(
        bind = %config.bind_addr,
        max_connections = config.max_connections,
        seeded = config.rng_seed.is_some(),
        "Configuration loaded"
    );

    let server = GameServer::new(config);

    tokio::select! {
        result = server.run() => {
            result.context("game server stopped")?;
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for ctrl-c")?;
            info!("Ctrl-C received, shutting down");
            server.shutdown();
        }
    }

    Ok(())
}
