//! Huddle server binary.
//!
//! # Usage
//!
//! ```bash
//! # Listen on 0.0.0.0:3000
//! huddle-server
//!
//! # Port from the environment (or a .env file)
//! PORT=8080 huddle-server --log-level debug
//! ```

use std::{
    net::{IpAddr, SocketAddr},
    time::Duration,
};

use clap::Parser;
use huddle_core::ConnectionConfig;
use huddle_server::{DriverConfig, Server, ServerRuntimeConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Huddle presence relay
#[derive(Parser, Debug)]
#[command(name = "huddle-server")]
#[command(about = "Real-time presence relay for shared rooms")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "3000")]
    port: u16,

    /// Maximum concurrent connections
    #[arg(long, default_value = "10000")]
    max_connections: usize,

    /// Close connections silent for this many seconds
    #[arg(long, default_value = "60")]
    idle_timeout_secs: u64,

    /// Interval between idle sweeps, in milliseconds
    #[arg(long, default_value = "1000")]
    tick_interval_ms: u64,

    /// Interval between WebSocket pings to each client, in milliseconds
    #[arg(long, default_value = "25000")]
    heartbeat_interval_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let bind_address = SocketAddr::new(args.bind, args.port).to_string();
    tracing::info!("Huddle server starting");
    tracing::info!("Binding to {}", bind_address);

    let config = ServerRuntimeConfig {
        bind_address,
        tick_interval: Duration::from_millis(args.tick_interval_ms),
        heartbeat_interval: Duration::from_millis(args.heartbeat_interval_ms),
        driver: DriverConfig {
            connection: ConnectionConfig {
                idle_timeout: Duration::from_secs(args.idle_timeout_secs),
            },
            max_connections: args.max_connections,
        },
    };

    let server = Server::bind(config).await?;

    tracing::info!("Server listening on {}", server.local_addr()?);

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutdown requested");
        })
        .await?;

    Ok(())
}
