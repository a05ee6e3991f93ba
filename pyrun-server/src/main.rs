//! pyrun server binary
//!
//! Serves the code execution API over HTTP.

use anyhow::{Context, Result};
use clap::Parser;
use pyrun_server::config::AppConfig;
use pyrun_server::{build_sandbox, create_router, serve, shutdown_signal, telemetry, AppState};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "pyrun-server", version, about = "Run untrusted Python snippets over HTTP")]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "PYRUN_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind, overriding configuration
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, overriding configuration
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut config = AppConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    config.validate()?;

    if args.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    let _telemetry = telemetry::init(&config.logging, args.verbose)?;
    info!("Starting pyrun server v{}", env!("CARGO_PKG_VERSION"));

    let sandbox = build_sandbox(&config).context("Failed to initialize sandbox")?;
    info!(
        max_concurrent = config.limits.max_concurrent_executions,
        max_wall_time = ?config.limits.max_wall_time,
        max_memory_bytes = config.limits.max_memory_bytes,
        "Sandbox ready"
    );

    let app = create_router(AppState::new(sandbox), &config.server);
    let listener = tokio::net::TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_address()))?;

    serve(listener, app, shutdown_signal()).await
}
