//! Tiny Healthcheck: standalone health check endpoint.
//!
//! Loads an optional TOML config, applies CLI overrides, initializes tracing and
//! serves a fixed health response until SIGINT/SIGTERM.

use clap::Parser;

use tiny_healthcheck::config::SHUTDOWN_GRACE_PERIOD;
use tiny_healthcheck::http::setup_shutdown_handler;
use tiny_healthcheck::logging::{init_tracing, resolve_filter};
use tiny_healthcheck::{AppConfig, HealthReport, HealthServer, StaticHealth};

/// Tiny Healthcheck: a non-blocking health check HTTP endpoint
#[derive(Parser, Debug)]
#[command(name = "tiny-healthcheck", version, about)]
struct Args {
    /// Path to configuration file (defaults are used when omitted)
    #[arg(short, long)]
    config: Option<String>,

    /// Log level filter (e.g., "tiny_healthcheck=debug")
    #[arg(short, long)]
    log_level: Option<String>,

    /// Bind address, overrides server.host
    #[arg(long)]
    host: Option<String>,

    /// Listening port, overrides server.port
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
    port: Option<u16>,

    /// Health check URL path, overrides server.path
    #[arg(long)]
    path: Option<String>,
}

impl Args {
    fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(path) = &self.path {
            config.server.path = path.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    args.apply_overrides(&mut config);
    config.validate()?;

    let log_filter = resolve_filter(args.log_level.clone(), std::env::var("RUST_LOG").ok());
    init_tracing(&log_filter, &config.logging)?;

    tracing::info!(
        config_file = args.config.as_deref().unwrap_or("<defaults>"),
        host = %config.server.host,
        port = config.server.port,
        path = %config.server.path,
        "Loaded configuration"
    );

    let report = HealthReport::from_u16(config.response.status, config.response.body.clone())?;
    let server = HealthServer::new(StaticHealth::new(report), config.server.clone());

    setup_shutdown_handler(server.clone(), SHUTDOWN_GRACE_PERIOD);

    server.start().await?;

    Ok(())
}
