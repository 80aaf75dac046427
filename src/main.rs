//! request-observer
//!
//! Serves a minimal status application behind the access logging stack.
//!
//! ```text
//! CLI args + TOML config
//!     → validate
//!     → init tracing subscriber
//!     → bind listener
//!     → HttpServer (request id → observer → timeout → routes)
//!     → SIGINT/SIGTERM → graceful shutdown
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use request_observer::config::{load_config, validation::validate_config, ConfigError};
use request_observer::http::server::status_routes;
use request_observer::lifecycle::signals::wait_for_termination;
use request_observer::observability::logging::init_logging;
use request_observer::{HttpServer, ServerConfig, Shutdown};

#[derive(Parser, Debug)]
#[command(name = "request-observer", version, about = "HTTP server with structured access logs")]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(long)]
    bind: Option<String>,

    /// Override `observability.log_level`.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }
    if let Some(level) = args.log_level {
        config.observability.log_level = level;
    }
    validate_config(&config).map_err(ConfigError::Validation)?;

    init_logging(&config.observability)?;

    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.timeouts.request_secs,
        access_log_sink = ?config.access_log.sink,
        generate_request_id = config.request_id.generate,
        "Configuration loaded"
    );

    let listener = TcpListener::bind(&config.listener.bind_address).await?;

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config, status_routes());
    let server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    wait_for_termination().await;
    shutdown.trigger();
    server_task.await??;

    tracing::info!("Shutdown complete");
    Ok(())
}
