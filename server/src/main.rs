use anyhow::Context;
use cake_ledger::{Ledger, Sqlite};
use cake_server::{Api, Config};
use clap::Parser;
use std::{path::PathBuf, sync::Arc};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(short, long)]
    port: Option<u16>,

    /// Path of the SQLite database.
    #[arg(short, long)]
    database: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse args
    let args = Args::parse();

    // Load config
    let mut config = match &args.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("could not read config file {}", path.display()))?;
            serde_yaml::from_str::<Config>(&raw).context("could not parse config file")?
        }
        None => Config::default(),
    };
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(database) = args.database {
        config.database = database;
    }
    let config = config.validate().context("invalid config")?;

    // Create logger
    if config.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_max_level(config.log_level)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(config.log_level)
            .init();
    }

    // Open ledger
    let storage = Sqlite::open(&config.database, config.busy_timeout)
        .with_context(|| format!("failed to open database {}", config.database.display()))?;
    let ledger = Arc::new(Ledger::open(storage).context("failed to load ledger")?);
    let app = Api::new(ledger.clone(), config.max_body_bytes).router();

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Listening on {}", addr);
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("axum server error");

    // Close the ledger even if the server failed
    ledger.close().context("failed to close ledger")?;
    served
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
