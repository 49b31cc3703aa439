//! HistGrid Daemon - browse per-cell histograms over HTTP

mod config;
mod error;
mod handler;
mod pages;
mod routes;
mod session;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};

use crate::config::{Args, ServerConfig};
use crate::routes::{router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    // Health check
    if args.health {
        match TcpStream::connect(&args.bind).await {
            Ok(_) => {
                println!("OK");
                std::process::exit(0);
            }
            Err(_) => {
                eprintln!("FAILED");
                std::process::exit(1);
            }
        }
    }

    let config = ServerConfig::from_args(&args)?;

    info!("Starting HistGrid Daemon v{}", env!("CARGO_PKG_VERSION"));
    info!("Binding to {}", config.bind);
    info!("Upload directory: {}", config.uploads.display());
    info!("Cache capacity: {} histograms per session", config.cache_capacity);
    info!(
        "Default grid: {} x {} from ({}, {}), {}",
        config.default_grid.n_ieta,
        config.default_grid.n_iphi,
        config.default_grid.ieta_min,
        config.default_grid.iphi_min,
        config.default_grid.order
    );

    // Create upload directory if it doesn't exist
    std::fs::create_dir_all(&config.uploads).with_context(|| {
        format!(
            "Failed to create upload directory {}",
            config.uploads.display()
        )
    })?;

    let bind = config.bind.clone();
    let max_upload_mb = args.max_upload_mb;
    let app = router(AppState::new(config));

    // Bind TCP listener
    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!("Server listening on {}", bind);

    println!("\nHistGrid server ready");
    println!("   Upload page:  http://{}/", bind);
    println!("   Upload limit: {} MB", max_upload_mb);
    println!("   Health:       http://{}/healthz", bind);
    println!("\nPress Ctrl+C to stop\n");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
