//! # Mandi Rates Server Main Driver
//!
//! ## Purpose
//! Main entry point for the Krishivedah mandi rates server. Wires together
//! the cache store, the remote price source, and the rate service, then
//! starts the web server that the farmer-facing UI calls.
//!
//! ## Input/Output Specification
//! - **Input**: Configuration file, command line arguments, environment
//!   variables
//! - **Output**: Running web server with the rates API
//!
//! ## Architecture Flow
//! 1. Parse command line arguments and load configuration
//! 2. Initialize logging and tracing
//! 3. Open the cache store and build the price source client
//! 4. Construct the rate service with injected dependencies
//! 5. Start the web API server
//! 6. Handle shutdown signals gracefully

use clap::{Arg, Command};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use krishivedah_rates::{
    api::ApiServer,
    config::Config,
    errors::Result,
    service::RateService,
    source::AgmarknetSource,
    storage::SledCacheStore,
    AppState,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let matches = Command::new("mandi-rates-server")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Krishivedah Platform Team")
        .about("Mandi commodity rate service with day-keyed caching")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("config.toml"),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .help("Server port")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("check-health")
                .long("check-health")
                .help("Run component health checks and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    // Load configuration
    let config_path = matches.get_one::<String>("config").unwrap();
    let mut config = Config::from_file(config_path)?;

    // Override port if specified
    if let Some(port) = matches.get_one::<u16>("port") {
        config.server.port = *port;
    }

    let config = Arc::new(config);

    // Initialize logging
    init_logging(&config);

    info!("Starting Krishivedah mandi rates server");
    info!("Configuration loaded from: {}", config_path);

    if config.source.api_key.is_empty() {
        warn!("No price source API key configured; remote fetches will be rejected upstream");
    }

    // Initialize application components
    let app_state = initialize_components(config.clone()).await?;

    // Run health checks and exit if requested
    if matches.get_flag("check-health") {
        app_state.store.health_check().await?;
        info!("All health checks passed");
        return Ok(());
    }

    // Start the API server
    let server = ApiServer::new(app_state.clone());
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            error!("Server error: {}", e);
        }
    });

    info!(
        "Mandi rates server listening on {}:{}",
        config.server.host, config.server.port
    );

    // Wait for shutdown signal
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Received SIGINT, shutting down gracefully...");
        }
        _ = server_handle => {
            warn!("Server stopped unexpectedly");
        }
    }

    info!("Mandi rates server shut down");
    Ok(())
}

/// Initialize logging and tracing
fn init_logging(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new(&config.logging.level)
        });

    if config.logging.json_format {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .json()
                    .with_filter(filter),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_filter(filter),
            )
            .init();
    }
}

/// Initialize all application components
async fn initialize_components(config: Arc<Config>) -> Result<AppState> {
    info!("Initializing application components...");

    info!("Opening cache store at {:?}", config.storage.db_path);
    let store = Arc::new(SledCacheStore::new(config.storage.clone()).await?);

    info!("Building price source client for {}", config.source.base_url);
    let source = Arc::new(AgmarknetSource::new(config.source.clone())?);

    let service =
        Arc::new(RateService::new(store.clone(), source.clone()));

    // Verify the store before serving traffic
    store.health_check().await?;
    info!("Cache store is healthy");

    Ok(AppState {
        config,
        service,
        store,
        source,
    })
}
