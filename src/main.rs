//! Mock API Engine - CLI Entry Point

use anyhow::Result;
use clap::Parser;
use mock_api_engine::config::StorageConfig;
use mock_api_engine::{router, AppState, MockDispatcher, MockEngineConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "mock-api-engine",
    about = "User-definable mock HTTP endpoints with templated responses",
    version
)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "mock-engine.yaml")]
    config: PathBuf,

    /// Address to listen on (overrides settings.bind_address)
    #[arg(short, long, value_name = "ADDR")]
    bind: Option<String>,

    /// Store definitions as files under this directory
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: Level,

    /// Print default configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if args.print_config {
        let default_config = include_str!("../config/default-config.yaml");
        println!("{}", default_config);
        return Ok(());
    }

    // Load configuration
    let mut config = if args.config.exists() {
        info!(path = ?args.config, "Loading configuration");
        MockEngineConfig::from_file(&args.config)?
    } else if args.validate {
        anyhow::bail!("Configuration file not found: {:?}", args.config);
    } else {
        info!("Using default configuration");
        MockEngineConfig::default()
    };

    if let Some(bind) = args.bind {
        config.settings.bind_address = bind;
    }
    if let Some(directory) = args.data_dir {
        config.storage = StorageConfig::File { directory };
    }
    config.validate()?;

    if args.validate {
        println!(
            "Configuration is valid ({} demo definitions)",
            config.demo_count()
        );
        return Ok(());
    }

    let state = AppState::from_config(&config).await?;
    let dispatcher = Arc::clone(&state.dispatcher);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.settings.bind_address).await?;
    info!(address = %config.settings.bind_address, "Mock API engine listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(dispatcher))
        .await?;

    info!("Mock API engine stopped");
    Ok(())
}

/// Resolve on Ctrl-C or SIGTERM and mark the dispatcher as draining.
async fn shutdown_signal(dispatcher: Arc<MockDispatcher>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    warn!("Shutdown requested, draining in-flight requests");
    dispatcher.start_draining();
}
