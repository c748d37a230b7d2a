//! parley-relay binary.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use parley_config::ParleyConfig;
use parley_social::Registry;

#[derive(Parser)]
#[command(name = "parley-relay", about = "WebSocket relay for parley voice rooms")]
struct Args {
    /// Path to config.toml. Defaults to the platform config directory.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on; overrides `server.port`.
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let loaded = parley_config::load_config(args.config.as_deref());
    let mut config = match &loaded {
        Ok(config) => config.clone(),
        Err(_) => ParleyConfig::default(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.as_str().into()),
        )
        .init();

    if let Err(e) = &loaded {
        tracing::warn!(error = %e, "Config unusable; running with defaults");
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let services = parley_relay::build_services(&config).expect("Failed to build HTTP client");
    let registry = Registry::spawn(services);

    let addr = format!("{}:{}", config.server.bind, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .expect("Failed to bind TCP listener");

    tracing::info!("parley-relay listening on {}", addr);

    let hello_timeout = Duration::from_secs(config.server.hello_timeout_secs);
    tokio::select! {
        _ = parley_relay::serve(listener, registry.clone(), hello_timeout) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
        }
    }
    registry.shutdown();
}
