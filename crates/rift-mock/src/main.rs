use anyhow::Context;
use clap::Parser;
use rift_mock::{Config, MockListener, MockServer};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "rift-mock", version, about = "HTTP mock server and forwarding proxy")]
struct Args {
    /// Port to serve mocked traffic and the control plane on
    #[arg(short, long, env = "MOCK_PORT")]
    port: Option<u16>,

    /// YAML or JSON configuration file
    #[arg(short, long, env = "MOCK_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, env = "MOCK_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// JSON array of expectations to load at start-up
    #[arg(long, env = "MOCK_INITIALIZATION_JSON")]
    initialization_json: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(path) = args.initialization_json {
        config.initialization_json = Some(path);
    }
    config.validate()?;

    let server = Arc::new(MockServer::new(&config).context("Failed to build upstream client")?);
    if let Some(path) = &config.initialization_json {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read initialization json {}", path.display()))?;
        let loaded = server
            .upsert_json(&json)
            .with_context(|| format!("Invalid initialization json {}", path.display()))?;
        info!(count = loaded.len(), path = %path.display(), "Loaded initial expectations");
    }

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port));
    let listener = MockListener::bind(addr, server)
        .await
        .with_context(|| format!("Failed to bind port {}", config.port))?;
    listener
        .serve(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await
}
