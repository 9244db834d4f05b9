// src/main.rs
// Semantix memory service entry point

use anyhow::Result;
use clap::Parser;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use semantix::api::http::http_router;
use semantix::config::SemantixConfig;
use semantix::state::AppState;

#[derive(Parser, Debug)]
#[command(name = "semantix", about = "Multi-tenant conversational memory service")]
struct Args {
    /// Bind host (overrides SEMANTIX_HOST)
    #[arg(long)]
    host: Option<String>,

    /// Bind port (overrides SEMANTIX_PORT)
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();
    let mut config = SemantixConfig::from_env();
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::initialize(config).await?;
    let router = http_router(state);

    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
