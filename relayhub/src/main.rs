mod config;
mod http;
mod logging;
mod server;

use anyhow::Result;
use clap::Parser;
use relayhub_sfu::{Negotiator, Registry, WebRtcNegotiator};
use std::sync::Arc;
use tracing::info;

use server::RelayServer;

/// Selective-forwarding relay: one UDP video ingress per room, many WebRTC viewers
#[derive(Debug, Parser)]
#[command(name = "relayhub", version, about)]
struct Cli {
    /// Path to a YAML/TOML/JSON config file
    #[arg(short, long, env = "RELAYHUB_CONFIG_PATH")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load configuration
    let config = config::load_config(cli.config.as_deref());

    // 1.5. Validate configuration (fail fast on misconfigurations)
    if let Err(errors) = config.validate() {
        for e in &errors {
            eprintln!("Config validation error: {e}");
        }
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s)",
            errors.len()
        ));
    }

    // 2. Initialize logging
    logging::init_logging(&config.logging)?;
    info!("relayhub starting...");
    info!("HTTP address: {}", config.http_address());

    // 3. Media core
    let negotiator: Arc<dyn Negotiator> = Arc::new(WebRtcNegotiator::new(&config.sfu)?);
    let registry = Registry::new(config.sfu.clone(), negotiator);

    // 4. Serve until shutdown
    RelayServer::new(config, registry).run().await
}
