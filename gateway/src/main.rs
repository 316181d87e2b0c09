use std::{net::SocketAddr, path::PathBuf};

use clap::Parser;

/// Adaptive LLM gateway: reverse proxy with provider fallback and caching.
#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Path to the gateway's TOML configuration file.
    #[arg(long, short, env = "GATEWAY_CONFIG")]
    config: PathBuf,

    /// Overrides the listen address from the config file.
    #[arg(long, env = "GATEWAY_LISTEN_ADDRESS")]
    listen_address: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = config::Config::load(&args.config)?;
    config.validate()?;

    server::serve(config, args.listen_address).await
}
