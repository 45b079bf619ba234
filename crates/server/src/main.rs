//! tinyledger server entry point.

use clap::Parser;
use tinyledger_server::{server, ServerConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let config = ServerConfig::parse();

    let filter = EnvFilter::try_new(&config.log).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = server::run(config).await {
        tracing::error!("{:#}", e);
        std::process::exit(1);
    }
}
