//! depot-server: multi-client TCP file depot server.
//!
//! Features:
//! - Concurrent-client cap with explicit rejection at capacity
//! - Sequential, never-reused client identities
//! - Echo, status, list, download, and exit commands
//! - Length-prefixed binary file transfer
//! - Configuration via CLI arguments or TOML file

use depot::config::Config;
use depot::server::Server;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        host = %config.host,
        port = config.port,
        max_clients = config.max_clients,
        repository = %config.repository.display(),
        "Starting depot server"
    );

    // Bind failure is fatal; everything after this is per-connection
    let server = Server::bind(&config).await?;
    server.run().await?;
    Ok(())
}
