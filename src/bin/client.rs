//! depot-client: interactive command-line client for the depot server.

use clap::Parser;
use depot::client::{self, ClientConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Command-line arguments for the depot client
#[derive(Parser, Debug)]
#[command(name = "depot-client")]
#[command(version = "0.1.0")]
#[command(about = "Interactive client for the depot file server", long_about = None)]
struct CliArgs {
    /// Server host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(short, long, default_value_t = 12000)]
    port: u16,

    /// Requested client name (the server assigns the real identity)
    #[arg(long, default_value = "client")]
    name: String,

    /// Directory downloaded files are saved into
    #[arg(short, long, default_value = "downloads")]
    downloads: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    client::run(ClientConfig {
        host: args.host,
        port: args.port,
        name: args.name,
        downloads: args.downloads,
    })
    .await
}
