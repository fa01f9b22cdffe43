//! Quill device-authorization server
//!
//! Implements the device-flow endpoints the Quill CLI authenticates against,
//! backed by in-memory state. Intended for local development; approvals come
//! in through `POST /device/approve` instead of a hosted page.

mod protocol;
mod server;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use state::{AppState, ServerConfig};

/// Quill device-authorization server
#[derive(Parser, Debug)]
#[command(name = "quill-server")]
#[command(author, version, about = "Device-authorization server for the Quill CLI")]
struct Args {
    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:3005")]
    listen: SocketAddr,

    /// Seconds an issued access token stays valid
    #[arg(long, default_value_t = 3600)]
    token_ttl: u64,

    /// Seconds a device code stays redeemable
    #[arg(long, default_value_t = 600)]
    device_code_ttl: u64,

    /// Minimum seconds between polls of the token endpoint
    #[arg(long, default_value_t = 5)]
    interval: u64,

    /// Log file path
    #[arg(long, default_value = "/tmp/quill-server.log")]
    log_file: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up file-based logging
    let log_file = std::fs::File::create(&args.log_file)?;
    let filter =
        EnvFilter::try_from_env("QUILL_SERVER_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(log_file).with_ansi(false))
        .init();

    let config = ServerConfig {
        public_url: format!("http://{}", args.listen),
        token_ttl_secs: args.token_ttl,
        device_code_ttl_secs: args.device_code_ttl,
        interval_secs: args.interval,
    };

    eprintln!("Quill device-authorization server");
    eprintln!("Listening on: http://{}", args.listen);
    eprintln!("Log file: {}", args.log_file.display());
    eprintln!();
    eprintln!("Press Ctrl+C to stop");

    let state = Arc::new(AppState::new(config));
    server::run(args.listen, state).await
}
