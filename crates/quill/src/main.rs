use anyhow::Result;
use clap::{Parser, Subcommand};
use console::style;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use quill::commands;
use quill::config::Config;

/// Quill - a device-flow-authenticated AI chat CLI
#[derive(Parser, Debug)]
#[command(name = "quill")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Authenticate this device with the auth server
    Login {
        /// Auth server base URL
        #[arg(long, env = "QUILL_SERVER_URL")]
        server_url: Option<String>,

        /// OAuth client identifier
        #[arg(long, env = "QUILL_CLIENT_ID")]
        client_id: Option<String>,
    },

    /// Remove the stored token
    Logout,

    /// Show the authenticated user
    Whoami {
        /// Auth server base URL
        #[arg(long, env = "QUILL_SERVER_URL")]
        server_url: Option<String>,
    },

    /// Start an interactive AI session
    Wakeup,
}

/// Set up file-based logging under the data directory. Console output stays
/// reserved for the interactive prompts.
fn init_logging() -> Result<()> {
    let log_path = Config::ensure_data_dir()?.join("quill.log");
    let log_file = std::fs::File::create(log_path)?;
    let filter =
        EnvFilter::try_from_env("QUILL_LOG").unwrap_or_else(|_| EnvFilter::new("quill=info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(log_file).with_ansi(false))
        .init();
    Ok(())
}

async fn run() -> Result<()> {
    // Load .env files (local first, then home directory) before anything
    // reads the environment. Errors are ignored - files are optional.
    let _ = dotenvy::from_filename(".env");
    if let Some(home) = dirs::home_dir() {
        let _ = dotenvy::from_path(home.join(".env"));
    }

    init_logging()?;

    let args = Args::parse();
    let mut config = Config::load()?;

    match args.command {
        Command::Login {
            server_url,
            client_id,
        } => {
            if let Some(server_url) = server_url {
                config.auth.server_url = server_url;
            }
            if let Some(client_id) = client_id {
                config.auth.client_id = client_id;
            }
            commands::login(&config).await
        }
        Command::Logout => commands::logout(),
        Command::Whoami { server_url } => {
            if let Some(server_url) = server_url {
                config.auth.server_url = server_url;
            }
            commands::whoami(&config).await
        }
        Command::Wakeup => commands::wakeup(&config).await,
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{} {e:#}", style("Error:").red().bold());
        std::process::exit(1);
    }
}
