use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use webpilot_core::{Config, Paths};

mod commands;

#[derive(Parser)]
#[command(
    name = "webpilot",
    version,
    about = "Browser automation driven by a hosted computer-use agent"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway.
    Serve {
        /// Bind address (overrides the config file).
        #[arg(long)]
        host: Option<String>,
        /// Bind port (overrides the config file).
        #[arg(long)]
        port: Option<u16>,
    },
    /// List stored sessions.
    Sessions {
        /// Filter by status (e.g. running, completed, error).
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Purge session records older than a cutoff.
    Cleanup {
        #[arg(long)]
        days_old: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let paths = Paths::new();
    let config = Config::load(&paths)?;

    match cli.command {
        Commands::Serve { host, port } => commands::serve::run(config, host, port).await,
        Commands::Sessions { status, limit } => commands::sessions_cmd::run(&config, status, limit),
        Commands::Cleanup { days_old } => commands::cleanup_cmd::run(&config, days_old),
    }
}
