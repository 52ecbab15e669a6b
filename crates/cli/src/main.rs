//! Marigold CLI - Database migrations.
//!
//! # Usage
//!
//! ```bash
//! # Apply pending storefront migrations
//! mg-cli migrate
//!
//! # Show which migrations are applied
//! mg-cli migrate --status
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "mg-cli")]
#[command(author, version, about = "Marigold storefront CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run storefront database migrations
    Migrate {
        /// List applied and pending migrations instead of running them
        #[arg(long)]
        status: bool,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), commands::migrate::MigrationError> {
    match cli.command {
        Commands::Migrate { status: false } => commands::migrate::run().await,
        Commands::Migrate { status: true } => commands::migrate::status().await,
    }
}
