//! Accounts CLI - operator commands
//!
//! Usage:
//!   accounts migrate
//!   accounts create-root <PHONE> <PASSWORD>

use accounts_api::state::AppState;
use accounts_core::{AppConfig, PgUserStore};
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "accounts")]
#[command(about = "User accounts service administration")]
#[command(version)]
struct Cli {
    /// PostgreSQL URL; overrides DATABASE_URL and the config file
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Create the root account and print its long-lived token
    CreateRoot {
        /// Mobile phone, +380XXXXXXXXX
        phone: String,
        /// Password, at least 8 characters
        password: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "accounts_core=info,audit=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::load().context("failed to load configuration")?;
    if let Some(url) = cli.database_url {
        config.database.url = url;
    }

    let store = PgUserStore::new(&config.database.url, config.database.pool_size)
        .await
        .context("failed to connect to PostgreSQL")?;
    store.migrate().await.context("failed to run migrations")?;

    match cli.command {
        Commands::Migrate => {
            println!("Migrations applied");
        }
        Commands::CreateRoot { phone, password } => {
            let state = AppState::new(config, Arc::new(store))?;
            let (user, signed) = state
                .auth_service()
                .create_root(&phone, &password)
                .await
                .map_err(|e| anyhow::anyhow!("failed to create root user: {e}"))?;

            println!("id:      {}", user.id);
            println!("login:   {}", user.login);
            println!("phone:   {}", user.phone);
            println!("expires: {}", signed.expires_at.to_rfc3339());
            println!("token:   {}", signed.token);
        }
    }

    Ok(())
}
