use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use promptcache::config::expand_tilde;
use promptcache::CacheConfig;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "promptcache")]
#[command(about = "promptcache - response store administration")]
#[command(version)]
struct Cli {
    /// Config file used to locate the store when --path is omitted
    #[arg(long, env = "PROMPTCACHE_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show store statistics
    Stats {
        /// Path to the store database
        #[arg(short, long)]
        path: Option<PathBuf>,

        /// Print statistics as JSON
        #[arg(long)]
        json: bool,
    },

    /// Clear cached responses
    Clear {
        /// Path to the store database
        #[arg(short, long)]
        path: Option<PathBuf>,

        /// Only clear entries older than N days
        #[arg(long)]
        older_than_days: Option<u32>,
    },

    /// Remove entries whose TTL has elapsed
    PurgeExpired {
        /// Path to the store database
        #[arg(short, long)]
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
    );
    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let config_path = match cli.config {
        Some(path) => path,
        None => default_config_path()?,
    };

    match cli.command {
        Commands::Stats { path, json } => {
            let path = resolve_store_path(path, &config_path)?;
            commands::run_stats(&path, json).await?;
        }
        Commands::Clear {
            path,
            older_than_days,
        } => {
            let path = resolve_store_path(path, &config_path)?;
            tracing::info!("Clearing cache at {}", path.display());
            let removed = commands::run_clear(&path, older_than_days).await?;
            match older_than_days {
                Some(days) => println!("Removed {} entries older than {} days", removed, days),
                None => println!("Removed {} entries", removed),
            }
        }
        Commands::PurgeExpired { path } => {
            let path = resolve_store_path(path, &config_path)?;
            let removed = commands::run_purge_expired(&path).await?;
            println!("Removed {} expired entries", removed);
        }
    }

    Ok(())
}

fn default_config_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Cannot determine home directory")?;
    Ok(home.join(".promptcache").join("config.toml"))
}

/// An explicit --path wins; otherwise the store configured in the config file.
fn resolve_store_path(path: Option<PathBuf>, config_path: &Path) -> Result<PathBuf> {
    if let Some(path) = path {
        return Ok(expand_tilde(&path)?);
    }

    let config = CacheConfig::load(config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    config.store_path.with_context(|| {
        format!(
            "{} configures a memory-only cache; pass --path",
            config_path.display()
        )
    })
}
