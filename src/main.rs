use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use once_cell::sync::Lazy;
use session_vault::{FileBackend, MemoryBackend, SessionVault};
use tracing_subscriber::EnvFilter;

use crmlens_cli::config::ToolkitConfig;
use crmlens_cli::demo;

static LONG_VERSION: Lazy<String> = Lazy::new(|| {
    format!(
        "{} (built {} from {})",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_DATE"),
        env!("GIT_HASH"),
    )
});

/// CrmLens - admin toolkit engine for hosted CRM web clients
#[derive(Parser)]
#[command(author, version, long_version = LONG_VERSION.as_str(), about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scripted impersonation walkthrough on the simulated host
    Demo {
        /// Override the storage directory for persisted records
        #[arg(long, value_name = "DIR")]
        storage_dir: Option<PathBuf>,
    },

    /// Show the persisted impersonation history
    History {
        /// Override the storage directory for persisted records
        #[arg(long, value_name = "DIR")]
        storage_dir: Option<PathBuf>,
    },

    /// Print the effective configuration
    ShowConfig,
}

fn init_tracing(cli_level: &str, config: &ToolkitConfig) {
    let fallback = if cli_level.is_empty() {
        config.log_filter.clone()
    } else {
        cli_level.to_string()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ToolkitConfig::load(cli.config.as_deref())?;
    init_tracing(&cli.log_level, &config);

    match cli.command {
        Commands::Demo { storage_dir } => {
            demo::run(&config, storage_dir.as_deref()).await?;
        }
        Commands::History { storage_dir } => {
            let dir = storage_dir.unwrap_or_else(|| config.storage_dir.clone());
            let vault = SessionVault::new(
                Arc::new(MemoryBackend::new()),
                Arc::new(FileBackend::shared(&dir)),
            );
            let history = vault.history();
            if history.is_empty() {
                println!("no impersonation history under {}", dir.display());
            } else {
                for entry in history {
                    println!(
                        "{}\t{}\t{}",
                        entry.target_display_name,
                        entry.target_id,
                        entry.last_used_at.to_rfc3339()
                    );
                }
            }
        }
        Commands::ShowConfig => {
            print!("{}", serde_yaml::to_string(&config)?);
        }
    }

    Ok(())
}
