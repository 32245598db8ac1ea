//! `pkgindex` command line: run the index server and administer its data.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pkgindex_core::classifiers;
use pkgindex_core::db::{create_pool, run_migrations};
use pkgindex_server::{run_server, sha256_hash, Config};
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "pkgindex_server=info,pkgindex_core=info,tower_http=info";

#[derive(Parser)]
#[command(name = "pkgindex")]
#[command(about = "Distutils-compatible Python package index")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the package index server
    Start {
        /// Host to bind to (defaults to the configured host)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to (defaults to the configured port)
        #[arg(long)]
        port: Option<u16>,

        /// Data directory (defaults to the configured directory)
        #[arg(long)]
        data: Option<PathBuf>,

        /// JSON configuration file
        #[arg(long, default_value = "config.json")]
        config: PathBuf,
    },

    /// Load trove classifiers from a text file, one per line
    ImportClassifiers {
        /// Classifier listing
        #[arg(long)]
        file: PathBuf,

        /// Data directory (defaults to the configured directory)
        #[arg(long)]
        data: Option<PathBuf>,

        /// JSON configuration file
        #[arg(long, default_value = "config.json")]
        config: PathBuf,
    },

    /// Print the password hash to put in a user's `password_sha256`
    HashPassword {
        password: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start {
            host,
            port,
            data,
            config,
        } => {
            let config = load_config(&config)?;
            let host = host.unwrap_or_else(|| config.server.default_host.clone());
            let port = port.unwrap_or(config.server.default_port);
            let data = data.unwrap_or_else(|| config.storage.data_dir.clone());
            run_server(host, port, data, config).await
        }

        Commands::ImportClassifiers { file, data, config } => {
            let config = load_config(&config)?;
            let data = data.unwrap_or_else(|| config.storage.data_dir.clone());
            import_classifiers(&file, &config.database_path(&data)).await
        }

        Commands::HashPassword { password } => {
            println!("{}", sha256_hash(password.as_bytes()));
            Ok(())
        }
    }
}

fn load_config(path: &Path) -> Result<Config> {
    let config = Config::load_or_default(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    info!(path = %path.display(), "Configuration loaded");
    Ok(config)
}

async fn import_classifiers(file: &Path, db_path: &Path) -> Result<()> {
    let listing = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let pool = create_pool(db_path).await?;
    run_migrations(&pool).await?;

    let names = classifiers::parse_listing(&listing);
    let added = classifiers::import_classifiers(&pool, &names).await?;

    println!("Imported {added} new classifiers ({} in file)", names.len());
    Ok(())
}
