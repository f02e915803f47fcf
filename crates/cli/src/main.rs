//! `barrio`: offline maintenance for the barrio cache and site.

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use barrio_core::{AppConfig, CacheDb};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "barrio", version, about = "Maintenance commands for the barrio offline cache")]
struct Cli {
    /// Cache database (default: from configuration)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write sitemap.xml for every locality page
    Sitemap {
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Public base URL (default: origin + base path)
        #[arg(long)]
        base_url: Option<String>,
    },
    /// Entry counts per partition
    Status,
    /// Delete partitions that do not belong to the current cache version
    Purge {
        /// List what would be deleted without deleting
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load().context("loading configuration")?;

    match cli.cmd {
        Command::Sitemap { output, base_url } => {
            let base_url = base_url.unwrap_or_else(|| config.absolute_url(""));
            let xml = commands::sitemap(&config, &base_url, chrono::Local::now().date_naive());
            match output {
                Some(path) => {
                    std::fs::write(&path, &xml).with_context(|| format!("writing {}", path.display()))?;
                    eprintln!("sitemap written to {}", path.display());
                }
                None => print!("{xml}"),
            }
        }
        Command::Status => {
            let db = open_db(cli.db, &config).await?;
            print!("{}", commands::status(&config, &db).await?);
        }
        Command::Purge { dry_run } => {
            let db = open_db(cli.db, &config).await?;
            let stale = commands::purge(&config, &db, dry_run).await?;
            let verb = if dry_run { "would delete" } else { "deleted" };
            if stale.is_empty() {
                println!("nothing to purge");
            }
            for name in stale {
                println!("{verb} {name}");
            }
        }
    }

    Ok(())
}

async fn open_db(path: Option<PathBuf>, config: &AppConfig) -> Result<CacheDb> {
    let path = path.unwrap_or_else(|| config.db_path.clone());
    CacheDb::open(&path)
        .await
        .with_context(|| format!("opening cache at {}", path.display()))
}
