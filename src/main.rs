//! Bookshelf CLI - run and maintain the book catalog service

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use bookshelf::config::{self, BookshelfConfig, Settings};
use bookshelf::{BlobStore, BookRepository, SqliteStore};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "bookshelf")]
#[command(version)]
#[command(about = "Book catalog service - book records with uploaded files over HTTP")]
#[command(long_about = r#"
Bookshelf keeps a catalog of books in SQLite, each optionally carrying an
uploaded file stored on local disk.

Example usage:
  bookshelf init
  bookshelf serve --port 8000
  bookshelf prune --dry-run
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Overrides for values read from the config file
#[derive(clap::Args)]
struct StoreArgs {
    /// Path to the database file
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Directory holding uploaded files
    #[arg(short, long)]
    upload_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service
    Serve {
        /// Address to bind
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        #[command(flatten)]
        store: StoreArgs,
    },

    /// Write a config file with every default spelled out
    Init {
        /// Overwrite an existing config file
        #[arg(short, long)]
        force: bool,
    },

    /// Show statistics about the catalog
    Stats {
        #[command(flatten)]
        store: StoreArgs,
    },

    /// Remove uploaded files that no book refers to
    Prune {
        /// Only list the files that would be removed
        #[arg(long)]
        dry_run: bool,

        #[command(flatten)]
        store: StoreArgs,
    },
}

impl StoreArgs {
    fn apply(self, settings: &mut Settings) {
        if let Some(database) = self.database {
            settings.database = database;
        }
        if let Some(upload_dir) = self.upload_dir {
            settings.upload_dir = upload_dir;
        }
    }
}

fn load_settings(config_path: &Path) -> anyhow::Result<Settings> {
    let file_config = config::load_config(Some(config_path))?;
    if file_config.is_some() {
        tracing::debug!("Loaded config from {}", config_path.display());
    }
    Ok(file_config.unwrap_or_default().resolve())
}

fn open_repository(settings: &Settings) -> anyhow::Result<BookRepository> {
    config::prepare_dirs(settings)?;
    let store = SqliteStore::open(&settings.database)?;
    let blobs = BlobStore::new(&settings.upload_dir);
    Ok(BookRepository::new(store, blobs)
        .with_date_filter_requires_genre(settings.date_filter_requires_genre))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let config_path = cli.config.unwrap_or_else(config::default_config_path);

    match cli.command {
        Commands::Init { force } => {
            config::write_config(&config_path, &BookshelfConfig::with_defaults(), force)?;
            println!("Wrote {}", config_path.display());
        }

        Commands::Serve { host, port, store } => {
            let mut settings = load_settings(&config_path)?;
            if let Some(host) = host {
                settings.host = host;
            }
            if let Some(port) = port {
                settings.port = port;
            }
            store.apply(&mut settings);
            bookshelf::server::start_server(&settings).await?;
        }

        Commands::Stats { store } => {
            let mut settings = load_settings(&config_path)?;
            store.apply(&mut settings);
            let repo = open_repository(&settings)?;
            let stats = repo.store().stats()?;
            let stored_files = repo.blobs().stored_paths().await?.len();

            println!("Bookshelf Statistics ({:?})", settings.database);
            println!("------------------------------------");
            print!("{}", stats);
            println!("  Stored files: {}", stored_files);
        }

        Commands::Prune { dry_run, store } => {
            let mut settings = load_settings(&config_path)?;
            store.apply(&mut settings);
            let repo = open_repository(&settings)?;
            let orphans = repo.prune_orphans(dry_run).await?;

            if orphans.is_empty() {
                println!("No orphaned files.");
            } else {
                let verb = if dry_run { "Would remove" } else { "Removed" };
                for path in &orphans {
                    println!("  {}", path);
                }
                println!("{} {} orphaned file(s).", verb, orphans.len());
            }
        }
    }

    Ok(())
}
