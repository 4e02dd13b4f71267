use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

mod config;
mod database;
mod dates;
mod error;
mod export;
mod extractor;
mod harvester;
mod models;
mod orchestrator;
mod utils;

use config::Config;
use database::Database;
use export::ExportFormat;
use orchestrator::Orchestrator;

#[derive(Parser)]
#[command(name = "steamvault")]
#[command(about = "Storefront catalog scraper and local game database")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape a catalog index into a database
    Scrape {
        /// Catalog index URL (search results page)
        url: String,
        /// Database name, created under the configured directory
        database: String,
    },
    /// Search a database by release date range
    Search {
        /// Database name
        database: String,
        /// Range start, YYYY-MM-DD
        start: String,
        /// Range end, YYYY-MM-DD
        end: String,
    },
    /// List databases in the configured directory
    Databases,
    /// Export a database to CSV or JSON
    Export {
        /// Database name
        database: String,
        /// Output format
        #[arg(short, long, value_enum, default_value = "csv")]
        format: ExportFormat,
        /// Output file path (defaults to <database>.<ext>)
        #[arg(short, long)]
        output: Option<String>,
        /// Export only these app ids instead of everything
        #[arg(long, value_delimiter = ',')]
        ids: Vec<String>,
    },
    /// Create an empty database with the expected schema
    Init {
        /// Database name
        database: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose)?;

    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Scrape { url, database } => {
            run_scrape(config, &url, &database).await?;
        }
        Commands::Search {
            database,
            start,
            end,
        } => {
            run_search(&config, &database, &start, &end).await?;
        }
        Commands::Databases => {
            run_databases(&config).await?;
        }
        Commands::Export {
            database,
            format,
            output,
            ids,
        } => {
            run_export(&config, &database, format, output, &ids).await?;
        }
        Commands::Init { database } => {
            let path = database_path(&config, &database);
            let db = Database::new(&path).await?;
            db.init().await?;
            info!("Database initialized at {}", path.display());
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(format!("steamvault={}", level))
        .with_target(false)
        .init();

    Ok(())
}

fn database_path(config: &Config, name: &str) -> PathBuf {
    let file = if name.ends_with(".db") {
        name.to_string()
    } else {
        format!("{name}.db")
    };
    PathBuf::from(&config.database.dir).join(file)
}

async fn run_scrape(config: Config, url: &str, database: &str) -> Result<()> {
    let orchestrator = Arc::new(Orchestrator::new(config));
    let mut progress = orchestrator.subscribe();

    let bar = indicatif::ProgressBar::new(100);
    bar.set_style(
        indicatif::ProgressStyle::with_template("[{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .unwrap()
            .progress_chars("=>-"),
    );

    // Ctrl-C requests a cooperative stop; the in-flight item finishes
    // before the run winds down.
    let stopper = orchestrator.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Stop requested, finishing current item...");
            stopper.stop();
        }
    });

    let render_bar = bar.clone();
    let renderer = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let state = progress.borrow().clone();
            render_bar.set_position(state.progress_percent as u64);
            render_bar.set_message(state.status_message.clone());
            if !state.active && state.progress_percent == 100 {
                break;
            }
        }
    });

    let summary = orchestrator.run(url, database).await?;
    let _ = renderer.await;
    bar.finish_and_clear();

    println!(
        "Scraped {} of {} new games ({} failed)",
        summary.scraped, summary.discovered, summary.failed
    );

    Ok(())
}

async fn run_search(config: &Config, database: &str, start: &str, end: &str) -> Result<()> {
    let start_date = dates::parse_query_date(start)
        .ok_or_else(|| anyhow::anyhow!("Invalid start date '{}', expected YYYY-MM-DD", start))?;
    let end_date = dates::parse_query_date(end)
        .ok_or_else(|| anyhow::anyhow!("Invalid end date '{}', expected YYYY-MM-DD", end))?;
    if end_date < start_date {
        anyhow::bail!("End date must not be before start date");
    }

    let db = Database::open_existing(database_path(config, database)).await?;
    let total = db.count_games().await?;
    let hits = db.search_by_date_range(start_date, end_date).await?;

    println!("Games released between {} and {}:", start, end);
    println!(
        "{:<10} {:<35} {:<25} {:<25} {:<18} {:>8}",
        "App ID", "Name", "Developer", "Publisher", "Release Date", "Price"
    );
    println!("{}", "-".repeat(125));

    for game in &hits {
        println!(
            "{:<10} {:<35} {:<25} {:<25} {:<18} {:>8.2}",
            game.app_id, game.name, game.developer, game.publisher, game.release_date, game.price
        );
    }

    let excluded = total as usize - hits.len();
    println!(
        "{} of {} games matched ({} outside range or undated)",
        hits.len(),
        total,
        excluded
    );

    Ok(())
}

async fn run_databases(config: &Config) -> Result<()> {
    let databases = database::list_databases(&config.database.dir).await?;

    if databases.is_empty() {
        println!("No databases found in {}", config.database.dir);
        return Ok(());
    }

    println!("{:<30} {:>10} {:>12}", "Database", "Games", "Size (KB)");
    println!("{}", "-".repeat(54));
    for db in databases {
        println!(
            "{:<30} {:>10} {:>12}",
            db.name,
            db.game_count,
            db.size_bytes / 1024
        );
    }

    Ok(())
}

async fn run_export(
    config: &Config,
    database: &str,
    format: ExportFormat,
    output: Option<String>,
    ids: &[String],
) -> Result<()> {
    let db = Database::open_existing(database_path(config, database)).await?;

    let output = output.unwrap_or_else(|| {
        let stem = database.trim_end_matches(".db");
        format!("{}.{}", stem, format.extension())
    });

    let count = if ids.is_empty() {
        export::export_all(&db, &output, format).await?
    } else {
        export::export_selection(&db, ids, &output, format).await?
    };

    println!("Exported {} games to {}", count, output);
    Ok(())
}
