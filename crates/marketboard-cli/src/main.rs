// ============================================================================
// marketboard-db - CLI tool for the market tracking database
// ============================================================================
// Usage:
//   marketboard-db stats                         Show database statistics
//   marketboard-db ingest upload.json            Process uploads from a file
//   marketboard-db show 5333 Ravana              Current listings and history
//   marketboard-db history 5333 Materia          Extended sale history
//   marketboard-db content 1234567890            Look up a content ID
//   marketboard-db blacklist add 1234567890      Administer the blacklist
//   marketboard-db recent                        Recently updated items
//   marketboard-db uploads                       Daily upload counts
// ============================================================================

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use marketboard_core::{
    hash_identity, ContentDirectory, MarketDb, MarketService, MarketUpload, TrackerConfig,
    UploadOutcome, UploaderFilter, UsageCounters,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Marketboard database tool
#[derive(Parser)]
#[command(
    name = "marketboard-db",
    version,
    about = "Inspect and manage the marketboard tracking database"
)]
struct Cli {
    /// Path to the database file (default: ~/.marketboard/market.redb)
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// World table CSV file or http(s) URL (default: MARKETBOARD_WORLDS_FILE / _URL)
    #[arg(long, global = true)]
    worlds: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show document counts per collection
    Stats,

    /// Process a JSON file holding one upload or an array of uploads
    Ingest { file: PathBuf },

    /// Show current listings and recent history for an item
    Show {
        item: u32,
        /// World ID, world name or data-center name
        scope: String,
    },

    /// Show the extended sale history for an item
    History {
        item: u32,
        /// World ID, world name or data-center name
        scope: String,
        /// Number of entries to return (capped at 500)
        #[arg(long)]
        entries: Option<usize>,
    },

    /// Look up a player or retainer by raw content ID
    Content { id: String },

    /// Manage blacklisted uploaders
    Blacklist {
        #[command(subcommand)]
        action: BlacklistAction,
    },

    /// List recently updated item IDs
    Recent,

    /// Show upload counts per day
    Uploads,
}

#[derive(Subcommand)]
enum BlacklistAction {
    /// Blacklist a raw uploader ID
    Add { uploader: String },
    /// Remove a raw uploader ID from the blacklist
    Remove { uploader: String },
    /// Check whether a raw uploader ID is blacklisted
    Check { uploader: String },
    /// List blacklisted uploader tokens
    List,
}

fn format_timestamp(ts_millis: i64) -> String {
    if ts_millis == 0 {
        return "never".to_string();
    }
    Utc.timestamp_millis_opt(ts_millis)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| format!("(invalid: {})", ts_millis))
}

fn load_config(cli: &Cli) -> Result<TrackerConfig> {
    let mut config = TrackerConfig::from_env()?;
    if let Some(path) = &cli.db_path {
        config = config.with_db_path(path);
    }
    if let Some(worlds) = &cli.worlds {
        config = if worlds.starts_with("http://") || worlds.starts_with("https://") {
            config.with_worlds_url(worlds.as_str())
        } else {
            config.with_worlds_file(worlds.as_str())
        };
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("marketboard_core=info,marketboard_db=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    run(cli.command, config).await
}

async fn run(command: Commands, config: TrackerConfig) -> Result<()> {
    match command {
        Commands::Stats => cmd_stats(open_db(&config)?),
        Commands::Ingest { file } => cmd_ingest(config, &file).await,
        Commands::Show { item, scope } => cmd_show(config, item, &scope).await,
        Commands::History {
            item,
            scope,
            entries,
        } => cmd_history(config, item, &scope, entries).await,
        Commands::Content { id } => cmd_content(open_db(&config)?, &id),
        Commands::Blacklist { action } => cmd_blacklist(open_db(&config)?, action),
        Commands::Recent => cmd_recent(open_db(&config)?, &config),
        Commands::Uploads => cmd_uploads(open_db(&config)?, &config),
    }
}

/// Commands that never consult the world table open the store directly.
fn open_db(config: &TrackerConfig) -> Result<Arc<MarketDb>> {
    config.validate()?;
    Ok(Arc::new(MarketDb::open(config.db_path.as_deref())?))
}

fn cmd_stats(db: Arc<MarketDb>) -> Result<()> {
    let stats = db.stats()?;

    println!("=== Marketboard Database Stats ===");
    println!("Database: {}", db.path().display());
    println!();
    println!("Market states:       {}", stats.market_states);
    println!("Extended histories:  {}", stats.extended_histories);
    println!("DC aggregates:       {}", stats.aggregates);
    println!("  world slices       {}", stats.aggregate_slices);
    println!("Content entries:     {}", stats.content_entries);
    println!("Blacklisted:         {}", stats.blacklisted);
    println!("Upload days tracked: {}", stats.upload_days);

    Ok(())
}

async fn cmd_ingest(config: TrackerConfig, file: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let value: serde_json::Value = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not valid JSON", file.display()))?;
    let uploads: Vec<MarketUpload> = if value.is_array() {
        serde_json::from_value(value)?
    } else {
        vec![serde_json::from_value(value)?]
    };

    let service = MarketService::start(config).await?;
    let ingestor = service.ingestor();
    info!("Ingesting {} uploads from {}", uploads.len(), file.display());

    let (mut accepted, mut rejected, mut failed) = (0usize, 0usize, 0usize);
    for (index, upload) in uploads.into_iter().enumerate() {
        match ingestor.process(upload).await {
            Ok(UploadOutcome::Accepted { listings, entries }) => {
                accepted += 1;
                println!(
                    "[{}] accepted: {} listings, {} entries",
                    index, listings, entries
                );
            }
            Ok(UploadOutcome::Rejected) => {
                rejected += 1;
                println!("[{}] rejected: uploader is blacklisted", index);
            }
            Err(e) => {
                failed += 1;
                println!("[{}] failed: {}", index, e);
            }
        }
    }

    println!(
        "\nTotal: {} accepted, {} rejected, {} failed",
        accepted, rejected, failed
    );
    if failed > 0 {
        anyhow::bail!("{} uploads failed", failed);
    }
    Ok(())
}

async fn cmd_show(config: TrackerConfig, item: u32, scope: &str) -> Result<()> {
    let service = MarketService::start(config).await?;
    let query = service.query();
    let view = query.current(item, &query.resolve_scope(scope))?;

    println!("Last upload: {}", format_timestamp(view.last_upload_time));
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}

async fn cmd_history(
    config: TrackerConfig,
    item: u32,
    scope: &str,
    entries: Option<usize>,
) -> Result<()> {
    let service = MarketService::start(config).await?;
    let query = service.query();
    let view = query.history(item, &query.resolve_scope(scope), entries)?;

    println!(
        "Last upload: {} ({} entries)",
        format_timestamp(view.last_upload_time),
        view.entries.len()
    );
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}

fn cmd_content(db: Arc<MarketDb>, id: &str) -> Result<()> {
    let content = ContentDirectory::new(db);
    match content.get(&hash_identity(id))? {
        Some(entry) => println!("{}", serde_json::to_string_pretty(&entry)?),
        None => println!("{{}}"),
    }
    Ok(())
}

fn cmd_blacklist(db: Arc<MarketDb>, action: BlacklistAction) -> Result<()> {
    let filter = UploaderFilter::new(db);

    match action {
        BlacklistAction::Add { uploader } => {
            let token = hash_identity(&uploader);
            if filter.add(&token)? {
                println!("Blacklisted {}", token);
            } else {
                println!("Already blacklisted: {}", token);
            }
        }
        BlacklistAction::Remove { uploader } => {
            let token = hash_identity(&uploader);
            if filter.remove(&token)? {
                println!("Removed {}", token);
            } else {
                println!("Not blacklisted: {}", token);
            }
        }
        BlacklistAction::Check { uploader } => {
            let token = hash_identity(&uploader);
            let verdict = if filter.has(&token)? {
                "blacklisted"
            } else {
                "allowed"
            };
            println!("{} {}", token, verdict);
        }
        BlacklistAction::List => {
            let tokens = filter.list()?;
            if tokens.is_empty() {
                println!("Blacklist is empty.");
                return Ok(());
            }
            for token in &tokens {
                println!("{}", token);
            }
            println!("\nTotal: {} uploaders", tokens.len());
        }
    }

    Ok(())
}

fn counters(db: Arc<MarketDb>, config: &TrackerConfig) -> UsageCounters {
    UsageCounters::new(db, config.recently_updated_len, config.daily_stats_days)
}

fn cmd_recent(db: Arc<MarketDb>, config: &TrackerConfig) -> Result<()> {
    let recent = counters(db, config).get_recently_updated_items()?;

    if recent.items.is_empty() {
        println!("No items updated yet.");
        return Ok(());
    }
    for (rank, item) in recent.items.iter().enumerate() {
        println!("{:>3}. {}", rank + 1, item);
    }
    Ok(())
}

fn cmd_uploads(db: Arc<MarketDb>, config: &TrackerConfig) -> Result<()> {
    let stats = counters(db, config).get_daily_uploads()?;

    if stats.upload_count_by_day.is_empty() {
        println!("No uploads recorded.");
        return Ok(());
    }

    println!("{:<12}  {}", "DATE", "UPLOADS");
    println!("{}", "-".repeat(24));
    for day in &stats.upload_count_by_day {
        println!("{:<12}  {}", day.date, day.count);
    }
    let total: u64 = stats.upload_count_by_day.iter().map(|d| d.count).sum();
    println!("\nTotal: {} uploads over {} days", total, stats.upload_count_by_day.len());
    Ok(())
}
