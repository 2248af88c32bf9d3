mod paths;
mod settings;

use std::fs;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use clap::Subcommand;
use simplelog::Config;
use simplelog::LevelFilter;
use simplelog::WriteLogger;

use fleetdash_lib::cache::CacheEntry;
use fleetdash_lib::cache::DurableStore;
use fleetdash_lib::cache::MemoryTier;
use fleetdash_lib::cache::SqliteStore;
use fleetdash_lib::cache::classify;
use fleetdash_lib::telemetry::SqliteCallLog;
use fleetdash_lib::warmup::Warmup;

use settings::LogSettings;
use settings::Settings;

#[derive(Parser, Debug)]
#[command(name = "fleetdash")]
#[command(about = "Inspect and maintain the fleet dashboard's response cache")]
struct Args {
    /// Settings file (defaults to the platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Durable cache database, overriding the settings file
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the warmup plan against the durable cache and report what loads
    Warmup,
    /// List cached keys with their category and age
    Keys {
        /// Only keys starting with this prefix
        #[arg(default_value = "")]
        prefix: String,
    },
    /// Print one cached payload
    Show { key: String },
    /// Delete one cached row
    Invalidate { key: String },
    /// Delete every cached row
    Clear,
    /// Print the TTL category of keys
    Classify {
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// Summarize upstream calls by service and outcome
    Calls {
        #[arg(long, default_value_t = 24)]
        hours: u32,
    },
    /// Print the most recent upstream calls
    Recent {
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
}

fn init_logging(logging: &LogSettings, verbose: bool) -> Result<()> {
    let Some(log_file) = paths::log_file() else {
        return Ok(());
    };
    if let Some(dir) = log_file.parent() {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        paths::rotate_logs(dir, logging.keep).with_context(|| format!("rotating logs in {}", dir.display()))?;
    }

    let file = File::create(&log_file).with_context(|| format!("creating {}", log_file.display()))?;
    let level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };
    WriteLogger::init(level, Config::default(), file)?;
    Ok(())
}

async fn open_store(settings: &Settings) -> Result<SqliteStore> {
    let path = settings.store_path()?;
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    SqliteStore::open(&path)
        .await
        .with_context(|| format!("opening cache at {}", path.display()))
}

async fn open_call_log(settings: &Settings) -> Result<SqliteCallLog> {
    let path = settings.call_log_path()?;
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    SqliteCallLog::open(&path)
        .await
        .with_context(|| format!("opening call log at {}", path.display()))
}

fn describe(entry: &CacheEntry) -> String {
    let now = Utc::now();
    let age = entry.age_at(now);
    let freshness = if entry.is_fresh_at(now) { "fresh" } else { "stale" };
    format!(
        "{:<10} {:>8}s old  ttl {:>4}s  {}",
        classify(&entry.key).as_str(),
        age.num_seconds(),
        entry.ttl_seconds,
        freshness
    )
}

async fn warmup(settings: &Settings) -> Result<()> {
    let store = Arc::new(open_store(settings).await?);
    let memory = Arc::new(MemoryTier::new());
    let warmup = Warmup::new(memory.clone(), store, settings.cache.ttl.clone());

    let report = warmup.run(&settings.warmup).await;
    println!("loaded:  {}", report.loaded);
    println!("missing: {}", report.missing);
    println!("failed:  {}", report.failed);
    for key in memory.keys() {
        println!("  {}", key);
    }
    Ok(())
}

async fn keys(settings: &Settings, prefix: &str) -> Result<()> {
    let store = open_store(settings).await?;
    let keys = store.list_keys_with_prefix(prefix).await?;
    if keys.is_empty() {
        println!("No cached keys");
        return Ok(());
    }
    for key in keys {
        // Rows can be deleted between listing and reading
        if let Some(entry) = store.get(&key).await? {
            println!("{:<48} {}", key, describe(&entry));
        }
    }
    Ok(())
}

async fn show(settings: &Settings, key: &str) -> Result<()> {
    let store = open_store(settings).await?;
    let entry = store
        .get(key)
        .await?
        .with_context(|| format!("no cached row for '{}'", key))?;

    println!("{}", describe(&entry));
    println!("cached at {}", entry.cached_at.to_rfc3339());
    match serde_json::from_slice::<serde_json::Value>(&entry.payload) {
        Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        Err(_) => println!("{}", String::from_utf8_lossy(&entry.payload)),
    }
    Ok(())
}

async fn calls(settings: &Settings, hours: u32) -> Result<()> {
    let log = open_call_log(settings).await?;
    let summary = log.summary(hours).await?;
    if summary.is_empty() {
        println!("No calls in the last {} hours", hours);
        return Ok(());
    }
    println!("{:<12} {:<16} {:>6} {:>10} {:>8}", "SERVICE", "OUTCOME", "COUNT", "AVG MS", "MAX MS");
    for row in summary {
        println!(
            "{:<12} {:<16} {:>6} {:>10.1} {:>8}",
            row.service, row.outcome, row.count, row.avg_ms, row.max_ms
        );
    }
    Ok(())
}

async fn recent(settings: &Settings, limit: u32) -> Result<()> {
    let log = open_call_log(settings).await?;
    for call in log.recent(limit).await? {
        let error = call.error.as_deref().unwrap_or("");
        println!(
            "{} {}.{} {} {}ms {}",
            call.timestamp.format("%Y-%m-%d %H:%M:%S"),
            call.service,
            call.operation,
            call.outcome,
            call.latency_ms,
            error
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut settings = Settings::load(args.config.as_deref())?;
    init_logging(&settings.logging, args.verbose)?;

    if let Some(store) = args.store {
        settings.store_path = Some(store);
    }

    match args.command {
        Command::Warmup => warmup(&settings).await?,
        Command::Keys { prefix } => keys(&settings, &prefix).await?,
        Command::Show { key } => show(&settings, &key).await?,
        Command::Invalidate { key } => {
            open_store(&settings).await?.delete(&key).await?;
            log::info!("invalidated {}", key);
            println!("Invalidated {}", key);
        }
        Command::Clear => {
            let count = open_store(&settings).await?.clear().await?;
            log::info!("cleared {} cached rows", count);
            println!("Cleared {} cached rows", count);
        }
        Command::Classify { keys } => {
            for key in keys {
                let category = classify(&key);
                println!("{:<48} {:<10} {}s", key, category.as_str(), settings.cache.ttl.seconds(category));
            }
        }
        Command::Calls { hours } => calls(&settings, hours).await?,
        Command::Recent { limit } => recent(&settings, limit).await?,
    }

    Ok(())
}
