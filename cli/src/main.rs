//! Ratekeeper CLI
//!
//! Inspect and edit the local rate store, and trigger provider refreshes.

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ratekeeper_common::{Currency, RateId};
use ratekeeper_store::RateStore;
use ratekeeper_sync::SyncConfig;

mod commands;
mod output;

use output::Format;

/// Ratekeeper CLI
#[derive(Parser, Debug)]
#[command(name = "ratekeeper")]
#[command(about = "Inspect and refresh locally stored FX rates")]
struct Args {
    /// SQLite database URL (defaults to RATEKEEPER_DATABASE_URL or sqlite://ratekeeper.db)
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve the current rate for a pair
    Get { base: Currency, quote: Currency },

    /// Store a manual override
    Set {
        base: Currency,
        quote: Currency,
        rate: f64,

        /// Resolution priority (defaults to the manual tier)
        #[arg(long)]
        priority: Option<i32>,

        /// Free-form note kept in the record's metadata
        #[arg(long)]
        note: Option<String>,
    },

    /// List active rates, best candidates first
    List,

    /// Show every record for a pair, newest first
    History { base: Currency, quote: Currency },

    /// Archive a record by id
    Archive { id: RateId },

    /// Summarize how current the stored rates are
    Staleness,

    /// Fetch rates from the providers now
    Refresh,

    /// Run a staleness check, refreshing if needed, and report sync status
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let mut config = SyncConfig::from_env();
    if let Some(url) = args.database_url {
        config.store.database_url = url;
    }
    let format = if args.json { Format::Json } else { Format::Text };

    let rendered = match args.command {
        Command::Refresh => commands::refresh(config, format).await?,
        Command::Status => commands::status(config, format).await?,
        command => {
            config.store.validate().map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
            let store = RateStore::connect(config.store).await?;
            let result = run_store_command(&store, command, format).await;
            store.close().await;
            result?
        }
    };

    println!("{rendered}");
    Ok(())
}

async fn run_store_command(store: &RateStore, command: Command, format: Format) -> anyhow::Result<String> {
    match command {
        Command::Get { base, quote } => commands::get(store, &base, &quote, format).await,
        Command::Set {
            base,
            quote,
            rate,
            priority,
            note,
        } => commands::set(store, base, quote, rate, priority, note, format).await,
        Command::List => commands::list(store, format).await,
        Command::History { base, quote } => commands::history(store, &base, &quote, format).await,
        Command::Archive { id } => commands::archive(store, id, format).await,
        Command::Staleness => commands::staleness(store, format).await,
        other => anyhow::bail!("{other:?} is not a store command"),
    }
}
