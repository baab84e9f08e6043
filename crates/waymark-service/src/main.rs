//! Waymark service - offline-first location tracker runtime.
//!
//! Run with: `cargo run -p waymark-service`

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use waymark_core::RemoteStore;
use waymark_service::{AppState, Config, ingest};
use waymark_store::Store;

/// Waymark service - sensor ingest, offline cache, and sync runtime.
#[derive(Parser, Debug)]
#[command(name = "waymark-service")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database path (overrides config).
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Sensor link device path (overrides config).
    #[arg(short, long, global = true)]
    link: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the tracker in the foreground (default behavior).
    Run,

    /// Populate the offline tile cache around the configured center.
    Prefetch,

    /// Print pending-record and tile-cache status.
    Status,

    /// Export the event log as CSV.
    Export {
        /// Output file; stdout if omitted.
        output: Option<PathBuf>,
    },

    /// Delete every record, locally and (when reachable) remotely.
    Clear {
        /// Confirm the deletion; refused otherwise.
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_validated(path)?,
        None => Config::load_default()?,
    };
    if let Some(database) = args.database {
        config.storage.path = database;
    }
    if let Some(link) = args.link {
        config.link.device = link;
    }
    config.validate()?;

    let store = Store::open(&config.storage.path)?;
    let state = AppState::new(store, config).await;

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run(state).await,
        Command::Prefetch => prefetch(state).await,
        Command::Status => status(state).await,
        Command::Export { output } => export(state, output).await,
        Command::Clear { yes } => clear(state, yes).await,
    }
}

async fn run(state: Arc<AppState>) -> anyhow::Result<()> {
    let device = &state.config.link.device;
    let reader = tokio::fs::File::open(device)
        .await
        .with_context(|| format!("failed to open sensor link {}", device.display()))?;

    state.monitor.check_now().await;
    let _poller = state
        .monitor
        .spawn_polling(Duration::from_secs(state.config.sync.poll_interval_secs));
    let _mirror = Arc::clone(&state.mirror).run(state.remote.subscribe_changes());
    let _sync = ingest::spawn_sync_driver(Arc::clone(&state));

    tokio::select! {
        result = ingest::run_ingest(Arc::clone(&state), reader) => {
            result?;
            info!("Sensor link closed");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }

    Ok(())
}

async fn prefetch(state: Arc<AppState>) -> anyhow::Result<()> {
    if !state.monitor.check_now().await {
        anyhow::bail!("prefetch needs connectivity to reach the tile source");
    }

    let (lat, lng) = (state.config.tiles.center_lat, state.config.tiles.center_lng);
    let report = state.prefetcher.prefetch(lat, lng).await?;

    let stats = state.store.lock().await.tile_stats()?;
    println!(
        "Prefetched {} tile(s), {} already cached, {} failed; cache now holds {} tile(s) ({} bytes)",
        report.fetched, report.skipped, report.failed, stats.tile_count, stats.total_bytes
    );
    Ok(())
}

async fn status(state: Arc<AppState>) -> anyhow::Result<()> {
    let store = state.store.lock().await;
    let pending = store.count_pending()?;
    let stats = store.tile_stats()?;

    println!("Pending records: {}", pending);
    println!(
        "Tile cache: {} tile(s), {} bytes",
        stats.tile_count, stats.total_bytes
    );
    match stats.last_updated {
        Some(at) => println!(
            "Last tile cached: {}",
            at.format(&time::format_description::well_known::Rfc3339)?
        ),
        None => println!("Last tile cached: never"),
    }
    Ok(())
}

async fn export(state: Arc<AppState>, output: Option<PathBuf>) -> anyhow::Result<()> {
    let store = state.store.lock().await;
    let rows = match output {
        Some(path) => {
            let file = std::fs::File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            let rows = store.export_events_csv(file)?;
            println!("Exported {} record(s) to {}", rows, path.display());
            rows
        }
        None => store.export_events_csv(std::io::stdout().lock())?,
    };

    if rows == 0 {
        info!("Event log is empty");
    }
    Ok(())
}

async fn clear(state: Arc<AppState>, yes: bool) -> anyhow::Result<()> {
    if !yes {
        anyhow::bail!("refusing to delete all records; pass --yes to confirm");
    }

    if state.monitor.check_now().await && state.is_authenticated().await {
        state.remote.delete_all().await?;
        println!("Cleared remote collection");
    } else {
        println!("Remote unreachable or unauthenticated; cleared local records only");
    }

    let removed = state.store.lock().await.clear_events()?;
    println!("Removed {} local record(s)", removed);
    Ok(())
}
