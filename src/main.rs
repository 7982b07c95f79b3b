use std::{fs::File, path::PathBuf};

use chrono::Utc;
use clap::Parser;
use tracing::info;

use quota_ledger::{
    MemoryStore, QuotaManager, Settings, dlq::StdErrDLQ, engine::Engine, ingestion::CsvReader,
    telemetry,
};

/// Replays quota commands from a CSV file and prints the resulting limits.
#[derive(Parser, Debug)]
#[command(name = "quota_ledger", version)]
struct Args {
    /// CSV file with `type, customer, ref, amount, cutoff` rows
    commands: PathBuf,

    /// Optional YAML settings file
    #[arg(short = 'f', long, env = "QUOTA_LEDGER_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main] // using Tokio runtime for async
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    telemetry::init_telemetry()?;

    let settings = Settings::load(args.config.as_deref())?;
    info!(
        default_max_limit = %settings.default_max_limit,
        default_reservation_ttl = ?settings.default_reservation_ttl,
        "settings loaded"
    );

    // Set up the components
    let file = File::open(&args.commands)?;
    let ingestion = CsvReader::new(file)?;
    let store = MemoryStore::new(settings.sweep_page_size);
    let manager = QuotaManager::new(store, &settings);

    // Initialize engine with injected components
    let mut engine = Engine::new(ingestion, manager, StdErrDLQ::default());
    engine.process().await?;

    let purged = engine.manager().store().purge_expired(Utc::now());
    info!(purged, "expired reservation rows purged");

    let stdout = std::io::stdout();
    engine.flush(&mut stdout.lock()).await?;

    Ok(())
}
