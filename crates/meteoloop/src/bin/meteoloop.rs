//! Meteoloop CLI
//!
//! Usage:
//!   meteoloop run                          # Start the cron scheduler
//!   meteoloop once [--latitude X ...]      # Fetch and persist once
//!   meteoloop fetch [--latitude X ...]     # Fetch only, print the envelope
//!   meteoloop persist [--input FILE]       # Persist an envelope or state event
//!   meteoloop show <record_id>             # Read a stored observation
//!
//! Global: `-c <config.yaml>`, `--dry-run` (in-memory sinks).

use anyhow::Context;
use argh::FromArgs;
use std::collections::HashMap;
use std::io::Read;
use std::path::PathBuf;
use tokio::sync::watch;

use meteoloop::envelope::PersistEnvelope;
use meteoloop::scheduler::run_scheduler;
use meteoloop::sinks::{RecordStore, Sinks, SqliteRecordStore};
use meteoloop::{Persister, Pipeline, PipelineConfig};

/// Meteoloop: scheduled weather ingestion from Open-Meteo
#[derive(FromArgs)]
struct Args {
    /// path to YAML configuration file
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// use in-memory sinks instead of SQLite, filesystem and Zenoh
    #[argh(switch)]
    dry_run: bool,

    #[argh(subcommand)]
    command: Command,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Command {
    Run(RunArgs),
    Once(OnceArgs),
    Fetch(FetchArgs),
    Persist(PersistArgs),
    Show(ShowArgs),
}

/// Start the cron scheduler (Ctrl+C to stop)
#[derive(FromArgs)]
#[argh(subcommand, name = "run")]
struct RunArgs {}

/// Fetch and persist one observation, print the result envelope
#[derive(FromArgs)]
#[argh(subcommand, name = "once")]
struct OnceArgs {
    /// latitude in decimal degrees (default: configured location)
    #[argh(option)]
    latitude: Option<String>,

    /// longitude in decimal degrees (default: configured location)
    #[argh(option)]
    longitude: Option<String>,
}

/// Fetch the forecast only, print the fetch envelope
#[derive(FromArgs)]
#[argh(subcommand, name = "fetch")]
struct FetchArgs {
    /// latitude in decimal degrees (default: configured location)
    #[argh(option)]
    latitude: Option<String>,

    /// longitude in decimal degrees (default: configured location)
    #[argh(option)]
    longitude: Option<String>,
}

/// Persist a fetch envelope or state event read from a file or stdin
#[derive(FromArgs)]
#[argh(subcommand, name = "persist")]
struct PersistArgs {
    /// input JSON file (default: stdin)
    #[argh(option, short = 'i')]
    input: Option<PathBuf>,
}

/// Print a stored observation as JSON
#[derive(FromArgs)]
#[argh(subcommand, name = "show")]
struct ShowArgs {
    /// record id
    #[argh(positional)]
    record_id: String,
}

fn query_params(latitude: Option<String>, longitude: Option<String>) -> HashMap<String, String> {
    let mut params = HashMap::new();
    if let Some(lat) = latitude {
        params.insert("latitude".to_string(), lat);
    }
    if let Some(lon) = longitude {
        params.insert("longitude".to_string(), lon);
    }
    params
}

async fn open_sinks(config: &PipelineConfig, dry_run: bool) -> anyhow::Result<Sinks> {
    if dry_run {
        log::info!("Dry run: using in-memory sinks");
        return Ok(Sinks::in_memory());
    }
    Sinks::open(config).await.context("Failed to open sinks")
}

fn print_envelope(envelope: &PersistEnvelope) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(envelope)?);
    if !envelope.is_success() {
        anyhow::bail!("persist returned status {}", envelope.status_code);
    }
    Ok(())
}

fn setup_shutdown() -> anyhow::Result<watch::Receiver<()>> {
    let (tx, rx) = watch::channel(());
    ctrlc::set_handler(move || {
        log::info!("Shutdown signal received");
        let _ = tx.send(());
    })?;
    Ok(rx)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Args = argh::from_env();

    if let Some(path) = &args.config {
        log::info!("Loading config from: {}", path.display());
    }
    let config = PipelineConfig::load(args.config.as_deref())?;

    match args.command {
        Command::Run(_) => {
            let sinks = open_sinks(&config, args.dry_run).await?;
            let pipeline = Pipeline::from_config(&config, sinks)?;
            let shutdown = setup_shutdown()?;
            log::info!(
                "Fetching {} on '{}'",
                pipeline.location(),
                config.schedule.cron
            );
            let ticks =
                run_scheduler(&pipeline, &config.schedule, pipeline.location(), shutdown).await?;
            log::info!("Scheduler stopped after {} ticks", ticks);
        }
        Command::Once(a) => {
            let sinks = open_sinks(&config, args.dry_run).await?;
            let pipeline = Pipeline::from_config(&config, sinks)?;
            let envelope = pipeline
                .run_query(&query_params(a.latitude, a.longitude))
                .await;
            print_envelope(&envelope)?;
        }
        Command::Fetch(a) => {
            let pipeline = Pipeline::from_config(&config, Sinks::in_memory())?;
            let envelope = pipeline
                .fetcher()
                .fetch_from_query(&query_params(a.latitude, a.longitude))
                .await;
            println!("{}", serde_json::to_string_pretty(&envelope)?);
            if !envelope.is_success() {
                anyhow::bail!("fetch returned status {}", envelope.status_code);
            }
        }
        Command::Persist(a) => {
            let raw = match &a.input {
                Some(path) => std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                None => {
                    let mut buf = String::new();
                    std::io::stdin().read_to_string(&mut buf)?;
                    buf
                }
            };
            let event: serde_json::Value =
                serde_json::from_str(&raw).context("Input is not valid JSON")?;
            let sinks = open_sinks(&config, args.dry_run).await?;
            let persister = Persister::new(sinks, config.fetch.temperature_source)
                .with_subject(config.notify.subject.clone());
            print_envelope(&persister.persist_event(&event).await)?;
        }
        Command::Show(a) => {
            if args.dry_run {
                anyhow::bail!("show reads the record store; --dry-run has nothing to show");
            }
            let store = SqliteRecordStore::open(&config.store.database_path)?;
            match store.get(&a.record_id).await? {
                Some(observation) => {
                    println!("{}", serde_json::to_string_pretty(&observation)?)
                }
                None => anyhow::bail!("no observation with record_id '{}'", a.record_id),
            }
        }
    }

    Ok(())
}
