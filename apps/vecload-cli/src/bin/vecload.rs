use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use vecload_core::config::{resolve_with_base, Config, EmbeddingSettings, LoggingSettings, PineconeSettings, ProvisionMode, Settings};
use vecload_core::traits::{Embedder, VectorIndexClient};
use vecload_embed::load_embedder;
use vecload_index::{IndexProvisioner, InMemoryIndexClient, PineconeClient};
use vecload_pipeline::IngestPipeline;

/// Load JSON design records into a vector index.
#[derive(Parser, Debug)]
#[command(name = "vecload", version, about = "JSON records to vector index ingestion")]
struct Cli {
    /// Base config file; `config.<RUST_ENV>.toml` next to it is layered on top.
    #[arg(long, global = true, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Provision the index, embed every record and upsert it in batches.
    Ingest(IngestArgs),
    /// Only bring the index into the configured shape.
    Provision {
        #[command(flatten)]
        mode: ModeArgs,
    },
    /// Parse the input document and print record counts.
    Inspect {
        input: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
struct IngestArgs {
    /// Input document (defaults to `ingest.input`).
    input: Option<PathBuf>,
    #[arg(long)]
    index_name: Option<String>,
    #[arg(long)]
    batch_size: Option<usize>,
    #[command(flatten)]
    mode: ModeArgs,
    /// Write to an in-process index instead of Pinecone.
    #[arg(long)]
    dry_run: bool,
    #[arg(long)]
    no_progress: bool,
    /// Print the run report as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug, Default)]
struct ModeArgs {
    /// Delete and recreate the index if its configuration drifted.
    #[arg(long, conflicts_with = "always_recreate")]
    recreate_on_drift: bool,
    /// Delete and recreate the index on every run; existing vectors are lost.
    #[arg(long)]
    always_recreate: bool,
}

impl ModeArgs {
    fn apply(&self, settings: &mut Settings) {
        if self.always_recreate {
            settings.index.mode = ProvisionMode::AlwaysRecreate;
        } else if self.recreate_on_drift {
            settings.index.mode = ProvisionMode::RecreateOnDrift;
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            match e.downcast_ref::<vecload_core::Error>() {
                Some(fatal) => eprintln!("error [{}]: {e:#}", fatal.stage()),
                None => eprintln!("error: {e:#}"),
            }
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> Result<u8> {
    let config = Config::load_from(&cli.config).context("failed to load configuration")?;
    let mut settings = config.settings()?;
    init_tracing(&settings.logging);
    let base = config_dir(&cli.config);

    match cli.command {
        Commands::Ingest(args) => ingest(args, settings, &base).await,
        Commands::Provision { mode } => {
            mode.apply(&mut settings);
            let client = index_client(&settings.pinecone)?;
            let handle = IndexProvisioner::new(&client, settings.index.mode)
                .ensure(&settings.index.descriptor())
                .await?;
            info!(index = %handle.name, action = ?handle.action, host = ?handle.host, "index ready");
            Ok(0)
        }
        Commands::Inspect { input, json } => {
            let path = input.unwrap_or_else(|| resolve_with_base(&base, &settings.ingest.input));
            let set = settings.ingest.record_source().load(&path)?;
            if json {
                let summary = serde_json::json!({
                    "path": path.display().to_string(),
                    "elements": set.elements_seen,
                    "records": set.records.len(),
                    "missing_id": set.missing_id,
                    "duplicate_id": set.duplicate_id,
                });
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!(
                    "{}: {} elements, {} records, {} without id, {} duplicate ids",
                    path.display(),
                    set.elements_seen,
                    set.records.len(),
                    set.missing_id,
                    set.duplicate_id
                );
            }
            Ok(0)
        }
    }
}

async fn ingest(args: IngestArgs, mut settings: Settings, base: &Path) -> Result<u8> {
    if let Some(name) = args.index_name {
        settings.index.name = name;
    }
    if let Some(batch_size) = args.batch_size {
        settings.ingest.batch_size = batch_size;
    }
    args.mode.apply(&mut settings);
    settings.validate()?;

    let input = args.input.unwrap_or_else(|| resolve_with_base(base, &settings.ingest.input));
    let embedder = embedder(&settings.embedding, base)?;
    let client: Arc<dyn VectorIndexClient> = if args.dry_run {
        info!("dry run, writing to an in-process index");
        Arc::new(InMemoryIndexClient::new())
    } else {
        Arc::new(index_client(&settings.pinecone)?.with_namespace(settings.ingest.namespace.clone()))
    };

    let mut pipeline = IngestPipeline::from_settings(&settings, embedder, client);
    if !args.no_progress && !args.json {
        let mut driver = vecload_pipeline::DriverSettings::from_settings(&settings.ingest);
        driver.show_progress = true;
        pipeline = pipeline.with_driver_settings(driver);
    }

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("interrupt received, stopping before the next batch; press Ctrl-C again to exit now");
        let _ = cancel_tx.send(true);
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("second interrupt, exiting");
            std::process::exit(130);
        }
    });

    let report = pipeline.run_file(&input, Some(cancel_rx)).await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{report}");
    }
    Ok(report.outcome.exit_code())
}

fn index_client(settings: &PineconeSettings) -> vecload_core::Result<PineconeClient> {
    PineconeClient::from_settings(settings).map_err(|e| vecload_core::Error::InvalidConfig(format!("{e:#}")))
}

fn embedder(settings: &EmbeddingSettings, base: &Path) -> vecload_core::Result<Arc<dyn Embedder>> {
    load_embedder(settings, base).map_err(|e| vecload_core::Error::InvalidConfig(format!("embedding model: {e:#}")))
}

fn config_dir(config: &Path) -> PathBuf {
    match config.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn init_tracing(logging: &LoggingSettings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    match logging.format.as_str() {
        "json" => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
        _ => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
    }
}
