//! yolo-ingest: YOLO dataset ingestion from object storage.
//!
//! A run takes one or more storage URIs (a zip archive, a single object or a
//! prefix that may itself hold archives), stages them locally, pairs every
//! image with its YOLO label file, re-uploads the staged tree under a fresh
//! run-scoped prefix and upserts dataset and image records so that ingesting
//! the same source twice updates records instead of duplicating them.
//!
//! # Modules
//!
//! - [`storage`]: storage URIs and object store clients
//! - [`source`]: source acquisition and merging
//! - [`labels`]: label file resolution and YOLO line parsing
//! - [`destination`]: destination prefix planning
//! - [`upload`]: re-upload of the staging tree
//! - [`metadata`]: dataset and image persistence
//! - [`pipeline`]: the orchestrator and its run report
//! - [`error`]: error types

pub mod config;
pub mod destination;
pub mod error;
pub mod labels;
pub mod logging;
pub mod metadata;
pub mod model;
pub mod paths;
pub mod pipeline;
pub mod request;
pub mod source;
pub mod storage;
pub mod upload;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

pub use config::IngestSettings;
pub use error::IngestError;
pub use pipeline::{IngestReport, Ingestor, RunStage};
pub use request::IngestRequest;

use logging::LogFormat;
use metadata::{MetadataStore, SqliteStore};
use model::{DatasetRecord, ImageEntry, ImageRecord};
use storage::ObjectStorage;

/// The yolo-ingest CLI application.
#[derive(Parser)]
#[command(name = "yolo-ingest")]
#[command(version, about)]
#[command(propagate_version = true)]
struct Cli {
    /// Log rendering on stderr.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a dataset from object storage.
    Ingest(IngestArgs),
    /// Resolve labels for a local directory without uploading anything.
    Scan(ScanArgs),
    /// List ingested datasets.
    Datasets(DatasetsArgs),
    /// List image records of one dataset, a page at a time.
    Images(ImagesArgs),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Settings shared by every command that touches the metadata store.
#[derive(clap::Args)]
struct SettingsArgs {
    /// YAML settings file; flags and environment variables override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// SQLite database for dataset and image records.
    #[arg(long = "db", env = "METADATA_DB")]
    metadata_db: Option<PathBuf>,
}

#[derive(clap::Args)]
struct IngestArgs {
    /// Dispatcher payload: {"dataset_name", "gcs_uri" | "gcs_uris", "format"}.
    #[arg(long, conflicts_with_all = ["dataset_name", "source_uri"])]
    payload: Option<String>,

    /// Dataset name (unique key for re-ingestion).
    #[arg(long)]
    dataset_name: Option<String>,

    /// Source URI; repeat for several sources merged into one dataset.
    #[arg(long = "source-uri")]
    source_uri: Vec<String>,

    /// Label format of the source.
    #[arg(long, default_value = request::YOLO_FORMAT)]
    format: String,

    /// Destination bucket (defaults to the source bucket).
    #[arg(long, env = "GCS_BUCKET")]
    destination_bucket: Option<String>,

    /// Base folder of destination prefixes.
    #[arg(long, env = "EXTRACT_PREFIX_BASE")]
    base_folder: Option<String>,

    /// Pin the run id instead of generating one.
    #[arg(long, env = "EXTRACT_RUN_ID")]
    run_id: Option<String>,

    /// Concurrent object transfers.
    #[arg(long, env = "INGEST_CONCURRENCY")]
    concurrency: Option<usize>,

    /// Image records per bulk write.
    #[arg(long, env = "INGEST_CHUNK_SIZE")]
    chunk_size: Option<usize>,

    /// Abort the run after this many seconds.
    #[arg(long, env = "INGEST_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,

    #[command(flatten)]
    settings: SettingsArgs,

    /// Output format for the run report.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,
}

#[derive(clap::Args)]
struct ScanArgs {
    /// Local dataset directory.
    dir: PathBuf,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,
}

#[derive(clap::Args)]
struct DatasetsArgs {
    #[command(flatten)]
    settings: SettingsArgs,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,
}

#[derive(clap::Args)]
struct ImagesArgs {
    /// Dataset name.
    dataset_name: String,

    /// Page number, starting at 1.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
    page: u64,

    /// Records per page.
    #[arg(long, default_value_t = 50, value_parser = clap::value_parser!(u64).range(1..=10_000))]
    page_size: u64,

    #[command(flatten)]
    settings: SettingsArgs,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,
}

/// Run the yolo-ingest CLI.
///
/// This is the main entry point for the CLI, called from `main.rs`.
pub fn run() -> Result<(), IngestError> {
    let cli = Cli::parse();
    logging::init_tracing(cli.log_format);

    match cli.command {
        Commands::Ingest(args) => run_ingest(args),
        Commands::Scan(args) => run_scan(args),
        Commands::Datasets(args) => run_datasets(args),
        Commands::Images(args) => run_images(args),
    }
}

fn load_settings(args: &SettingsArgs) -> Result<IngestSettings, IngestError> {
    let mut settings = match &args.config {
        Some(path) => IngestSettings::from_file(path)?,
        None => IngestSettings::default(),
    };
    if let Some(db) = &args.metadata_db {
        settings.metadata_db = db.clone();
    }
    Ok(settings)
}

fn open_store(settings: &IngestSettings) -> Result<SqliteStore, IngestError> {
    SqliteStore::open(&settings.metadata_db)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), IngestError> {
    let json = serde_json::to_string_pretty(value).map_err(std::io::Error::from)?;
    println!("{json}");
    Ok(())
}

/// Execute the ingest subcommand.
fn run_ingest(args: IngestArgs) -> Result<(), IngestError> {
    let request = match &args.payload {
        Some(payload) => IngestRequest::from_json(payload)?,
        None => IngestRequest {
            format: args.format.clone(),
            ..IngestRequest::new(
                args.dataset_name.clone().unwrap_or_default(),
                args.source_uri.clone(),
            )
        },
    };
    // Fail on a bad request before touching storage or the database.
    request.validate()?;

    let mut settings = load_settings(&args.settings)?;
    if let Some(bucket) = args.destination_bucket {
        settings.destination_bucket = Some(bucket);
    }
    if let Some(base_folder) = args.base_folder {
        settings.base_folder = base_folder;
    }
    if let Some(run_id) = args.run_id {
        settings.run_id = Some(run_id);
    }
    if let Some(concurrency) = args.concurrency {
        settings.concurrency = concurrency;
    }
    if let Some(chunk_size) = args.chunk_size {
        settings.chunk_size = chunk_size;
    }
    if let Some(timeout_secs) = args.timeout_secs {
        settings.timeout_secs = Some(timeout_secs);
    }
    settings.validate()?;

    let store: Arc<dyn MetadataStore> = Arc::new(open_store(&settings)?);
    let ingestor = Ingestor::new(Arc::new(ObjectStorage::from_env()), store, settings)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let report = runtime.block_on(ingestor.ingest(&request))?;

    match args.output {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Text => {
            println!("{report}");
            Ok(())
        }
    }
}

#[derive(Serialize)]
struct ScanSummary<'a> {
    images: usize,
    labeled_images: usize,
    unreadable_labels: usize,
    entries: &'a [ImageEntry],
}

/// Execute the scan subcommand.
fn run_scan(args: ScanArgs) -> Result<(), IngestError> {
    if !args.dir.is_dir() {
        return Err(IngestError::InvalidRequest(format!(
            "{} is not a directory",
            args.dir.display()
        )));
    }
    let outcome = labels::scan(&args.dir)?;

    match args.output {
        OutputFormat::Json => print_json(&ScanSummary {
            images: outcome.image_count(),
            labeled_images: outcome.labeled_count(),
            unreadable_labels: outcome.unreadable_labels,
            entries: &outcome.entries,
        }),
        OutputFormat::Text => {
            for entry in &outcome.entries {
                println!("{}\t{} box(es)", entry.image_path, entry.labels.len());
            }
            println!(
                "{} images, {} with labels, {} unreadable label file(s)",
                outcome.image_count(),
                outcome.labeled_count(),
                outcome.unreadable_labels
            );
            Ok(())
        }
    }
}

/// Execute the datasets subcommand.
fn run_datasets(args: DatasetsArgs) -> Result<(), IngestError> {
    let settings = load_settings(&args.settings)?;
    let datasets = open_store(&settings)?.list_datasets()?;

    match args.output {
        OutputFormat::Json => print_json(&datasets),
        OutputFormat::Text => {
            if datasets.is_empty() {
                println!("No datasets.");
            }
            for dataset in &datasets {
                println!("{}", dataset_line(dataset));
            }
            Ok(())
        }
    }
}

fn dataset_line(dataset: &DatasetRecord) -> String {
    let location = dataset
        .location
        .as_ref()
        .map(|location| location.uri())
        .unwrap_or("-");
    format!(
        "{}\t{}\t{}\tupdated {}",
        dataset.name,
        dataset.id,
        location,
        dataset.updated_at.to_rfc3339()
    )
}

#[derive(Serialize)]
struct ImagePage<'a> {
    dataset: &'a DatasetRecord,
    page: u64,
    page_size: u64,
    total: usize,
    images: &'a [ImageRecord],
}

/// Execute the images subcommand.
fn run_images(args: ImagesArgs) -> Result<(), IngestError> {
    let settings = load_settings(&args.settings)?;
    let store = open_store(&settings)?;
    let dataset = store
        .find_dataset(&args.dataset_name)?
        .ok_or_else(|| IngestError::DatasetNotFound(args.dataset_name.clone()))?;

    let limit = usize::try_from(args.page_size).unwrap_or(usize::MAX);
    let offset =
        usize::try_from((args.page - 1).saturating_mul(args.page_size)).unwrap_or(usize::MAX);
    let total = store.count_images(&dataset.id)?;
    let images = store.list_images(&dataset.id, limit, offset)?;

    match args.output {
        OutputFormat::Json => print_json(&ImagePage {
            dataset: &dataset,
            page: args.page,
            page_size: args.page_size,
            total,
            images: &images,
        }),
        OutputFormat::Text => {
            for image in &images {
                println!("{}\t{} box(es)", image.image_path, image.labels.len());
            }
            println!(
                "page {} ({} per page): {} of {} image(s) in '{}'",
                args.page,
                args.page_size,
                images.len(),
                total,
                dataset.name
            );
            Ok(())
        }
    }
}
