//! Dataport: a local cache and transfer engine for remote, versioned datasets.
//!
//! A dataset version lives in a remote service backed by object storage.
//! Dataport keeps a file-based replica of it on disk, refreshes that replica
//! when the remote version changes, and drives the service's asynchronous
//! jobs (export, import, release, ETL, evaluation) to completion.
//!
//! # Modules
//!
//! - [`format`]: Logical and physical dataset formats
//! - [`job`]: Polling driver for asynchronous remote jobs
//! - [`cache`]: On-disk cache layout and validity checks
//! - [`transfer`]: Export/download and package/upload pipelines
//! - [`entities`]: Paginated entity listing with bounded content retries
//! - [`tasks`]: Dataset lifecycle, release, ETL and evaluation
//! - [`error`]: Error types for dataport operations

pub mod archive;
pub mod batch;
pub mod cache;
pub mod config;
pub mod dataset;
pub mod entities;
pub mod error;
pub mod format;
pub mod job;
pub mod remote;
pub mod store;
pub mod table;
pub mod tasks;
pub mod timestamp;
pub mod transfer;

pub use config::TransferConfig;
pub use dataset::DatasetRef;
pub use error::DataportError;
pub use format::{LogicalFormat, PhysicalFormat};

#[cfg(feature = "http")]
pub use cli::run;

#[cfg(feature = "http")]
mod cli {
    use std::io::{self, Write};
    use std::ops::RangeInclusive;
    use std::path::PathBuf;

    use clap::{Parser, Subcommand};
    use tracing_subscriber::EnvFilter;

    use crate::cache::CacheManager;
    use crate::config::TransferConfig;
    use crate::dataset::{Credentials, StorageOverride};
    use crate::entities::{self, EntitySelector};
    use crate::error::DataportError;
    use crate::remote::http::HttpDatasetService;
    use crate::store::http::HttpObjectStore;
    use crate::tasks;
    use crate::transfer::{self, SaveOptions, SaveSource};

    /// The dataport CLI application.
    #[derive(Parser)]
    #[command(name = "dataport")]
    #[command(version, author, about)]
    #[command(propagate_version = true)]
    struct Cli {
        /// TOML config file.
        #[arg(long, global = true, env = "DATAPORT_CONFIG")]
        config: Option<PathBuf>,

        /// Cache root (overrides config and environment).
        #[arg(long, global = true)]
        cache_dir: Option<PathBuf>,

        /// Log more (-v for debug, -vv for trace).
        #[arg(short, long, global = true, action = clap::ArgAction::Count)]
        verbose: u8,

        #[command(subcommand)]
        command: Option<Commands>,
    }

    /// Available subcommands.
    #[derive(Subcommand)]
    enum Commands {
        /// Refresh (or reuse) the local cache of a dataset version.
        Fetch {
            /// Dataset version id.
            version_id: String,
        },
        /// List entities of a dataset version with their content.
        List(ListArgs),
        /// Upload a file or folder and import it into a dataset version.
        Save(SaveArgs),
        /// Show what is cached for a dataset version.
        CacheInfo {
            /// Dataset version id.
            version_id: String,
        },
    }

    #[derive(clap::Args)]
    struct ListArgs {
        /// Dataset version id.
        version_id: String,

        /// Single entity offset.
        #[arg(long, conflicts_with = "range", required_unless_present = "range")]
        offset: Option<u64>,

        /// Inclusive offset range, e.g. `0..=9`.
        #[arg(long, value_parser = parse_range)]
        range: Option<RangeInclusive<u64>>,
    }

    #[derive(clap::Args)]
    struct SaveArgs {
        /// Dataset version id.
        version_id: String,

        /// File or folder already in the dataset's physical format.
        input: PathBuf,

        /// The data carries annotations.
        #[arg(long)]
        annotated: bool,

        /// Release the version after the import finished.
        #[arg(long)]
        release: bool,

        /// Target bucket (requires --path and --region).
        #[arg(long, requires_all = ["path", "region"])]
        bucket: Option<String>,

        /// Target key prefix.
        #[arg(long, requires = "bucket")]
        path: Option<String>,

        /// Target region.
        #[arg(long, requires = "bucket")]
        region: Option<String>,

        #[arg(long)]
        access_key: Option<String>,

        #[arg(long)]
        secret_key: Option<String>,
    }

    fn parse_range(value: &str) -> Result<RangeInclusive<u64>, String> {
        let (start, end) = value
            .split_once("..=")
            .ok_or_else(|| format!("expected START..=END, got '{value}'"))?;
        let start: u64 = start
            .trim()
            .parse()
            .map_err(|_| format!("invalid range start '{start}'"))?;
        let end: u64 = end
            .trim()
            .parse()
            .map_err(|_| format!("invalid range end '{end}'"))?;
        if end < start {
            return Err(format!("range {start}..={end} is empty"));
        }
        Ok(start..=end)
    }

    fn init_tracing(verbose: u8) {
        let default = match verbose {
            0 => "dataport=info",
            1 => "dataport=debug",
            _ => "dataport=trace",
        };
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
        // A subscriber may already be installed when embedded; keep it.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    }

    fn load_config(cli: &Cli) -> Result<TransferConfig, DataportError> {
        let config = match &cli.config {
            Some(path) => TransferConfig::load(path)?,
            None => TransferConfig::default(),
        };
        let mut config = config.with_env_overrides()?;
        if let Some(dir) = &cli.cache_dir {
            config.cache_root = dir.clone();
        }
        Ok(config)
    }

    /// Run the dataport CLI.
    ///
    /// This is the main entry point for the CLI, called from `main.rs`.
    pub fn run() -> Result<(), DataportError> {
        let cli = Cli::parse();
        init_tracing(cli.verbose);

        let Some(command) = &cli.command else {
            println!("dataport {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Local cache and transfer engine for remote, versioned datasets.");
            println!();
            println!("Run 'dataport --help' for usage information.");
            return Ok(());
        };

        let config = load_config(&cli)?;
        let service = HttpDatasetService::from_config(&config)?;

        match command {
            Commands::Fetch { version_id } => {
                let store = HttpObjectStore::from_config(&config)?;
                let cache = CacheManager::from_config(&config);
                let dataset = tasks::get_existing_dataset(version_id, &service, &config)?;
                let table = tasks::fetch(&dataset, &cache, &service, &store, &config)?;
                let paths = cache.paths(&dataset.cache_key())?;

                println!(
                    "Dataset {} v{} ({}, stored as {})",
                    dataset.dataset_id,
                    dataset.version,
                    dataset.format,
                    dataset.physical_format()
                );
                println!("  rows:  {}", table.len());
                println!("  cache: {}", paths.dir.display());
                Ok(())
            }
            Commands::List(args) => {
                let store = HttpObjectStore::from_config(&config)?;
                let dataset = tasks::get_existing_dataset(&args.version_id, &service, &config)?;
                let selector = match (&args.offset, &args.range) {
                    (Some(offset), _) => EntitySelector::Offset(*offset),
                    (None, Some(range)) => EntitySelector::Range(range.clone()),
                    (None, None) => {
                        return Err(DataportError::Config {
                            message: "either --offset or --range is required".to_string(),
                        })
                    }
                };
                let listed =
                    entities::list_entities(&dataset, &selector, &service, &store, &config)?;
                let mut out = io::stdout().lock();
                for entity in listed {
                    serde_json::to_writer(&mut out, &entity)
                        .map_err(|source| DataportError::OutputWrite { source })?;
                    writeln!(out)?;
                }
                Ok(())
            }
            Commands::Save(args) => {
                let store = HttpObjectStore::from_config(&config)?;
                let dataset = tasks::get_existing_dataset(&args.version_id, &service, &config)?;
                let storage_override = match (&args.bucket, &args.path, &args.region) {
                    (Some(bucket), Some(path), Some(region)) => Some(StorageOverride {
                        bucket: bucket.clone(),
                        path: path.clone(),
                        region: region.clone(),
                    }),
                    _ => None,
                };
                let credentials = match (&args.access_key, &args.secret_key) {
                    (None, None) => None,
                    (ak, sk) => Some(Credentials::new(
                        ak.clone().unwrap_or_default(),
                        sk.clone().unwrap_or_default(),
                    )),
                };
                let options = SaveOptions {
                    is_annotated: args.annotated,
                    release_after: args.release,
                    storage_override,
                    credentials,
                };

                let outcome = transfer::save(
                    &dataset,
                    SaveSource::Path(&args.input),
                    &options,
                    &service,
                    &store,
                    &config,
                )?;
                println!(
                    "Uploaded {} to {}/{} (import task {}{})",
                    args.input.display(),
                    outcome.target.bucket,
                    outcome.object_key,
                    outcome.import_task_id,
                    if outcome.released { ", released" } else { "" }
                );
                Ok(())
            }
            Commands::CacheInfo { version_id } => {
                let cache = CacheManager::from_config(&config);
                let dataset = tasks::get_existing_dataset(version_id, &service, &config)?;
                let status = cache.status(&dataset.cache_key())?;

                println!("Cache entry: {}", status.paths.dir.display());
                match status.manifest {
                    Some(manifest) => {
                        println!("  export task: {}", manifest.task_id);
                        println!(
                            "  finished:    {}",
                            manifest.finish_time.as_deref().unwrap_or("unknown")
                        );
                        println!("  content:     {}", status.paths.content.display());
                    }
                    None => println!("  not cached"),
                }
                Ok(())
            }
        }
    }

}
