//! xrf-ingest - XRF lead inspection name normalization and classification
//!
//! Reads a JSON array of raw readings, normalizes component and substrate
//! names (cache → AI grouping → fallback), classifies each
//! (component, substrate) group and writes the ordered summary as JSON.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use xrf_common::config::{RootFolderInitializer, RootFolderResolver, TomlConfig};
use xrf_common::events::{EventBus, NormalizationDomain};
use xrf_ingest::config::{load_retry_policy, resolve_grouping_api_key, GROUPING_API_KEY_ENV};
use xrf_ingest::db::normalization_cache::{
    InMemoryNormalizationCache, NormalizationCache, SqliteNormalizationCache,
};
use xrf_ingest::db::{self, settings};
use xrf_ingest::services::{
    load_readings, ChatCompletionsTransport, InspectionPipeline, SemanticGroupingClient,
};

/// Capacity of the run event channel
const EVENT_BUS_CAPACITY: usize = 256;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "xrf-ingest")]
#[command(about = "Normalize and classify XRF lead inspection readings")]
#[command(version)]
struct Args {
    /// Root folder holding xrf.db (overrides XRF_ROOT_FOLDER and TOML)
    #[arg(short = 'r', long, global = true)]
    root_folder: Option<PathBuf>,

    /// Path to the TOML bootstrap config
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Normalize, classify and summarize a readings file
    Process {
        /// JSON array of readings
        #[arg(short, long)]
        input: PathBuf,

        /// Summary destination (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Use an in-memory cache instead of xrf.db
        #[arg(long)]
        no_cache: bool,

        /// Skip AI grouping; every uncached name falls back to title case
        #[arg(long)]
        no_ai: bool,

        /// Fail on readings with negative or non-numeric lead content
        /// instead of listing them as excluded
        #[arg(long)]
        strict: bool,
    },

    /// Store the grouping API key in the database
    SetApiKey {
        key: String,
    },

    /// Print stored normalization counts per domain
    CacheStats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml_config = TomlConfig::load_or_default(args.config.as_deref());

    init_tracing(&toml_config)?;

    info!(
        "Starting XRF ingest (xrf-ingest) v{}",
        env!("CARGO_PKG_VERSION")
    );

    let root_folder = RootFolderResolver::new()
        .with_cli_arg(args.root_folder.clone())
        .with_toml(&toml_config)
        .resolve();

    let initializer = RootFolderInitializer::new(root_folder);
    initializer.ensure_directory_exists()?;

    let db_path = initializer.database_path();
    info!("Database path: {}", db_path.display());

    let pool = match db::init_database_pool(&db_path).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to open database: {}", e);
            return Err(e.into());
        }
    };

    match args.command {
        Command::Process {
            input,
            output,
            no_cache,
            no_ai,
            strict,
        } => {
            let options = ProcessOptions {
                no_cache,
                no_ai,
                strict,
            };
            process(&pool, &toml_config, &input, output.as_deref(), options).await
        }
        Command::SetApiKey { key } => {
            if !xrf_ingest::config::is_valid_key(&key) {
                anyhow::bail!("API key must not be empty");
            }
            settings::set_grouping_api_key(&pool, key).await?;
            info!("Grouping API key stored in database");
            Ok(())
        }
        Command::CacheStats => cache_stats(pool).await,
    }
}

/// Install the tracing subscriber
///
/// `RUST_LOG` wins over the TOML level. Logs go to stderr unless the TOML
/// names a log file, keeping stdout free for the summary JSON.
fn init_tracing(toml_config: &TomlConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&toml_config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match &toml_config.logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            builder
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }

    Ok(())
}

/// Flags of the `process` subcommand
#[derive(Debug, Clone, Copy)]
struct ProcessOptions {
    no_cache: bool,
    no_ai: bool,
    strict: bool,
}

async fn process(
    pool: &SqlitePool,
    toml_config: &TomlConfig,
    input: &Path,
    output: Option<&Path>,
    options: ProcessOptions,
) -> Result<()> {
    let readings = load_readings(input)?;
    info!(count = readings.len(), "Loaded readings from {}", input.display());

    let cache: Arc<dyn NormalizationCache> = if options.no_cache {
        info!("Normalization cache disabled for this run");
        Arc::new(InMemoryNormalizationCache::new())
    } else {
        Arc::new(SqliteNormalizationCache::new(pool.clone()))
    };

    let grouping = if options.no_ai {
        info!("AI grouping disabled for this run");
        None
    } else {
        Some(build_grouping_client(pool, toml_config).await?)
    };

    let event_bus = EventBus::new(EVENT_BUS_CAPACITY);
    let pipeline = InspectionPipeline::new(cache, grouping).with_event_bus(event_bus);

    let report = if options.strict {
        match pipeline.run_strict(&readings).await {
            Ok(report) => report,
            Err(e) => {
                error!("{}", e);
                return Err(e.into());
            }
        }
    } else {
        pipeline.run(&readings).await
    };
    let json = serde_json::to_string_pretty(&report)?;

    match output {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
            info!("Summary written to {}", path.display());
        }
        None => println!("{}", json),
    }

    Ok(())
}

/// Build the grouping client from database settings and the resolved key
///
/// A missing key leaves the transport unconfigured: every grouping call then
/// fails with a configuration error and names fall back to title case.
async fn build_grouping_client(
    pool: &SqlitePool,
    toml_config: &TomlConfig,
) -> Result<SemanticGroupingClient> {
    let api_key = match resolve_grouping_api_key(pool, toml_config).await {
        Ok((key, source)) => {
            info!(key_source = source.as_str(), "AI grouping enabled");
            Some(key)
        }
        Err(e) => {
            warn!(
                error_kind = "configuration",
                "{}; uncached names will use fallback normalization",
                e
            );
            warn!("Set the key with `xrf-ingest set-api-key` or {}", GROUPING_API_KEY_ENV);
            None
        }
    };

    let policy = load_retry_policy(pool).await?;
    let transport = ChatCompletionsTransport::new(
        toml_config.grouping.endpoint.clone(),
        toml_config.grouping.model.clone(),
        api_key,
    )?;

    Ok(SemanticGroupingClient::new(Arc::new(transport), policy))
}

async fn cache_stats(pool: SqlitePool) -> Result<()> {
    let cache = SqliteNormalizationCache::new(pool);
    for domain in NormalizationDomain::all() {
        let count = cache.count(domain).await?;
        println!("{:<10} {}", domain.as_str(), count);
    }
    Ok(())
}
