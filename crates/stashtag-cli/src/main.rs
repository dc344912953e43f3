use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;
use stashtag_adapters::DEFAULT_SOURCE_URL;
use stashtag_sync::{DatePolicy, EnrichConfig, Enricher, RunSummary};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "stashtag", version)]
#[command(about = "Fill in missing Stash scene metadata from posts matched by file hash")]
struct Cli {
    /// File or directory to process (directories are scanned one level deep)
    path: PathBuf,

    /// Base URL of the metadata API
    #[arg(short = 'u', long = "url", default_value = DEFAULT_SOURCE_URL)]
    url: String,

    /// URL of the Stash server
    #[arg(long = "stash")]
    stash: String,

    /// Make file paths relative to this directory before looking them up in Stash
    #[arg(long)]
    base_path: Option<PathBuf>,

    /// Report what would change without updating Stash
    #[arg(long)]
    dry_run: bool,

    /// Leave the scene date empty when a post's timestamp cannot be parsed, instead of failing
    #[arg(long)]
    lenient_dates: bool,

    /// Number of files fingerprinted and looked up concurrently
    #[arg(long, default_value_t = 1)]
    jobs: usize,

    /// HTTP request timeout in seconds (overrides STASHTAG_HTTP_TIMEOUT_SECS)
    #[arg(long)]
    timeout_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    match run(cli).await {
        Ok(summary) => {
            println!(
                "enrichment complete: run_id={} files={} matched={} updated={} \
                 unchanged={} skipped_ambiguous={} failures={}",
                summary.run_id,
                summary.files_scanned,
                summary.scenes_matched,
                summary.scenes_updated,
                summary.scenes_unchanged,
                summary.ambiguous,
                summary.fingerprint_failures
                    + summary.lookup_failures
                    + summary.catalog_query_failures
                    + summary.update_failures,
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<RunSummary> {
    if !cli.path.exists() {
        bail!("the provided path {} does not exist", cli.path.display());
    }

    let mut config = EnrichConfig::from_env(cli.stash);
    config.source_url = cli.url;
    if let Some(secs) = cli.timeout_secs {
        config.http_timeout_secs = secs;
    }
    config.run.base_path = cli.base_path;
    config.run.dry_run = cli.dry_run;
    config.run.lookup_concurrency = cli.jobs.max(1);
    if cli.lenient_dates {
        config.run.date_policy = DatePolicy::SkipField;
    }

    let enricher = Enricher::from_config(config).context("configuring remote clients")?;
    info!(config = ?enricher.config(), "starting enrichment run");
    enricher
        .run(&cli.path)
        .await
        .with_context(|| format!("processing {}", cli.path.display()))
}
