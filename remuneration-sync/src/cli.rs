///
/// This module implements the CLI of remuneration-sync: command parsing,
/// the `run` entry point and user-visible output.
///
/// All domain logic (index generation, processing, orchestration) lives in
/// the [`remuneration-sync-core`] crate. This module is glue: it loads the
/// configuration, builds the concrete clients and reports the outcome.
///
/// ## How To Use
/// - From the shell: `remuneration-sync publish` with the environment set, or
///   `remuneration-sync index --dir <DIR>` to inspect a generated index.
/// - Programmatically or in tests: call [`run`] with a constructed [`Cli`].
///
/// [`remuneration-sync-core`]: ../../remuneration-sync-core/
use crate::clients::build_collaborators;
use crate::load_config::{load_config, Overrides};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use remuneration_sync_core::crawl::CrawlProcessor;
use remuneration_sync_core::index::generate_index;
use remuneration_sync_core::publish::{publish_month, PublishOutcome};
use std::path::{Path, PathBuf};

/// CLI for remuneration-sync: publish a month of remuneration spreadsheets.
#[derive(Parser)]
#[clap(
    name = "remuneration-sync",
    version,
    about = "Process a month of remuneration spreadsheets and email the administrators the outcome"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one publication: resolve the index, process it, notify the administrators
    Publish {
        /// Optional YAML file with non-secret settings
        #[clap(long)]
        config: Option<PathBuf>,
        /// Month to publish (overrides MONTH)
        #[clap(long)]
        month: Option<u32>,
        /// Year to publish (overrides YEAR)
        #[clap(long)]
        year: Option<i32>,
        /// Remote index page (overrides MONTH_URL)
        #[clap(long)]
        month_url: Option<String>,
        /// Local spreadsheets directory (overrides LOCAL_SPREADSHEETS_PATH)
        #[clap(long)]
        spreadsheets_path: Option<PathBuf>,
    },
    /// Generate the index page for a local directory and keep it on disk
    Index {
        /// Directory whose entries are listed
        #[clap(long)]
        dir: PathBuf,
        /// Where to write the page
        #[clap(long, default_value = "index.html")]
        output: PathBuf,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Publish {
            config,
            month,
            year,
            month_url,
            spreadsheets_path,
        } => {
            let overrides = Overrides {
                month,
                year,
                month_url,
                spreadsheets_path,
            };
            publish(config.as_deref(), &overrides).await
        }
        Commands::Index { dir, output } => write_index(&dir, &output),
    }
}

async fn publish(config_path: Option<&Path>, overrides: &Overrides) -> Result<()> {
    let config = load_config(config_path, overrides).context("failed to load configuration")?;
    config.trace_loaded();

    let collaborators =
        build_collaborators(&config).context("failed to initialise collaborators")?;
    let processor = CrawlProcessor::new();
    let admins = &config.notification.admins_mail;

    tracing::info!(command = "publish", period = %config.period, "Starting publication");
    let outcome = publish_month(
        &config,
        &processor,
        &collaborators.clients,
        &collaborators.notifier,
    )
    .await
    .map_err(|e| {
        tracing::error!(command = "publish", error = %e, "Publication aborted");
        anyhow::Error::new(e)
    })?;

    match outcome {
        PublishOutcome::Published { report } => {
            tracing::info!(command = "publish", ?report, "Publication complete");
            println!("Month {} successfully published.", report.period);
            println!("an email with the results was sent to: {admins}");
        }
        PublishOutcome::FailureReported { period, error } => {
            tracing::warn!(command = "publish", %period, error = %error, "Publication failed and was reported");
            println!("Publishing {period} failed: {error}");
            println!("an email with the errors was sent to: {admins}");
        }
    }
    Ok(())
}

fn write_index(dir: &Path, output: &Path) -> Result<()> {
    // Generate next to the target so the final rename stays on one file system.
    let output_dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let document = generate_index(dir, output_dir)
        .with_context(|| format!("failed to generate index for {}", dir.display()))?;
    let links = document.links().len();
    let kept = document
        .persist(output)
        .with_context(|| format!("failed to keep index at {}", output.display()))?;

    tracing::info!(command = "index", path = %kept.display(), links, "Index written");
    println!("{}", kept.display());
    Ok(())
}
