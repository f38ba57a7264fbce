//! Stagecrawl main entry point
//!
//! Pipelines are assembled in code from the library's stages; this binary works
//! on what they leave behind. It validates pipeline configurations and inspects
//! or clears the slot files of a run.

use anyhow::{bail, Context};
use clap::Parser;
use stagecrawl::config::{load_config_with_hash, PipelineConfig};
use stagecrawl::storage::SlotStore;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Stagecrawl: a resumable, bounded-concurrency crawl pipeline
///
/// Every stage of a pipeline run persists its output to a slot file named
/// after the run and the stage. A run that finds its slots resumes from them.
#[derive(Parser, Debug)]
#[command(name = "stagecrawl")]
#[command(version)]
#[command(about = "Inspect and manage resumable crawl pipelines", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show the pipeline settings without touching any slot
    #[arg(long, conflicts_with_all = ["stats", "clear"])]
    dry_run: bool,

    /// List the slots of the pipeline run (default)
    #[arg(long, conflicts_with_all = ["dry_run", "clear"])]
    stats: bool,

    /// Remove the slots of the pipeline run, or of a single stage, so the next
    /// run starts fresh
    #[arg(long, value_name = "STAGE", num_args = 0..=1, default_missing_value = "")]
    clear: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    if cli.dry_run {
        handle_dry_run(&config, &hash);
    } else if let Some(stage) = cli.clear.as_deref() {
        handle_clear(&config, (!stage.is_empty()).then_some(stage))?;
    } else {
        handle_stats(&config)?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("stagecrawl=info,warn"),
            1 => EnvFilter::new("stagecrawl=debug,info"),
            2 => EnvFilter::new("stagecrawl=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Handles the --dry-run mode: shows the validated configuration
fn handle_dry_run(config: &PipelineConfig, hash: &str) {
    println!("=== Stagecrawl Dry Run ===\n");

    println!("Pipeline:");
    println!("  Name: {}", config.pipeline.name);
    println!("  Slot directory: {}", config.pipeline.slot_dir.display());
    println!("  Max in flight: {}", config.pipeline.max_in_flight);
    println!(
        "  Progress refresh: {}ms",
        config.pipeline.refresh_interval_ms
    );

    println!("\nHTTP:");
    println!("  User agent: {}", config.http.user_agent);
    println!("  Timeout: {}s", config.http.timeout_secs);
    println!("  Connect timeout: {}s", config.http.connect_timeout_secs);

    println!("\nConfig hash: {}", hash);
    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: lists every slot of the run
fn handle_stats(config: &PipelineConfig) -> anyhow::Result<()> {
    let store = SlotStore::from_config(config);
    println!(
        "Slots of '{}' in {}\n",
        store.pipeline(),
        store.dir().display()
    );

    let entries = store.list().context("Failed to list slots")?;
    if entries.is_empty() {
        println!("No slots yet; the next run starts from scratch.");
        return Ok(());
    }

    for entry in &entries {
        let len = entry
            .len
            .map_or_else(|| "unreadable".to_string(), |n| format!("{} entries", n));
        println!(
            "  {:<40} {:>6} ({})",
            entry.key.file_name(),
            entry.key.kind,
            len
        );
    }
    println!("\n{} slot(s)", entries.len());

    Ok(())
}

/// Handles the --clear mode: removes slots so their stages run again
///
/// Slots are removed without being read, so a corrupt slot can be cleared.
fn handle_clear(config: &PipelineConfig, stage: Option<&str>) -> anyhow::Result<()> {
    let store = SlotStore::from_config(config);
    let removed = store.clear(stage).context("Failed to clear slots")?;

    if removed.is_empty() {
        if let Some(stage) = stage {
            bail!(
                "No slot for stage '{}' in pipeline '{}'",
                stage,
                store.pipeline()
            );
        }
        println!("Nothing to clear.");
        return Ok(());
    }

    for key in &removed {
        println!("✓ Removed {}", key.file_name());
    }

    Ok(())
}
