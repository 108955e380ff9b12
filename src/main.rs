//! Smart-Sweep main entry point
//!
//! This is the command-line interface for the Smart-Sweep collector.

use anyhow::{Context, Result};
use clap::Parser;
use smart_sweep::collector::{descriptor_for, run_sweep};
use smart_sweep::config::{load_config_with_hash, Config};
use smart_sweep::output::{
    generate_markdown_report, generate_report, load_statistics, print_statistics,
    print_sweep_report,
};
use smart_sweep::storage::{open_storage, SqliteStorage, Storage};
use std::path::{Path, PathBuf};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Smart-Sweep: a paginated ranked-list collector
///
/// Smart-Sweep collects ranked address lists from paginated JSON endpoints,
/// deduplicates them, and reports which addresses are new since the
/// previous run.
#[derive(Parser, Debug)]
#[command(name = "smart-sweep")]
#[command(version = "1.0.0")]
#[command(about = "A paginated ranked-list collector", long_about = None)]
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

    /// Clear stored history before sweeping
    #[arg(long)]
    fresh: bool,

    /// Validate config and show what would be collected without collecting
    #[arg(long, conflicts_with_all = ["stats", "export_report", "watch"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "export_report", "watch"])]
    stats: bool,

    /// Generate a markdown report from stored results and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats", "watch"])]
    export_report: bool,

    /// Repeat the sweep every collector.interval-minutes until Ctrl-C
    #[arg(long)]
    watch: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config)
    } else if cli.stats {
        handle_stats(&config)
    } else if cli.export_report {
        handle_export_report(&config)
    } else {
        handle_sweep(&config, &config_hash, cli.fresh, cli.watch).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("smart_sweep=info,warn"),
            1 => EnvFilter::new("smart_sweep=debug,info"),
            2 => EnvFilter::new("smart_sweep=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn open_database(config: &Config) -> Result<SqliteStorage> {
    open_storage(Path::new(&config.output.database_path))
        .with_context(|| format!("Failed to open database {}", config.output.database_path))
}

/// Handles the --dry-run mode: validates config and shows what would be collected
fn handle_dry_run(config: &Config) -> Result<()> {
    println!("=== Smart-Sweep Dry Run ===\n");

    println!("Collector Configuration:");
    println!("  Max concurrency: {}", config.collector.max_concurrency);
    println!(
        "  Retries: {} ({}ms apart)",
        config.collector.max_retries, config.collector.retry_delay_ms
    );
    match config.collector.per_fetch_timeout_ms {
        Some(ms) => println!("  Per-fetch timeout: {}ms", ms),
        None => println!("  Per-fetch timeout: none"),
    }
    println!("  Duplicate policy: {}", config.collector.duplicate_policy);
    println!("  Max pages per listing: {}", config.collector.max_pages);
    println!("  Watch interval: {} min", config.collector.interval_minutes);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    println!("  Report: {}", config.output.report_path);

    println!("\nSources ({}):", config.sources.len());
    for source in &config.sources {
        println!(
            "  - {} ({:?}, page size {}, {} partition(s))",
            source.name,
            source.transport,
            source.page_size,
            source.partitions.len()
        );
        if let Some(seed) = &source.seed {
            println!(
                "    seeded by {} via '{}' ({} at a time{})",
                seed.from,
                seed.param,
                seed.concurrency,
                seed.limit
                    .map(|l| format!(", top {}", l))
                    .unwrap_or_default()
            );
        }
        for variant in &source.variants {
            println!("    variant: {}", variant_label(variant));
        }
        for partition in &source.partitions {
            let descriptor = descriptor_for(source, partition)?;
            println!("    * {}: {}", partition, descriptor.for_page(1).url());
        }
    }

    println!("\n✓ Configuration is valid");

    Ok(())
}

fn variant_label(query: &str) -> &str {
    if query.trim().is_empty() {
        "(base query)"
    } else {
        query
    }
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = open_database(config)?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --export-report mode: writes the markdown report
fn handle_export_report(config: &Config) -> Result<()> {
    println!("=== Exporting Results Report ===\n");
    println!("Database: {}", config.output.database_path);
    println!("Output: {}", config.output.report_path);
    println!();

    let storage = open_database(config)?;

    tracing::info!("Loading stored results from database...");
    let report = generate_report(&storage, config.output.report_limit)?;

    generate_markdown_report(&report, Path::new(&config.output.report_path))?;

    println!(
        "✓ Report with {} stored record(s) exported to: {}",
        report.total_stored(),
        config.output.report_path
    );

    Ok(())
}

/// Handles the main sweep operation, once or on an interval
async fn handle_sweep(config: &Config, config_hash: &str, fresh: bool, watch: bool) -> Result<()> {
    let mut storage = open_database(config)?;

    if fresh {
        let removed = storage.clear_history()?;
        tracing::info!("Cleared {} stored record(s) before sweeping", removed);
    }

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, finishing in-flight pages");
            signal_token.cancel();
        }
    });

    if !watch {
        let report = run_sweep(config, config_hash, &mut storage, &cancel)
            .await
            .context("Sweep failed")?;
        print_sweep_report(&report);
        return Ok(());
    }

    tracing::info!(
        "Watching: sweeping every {} minute(s) until interrupted",
        config.collector.interval_minutes
    );
    let mut interval = tokio::time::interval(config.collector.interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        match run_sweep(config, config_hash, &mut storage, &cancel).await {
            Ok(report) => print_sweep_report(&report),
            Err(e) => tracing::error!("Sweep failed: {}", e),
        }
    }

    tracing::info!("Watch stopped");
    Ok(())
}
