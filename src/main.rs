//! SmellSense - multi-model LLM code smell detection
//!
//! A CLI tool that sends the source files of several releases to a set
//! of language models, collects the code smells each model reports and
//! writes per-model statistics, per-release trends and the findings
//! that several models agree on.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Configuration error, fatal runtime error, or no input files
//!   130 - Second Ctrl-C while in-flight calls were finishing

mod analysis;
mod cli;
mod config;
mod error;
mod llm;
mod models;
mod report;
mod scanner;
mod taxonomy;

use anyhow::{bail, Context, Result};
use chrono::Local;
use cli::Args;
use config::{Config, RunSettings};
use indicatif::{ProgressBar, ProgressStyle};
use llm::{ApiKey, HttpModelClient};
use models::{FileRecord, RunMetadata};
use report::ReportWriter;
use scanner::FileScanner;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Load configuration first so `[general] verbose` can set the log level
    let (config, config_origin) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(args.log_level(config.general.verbose));

    info!("SmellSense v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration: {}", config_origin);
    debug!("Arguments: {:?}", args);

    match run(args, config).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Run failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .smellsense.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(config::CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            config::CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", config::CONFIG_FILE_NAME))?;

    println!(
        "✅ Created {} with default settings.",
        config::CONFIG_FILE_NAME
    );
    println!("   Edit it to customize models, sampling, limits, and more.");
    Ok(())
}

/// Initialize logging at the given level.
fn init_logging(level: tracing::Level) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Run the complete analysis workflow. Returns the exit code.
async fn run(args: Args, mut config: Config) -> Result<i32> {
    let start_time = Instant::now();

    config.merge_with_args(&args);
    let settings = config.into_settings()?;

    // Step 1: Discover files
    let releases_dir = &args.releases_dir;
    if !releases_dir.is_dir() {
        bail!(
            "Releases directory not found: {}",
            releases_dir.display()
        );
    }

    println!("🔍 Scanning releases in: {}", releases_dir.display());
    let file_scanner = FileScanner::new(releases_dir.clone(), settings.scan.clone());
    let files = file_scanner.scan()?;

    if files.is_empty() {
        eprintln!("\n⚠️  No matching source files found.");
        return Ok(1);
    }

    println!("\n📦 Files per release:");
    for (release, count) in scanner::files_per_release(&files) {
        println!("   {}: {} files", release, count);
    }

    let files_discovered = files.len();
    let files = scanner::sample_files(files, settings.sample_size, settings.sampling);
    if files.len() < files_discovered {
        println!(
            "\n🎯 Sampled {} of {} files ({:?})",
            files.len(),
            files_discovered,
            settings.sampling
        );
    }

    // Handle --dry-run: list files and exit
    if args.dry_run {
        return Ok(handle_dry_run(&files, &settings));
    }

    // Step 2: Prepare the client; a missing credential stops the run here
    let api_key = ApiKey::from_env(&settings.client.api_key_env)?;
    let client = HttpModelClient::new(settings.client.clone(), api_key)?;

    println!("\n🤖 Models:");
    for model in &settings.models {
        println!("   - {}", model);
    }
    println!("   Endpoint: {}", settings.client.api_url);
    println!("   Timeout: {}s", settings.invoke.timeout.as_secs());

    let cancel = CancellationToken::new();
    spawn_cancel_sources(&cancel, args.run_timeout);

    // Step 3: Query every model for every file
    println!(
        "\n🔬 Analyzing {} files with {} models...\n",
        files.len(),
        settings.models.len()
    );

    let progress = if args.quiet {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(files.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
                )?
                .progress_chars("#>-"),
        );
        pb
    };

    let orchestrator = analysis::Orchestrator::new(&client, &settings, cancel.clone());
    let outcome = orchestrator
        .analyze_all(&file_scanner, &files, Some(&progress))
        .await;
    progress.finish_and_clear();

    if cancel.is_cancelled() {
        warn!("Run cancelled, reporting partial results");
    }

    // Step 4: Aggregate
    println!("\n📝 Aggregating results...");
    let stats = analysis::aggregate(&outcome.analyses, &settings.models, &settings.consensus)?;

    // Step 5: Write reports
    let metadata = RunMetadata {
        generated_at: Local::now(),
        releases_dir: releases_dir.display().to_string(),
        files_discovered,
        files_skipped: outcome.skipped.clone(),
        cancelled: cancel.is_cancelled(),
        duration_seconds: start_time.elapsed().as_secs_f64(),
    };

    let writer = ReportWriter::new(&settings.output_dir);
    let written = writer.write_all(&outcome.analyses, &stats, &metadata)?;

    // Print summary
    println!("\n📊 Analysis Summary:");
    println!("   Files analyzed: {}", stats.total_files_analyzed);
    for (model, model_stats) in &stats.by_model {
        println!(
            "   - {}: {} smells, {} failed calls",
            model, model_stats.total, model_stats.failures
        );
    }
    println!("   Consensus smells: {}", stats.consensus.len());
    for (path, count) in analysis::most_smelly_files(&outcome.analyses, 3) {
        println!("   📄 {} ({} smells)", path, count);
    }
    if !outcome.skipped.is_empty() {
        println!("   Skipped unreadable files: {}", outcome.skipped.len());
    }
    println!("   Duration: {:.1}s", metadata.duration_seconds);

    println!("\n✅ Analysis complete! Results saved to:");
    println!("   {}", written.analysis.display());
    println!("   {}", written.comparison.display());
    println!("   {}", written.report.display());

    Ok(0)
}

/// Cancel the run on Ctrl-C, or once `run_timeout` seconds have passed.
///
/// A second Ctrl-C exits immediately with code 130.
fn spawn_cancel_sources(cancel: &CancellationToken, run_timeout: Option<u64>) {
    tokio::spawn(handle_interrupts(
        || async { tokio::signal::ctrl_c().await.is_ok() },
        cancel.clone(),
        || {
            std::process::exit(130);
        },
    ));

    if let Some(secs) = run_timeout {
        let token = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            warn!("Run timeout of {}s reached", secs);
            token.cancel();
        });
    }
}

/// Cancel `token` on the first interrupt and call `force_quit` on the second.
///
/// `next_interrupt` resolves to `false` when no more interrupts can arrive.
async fn handle_interrupts<S, Fut, Q>(
    mut next_interrupt: S,
    token: CancellationToken,
    force_quit: Q,
) where
    S: FnMut() -> Fut,
    Fut: Future<Output = bool>,
    Q: FnOnce(),
{
    if !next_interrupt().await {
        return;
    }
    eprintln!("\n⚠️  Interrupted, finishing in-flight calls (Ctrl-C again to quit)...");
    warn!("Run cancelled by user");
    token.cancel();

    if next_interrupt().await {
        eprintln!("\n⛔ Interrupted again, exiting.");
        force_quit();
    }
}

/// Handle --dry-run: print what would be analyzed, no model calls.
fn handle_dry_run(files: &[FileRecord], settings: &RunSettings) -> i32 {
    println!("\n🔍 Dry run: no model calls will be made.\n");
    println!(
        "   {} files would be analyzed by {} models:\n",
        files.len(),
        settings.models.len()
    );
    for file in files {
        println!("     📄 {} [{}] ({} bytes)", file.path, file.release_tag, file.size);
    }
    println!("\n   Models: {}", settings.models.join(", "));
    println!(
        "   Calls: {}",
        files.len() * settings.models.len()
    );

    println!("\n✅ Dry run complete.");
    0
}

/// Load configuration from file or use defaults.
///
/// Runs before logging is set up, so it returns a description of where
/// the configuration came from instead of logging it.
fn load_config(args: &Args) -> Result<(Config, String)> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        let config = Config::load(config_path)?;
        return Ok((config, format!("loaded from {}", config_path.display())));
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => Ok((
            config,
            format!("loaded default config from {}", config::CONFIG_FILE_NAME),
        )),
        Ok(None) => Ok((
            Config::default(),
            "no config file found, using defaults".to_string(),
        )),
        Err(e) => {
            eprintln!("⚠️  Failed to load config: {:#}", e);
            Ok((Config::default(), "using defaults".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tokio::sync::{mpsc, Mutex};

    type Interrupt = Pin<Box<dyn Future<Output = bool> + Send>>;

    /// Interrupt source fed by a channel; closing it ends the interrupts.
    fn interrupts(rx: mpsc::UnboundedReceiver<()>) -> impl FnMut() -> Interrupt {
        let rx = Arc::new(Mutex::new(rx));
        move || {
            let rx = rx.clone();
            Box::pin(async move { rx.lock().await.recv().await.is_some() })
        }
    }

    #[tokio::test]
    async fn test_second_interrupt_forces_quit() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(()).unwrap();
        tx.send(()).unwrap();

        let token = CancellationToken::new();
        let quit = Arc::new(AtomicBool::new(false));
        let flag = quit.clone();

        handle_interrupts(interrupts(rx), token.clone(), move || {
            flag.store(true, Ordering::SeqCst);
        })
        .await;

        assert!(token.is_cancelled());
        assert!(quit.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_single_interrupt_only_cancels() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(()).unwrap();
        drop(tx);

        let token = CancellationToken::new();
        let quit = Arc::new(AtomicBool::new(false));
        let flag = quit.clone();

        handle_interrupts(interrupts(rx), token.clone(), move || {
            flag.store(true, Ordering::SeqCst);
        })
        .await;

        assert!(token.is_cancelled());
        assert!(!quit.load(Ordering::SeqCst));
    }
}
