//! Product photo batch CLI
//!
//! Stages every photo from a memory card (or any directory), removes backgrounds,
//! trims and flattens the results and optionally attaches them to catalog records.

use super::config::CliConfigBuilder;
use crate::{
    batch::{BatchReport, BatchRunner},
    cache::{format_size, ModelCache},
    models::ModelKind,
    services::ConsoleProgressReporter,
    tracing_config::{init_cli_tracing, DEFAULT_LOG_FILE},
    utils::ExecutionProviderManager,
};
use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;
use std::time::Instant;

/// Product photo pipeline: background removal, trimming and catalog upload
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "photoprep")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Memory card mount point or directory holding the photos
    #[arg(value_name = "SOURCE", required_unless_present_any = &["show_providers", "list_models", "clear_cache", "show_cache_dir"])]
    pub source: Option<PathBuf>,

    /// Root for the four output directories [default: ~/Desktop/eBay Pics]
    #[arg(short, long, value_name = "DIR")]
    pub output_root: Option<PathBuf>,

    /// Directory for verbatim copies of the originals [default: <output-root>/Original]
    #[arg(long, value_name = "DIR")]
    pub original_dir: Option<PathBuf>,

    /// Directory for background-removed PNGs [default: <output-root>/NB]
    #[arg(long, value_name = "DIR")]
    pub nb_dir: Option<PathBuf>,

    /// Directory for trimmed, flattened PNGs [default: <output-root>/NB_Trimmed]
    #[arg(long, value_name = "DIR")]
    pub nb_trimmed_dir: Option<PathBuf>,

    /// Directory for trimmed crops of the originals [default: <output-root>/Trimmed]
    #[arg(long, value_name = "DIR")]
    pub trimmed_dir: Option<PathBuf>,

    /// Segmentation model name, or "auto" to choose by object count
    #[arg(short, long, default_value = "isnet-general-use")]
    pub model: String,

    /// Fill colour for transparent areas, as "(R,G,B)"
    #[arg(short = 'c', long, default_value = "(255,255,255)")]
    pub background_color: String,

    /// Execution provider in format backend:provider (e.g., onnx:auto, onnx:coreml, tract:cpu)
    #[arg(short, long, default_value = "onnx:auto")]
    pub execution_provider: String,

    /// Intra-op threads per worker session (0 = backend default)
    #[arg(short, long, default_value_t = 0)]
    pub threads: usize,

    /// Worker threads (0 = one per available processing unit)
    #[arg(short = 'j', long, default_value_t = 0)]
    pub workers: usize,

    /// Look for a QR label, paint it out and name outputs after its content
    #[arg(long)]
    pub scan_codes: bool,

    /// Attach finished photos to catalog records (requires --scan-codes)
    #[arg(long, requires = "scan_codes")]
    pub publish: bool,

    /// Catalog credentials file [default: ~/.shiny/secret.json]
    #[arg(long, value_name = "PATH")]
    pub secret_file: Option<PathBuf>,

    /// Leave the source files in place after staging
    #[arg(long)]
    pub keep_source: bool,

    /// Eject the source medium once staging is done
    #[arg(long)]
    pub eject: bool,

    /// Model directory [default: $U2NET_HOME or ~/.u2net]
    #[arg(long, value_name = "PATH")]
    pub model_dir: Option<PathBuf>,

    /// Fail instead of downloading missing models
    #[arg(long)]
    pub no_download: bool,

    /// Also write logs to a file
    #[arg(long, value_name = "PATH", num_args = 0..=1, default_missing_value = DEFAULT_LOG_FILE)]
    pub log_file: Option<PathBuf>,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Show execution provider diagnostics and exit
    #[arg(long)]
    pub show_providers: bool,

    /// List known models and whether they are cached, then exit
    #[arg(long)]
    pub list_models: bool,

    /// Remove every cached model and exit
    #[arg(long)]
    pub clear_cache: bool,

    /// Show the model directory and exit
    #[arg(long)]
    pub show_cache_dir: bool,
}

pub fn main() -> Result<()> {
    let cli = Cli::parse();

    let _guard = init_cli_tracing(cli.verbose, cli.log_file.as_deref())
        .context("Failed to initialize tracing")?;

    if cli.show_providers {
        show_provider_diagnostics();
        return Ok(());
    }
    if cli.list_models {
        return list_models(&cli);
    }
    if cli.clear_cache {
        return clear_cache_models(&cli);
    }
    if cli.show_cache_dir {
        let cache = open_cache(&cli)?;
        println!("{}", cache.get_current_cache_dir().display());
        return Ok(());
    }

    let job = CliConfigBuilder::from_cli(&cli).context("Invalid configuration")?;
    info!(
        "Source: {}, model: {}, fill: {}",
        job.source_root.display(),
        job.model,
        job.fill_color
    );
    if job.scan_codes && !job.publishing_enabled() && cli.publish {
        warn!("Publishing requested but no catalog credentials are configured");
    }

    let runner = BatchRunner::new(job).context("Failed to prepare batch")?;
    runner
        .provision_models(true)
        .context("Failed to provision segmentation models")?;

    let start = Instant::now();
    let reporter = ConsoleProgressReporter::new();
    let report = runner.run(&reporter).context("Batch could not start")?;
    print_summary(&report, start.elapsed().as_secs_f64());

    Ok(())
}

fn open_cache(cli: &Cli) -> Result<ModelCache> {
    match &cli.model_dir {
        Some(dir) => ModelCache::with_custom_cache_dir(dir)
            .context("Failed to open model directory"),
        None => ModelCache::new().context("Failed to open model cache"),
    }
}

fn print_summary(report: &BatchReport, seconds: f64) {
    println!();
    println!("📸 Batch finished in {seconds:.1}s");
    println!("  • Found:     {}", report.discovered);
    println!("  • Staged:    {}", report.staged);
    println!("  • Processed: {}", report.processed());
    if report.published() + report.publish_skipped() + report.publish_failed() > 0 {
        println!(
            "  • Published: {} ({} skipped, {} failed)",
            report.published(),
            report.publish_skipped(),
            report.publish_failed()
        );
    }
    if !report.failures.is_empty() {
        println!("  • Failed:    {}", report.failed());
        for failure in &report.failures {
            println!("      {}: {}", failure.path.display(), failure.error);
        }
    }
}

fn show_provider_diagnostics() {
    println!("🔍 Backend and Execution Provider Diagnostics");

    let cpu_count = std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1);
    println!("💻 System: {cpu_count} CPU cores detected (default worker count)");

    println!("\n🔧 Available Backends:");
    println!("  • onnx: ONNX Runtime backend (default) - hardware acceleration support");
    println!("  • tract: Pure Rust backend - no external runtime");

    println!("\n🚀 Execution Providers:");
    for provider_info in ExecutionProviderManager::list_all_providers() {
        let status = if provider_info.available {
            "✅ Available"
        } else {
            "❌ Not Available"
        };
        println!(
            "  • {}: {} - {}",
            provider_info.name, status, provider_info.description
        );
    }

    println!("\n💡 Usage Examples:");
    println!("  --execution-provider onnx:auto    # Auto-select best ONNX provider (default)");
    println!("  --execution-provider onnx:coreml  # Use Apple CoreML (macOS)");
    println!("  --execution-provider tract:cpu    # Use pure Rust Tract backend");
}

fn list_models(cli: &Cli) -> Result<()> {
    let cache = open_cache(cli)?;
    let cached = cache
        .scan_cached_models()
        .context("Failed to list cached models")?;

    println!("📦 Segmentation models in {}", cache.get_current_cache_dir().display());
    for kind in ModelKind::ALL {
        let marker = match (kind == ModelKind::SINGLE_SUBJECT, kind == ModelKind::DETAIL) {
            (true, _) => " (default, auto: single subject)",
            (_, true) => " (auto: several objects)",
            _ => "",
        };
        match cached.iter().find(|m| m.kind == kind) {
            Some(model) => println!("  ✅ {kind}{marker} - {}", format_size(model.size_bytes)),
            None => println!("  ⬇️  {kind}{marker} - not downloaded"),
        }
    }
    Ok(())
}

fn clear_cache_models(cli: &Cli) -> Result<()> {
    let cache = open_cache(cli)?;
    let removed = cache.clear_all_models().context("Failed to clear cache")?;
    if removed.is_empty() {
        println!("💡 Cache was already empty");
    } else {
        println!("✅ Removed {} model(s):", removed.len());
        for name in &removed {
            println!("   • {name}");
        }
    }
    println!("   Cache location: {}", cache.get_current_cache_dir().display());
    Ok(())
}
