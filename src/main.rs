//! complyaudit - LLM-assisted compliance auditor for source code
//!
//! Scans a directory, checks every source file against the selected
//! compliance frameworks through a rate-limited, cached analysis engine
//! backed by Ollama, and writes a Markdown or JSON report.
//!
//! Exit codes:
//!   0 - Success (no findings above threshold, or no threshold set)
//!   1 - Runtime error (connection, config, I/O, etc.)
//!   2 - Findings at or above --fail-on, or a score below --min-score

mod cli;
mod config;
mod engine;
mod error;
mod models;
mod prompt;
mod provider;
mod report;
mod scanner;

use anyhow::{Context, Result};
use chrono::Utc;
use cli::{Args, OutputFormat};
use config::{Config, CONFIG_FILE_NAME};
use engine::{AnalysisOrchestrator, CacheConfig, GateConfig, RequestGate, ResultCache};
use indicatif::{ProgressBar, ProgressStyle};
use models::{AnalysisRequest, Severity};
use provider::{OllamaConfig, OllamaProvider};
use report::ComplianceReport;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Config is needed first: `[general] verbose` feeds the log level.
    let (config, config_source) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    };

    init_logging(&args, config.general.verbose);

    info!("complyaudit v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    match config_source {
        Some(path) => info!("Loaded config from {}", path.display()),
        None => debug!("No config file found, using defaults"),
    }

    match run_audit(args, config).await {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(e) => {
            error!("Audit failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .complyaudit.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    std::fs::write(path, Config::default_toml())
        .with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE_NAME);
    println!("   Edit it to customize frameworks, limits, cache and scanner settings.");
    Ok(())
}

/// Initialize logging. `RUST_LOG` wins over the verbosity settings when set.
fn init_logging(args: &Args, config_verbose: bool) {
    let builder = FmtSubscriber::builder()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact();

    let result = match EnvFilter::try_from_default_env() {
        Ok(filter) => tracing::subscriber::set_global_default(builder.with_env_filter(filter).finish()),
        Err(_) => tracing::subscriber::set_global_default(
            builder.with_max_level(args.log_level(config_verbose)).finish(),
        ),
    };

    if let Err(e) = result {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Run the complete audit workflow. Returns exit code (0 or 2).
async fn run_audit(args: Args, config: Config) -> Result<i32> {
    let start_time = Instant::now();

    config.validate().context("Invalid configuration")?;

    let scan_config = scanner::ScanConfig::from(&config.scanner);

    if args.dry_run {
        return handle_dry_run(&args.path, &scan_config, &config);
    }

    // Step 1: Discover source files
    if !args.quiet {
        println!("🔍 Scanning {}...", args.path.display());
    }
    let file_scanner = scanner::FileScanner::new(args.path.clone(), scan_config);
    let sources = file_scanner.collect_sources()?;

    if sources.is_empty() {
        println!("   No matching source files found.");
        return Ok(0);
    }

    let requests: Vec<AnalysisRequest> = sources
        .iter()
        .flat_map(|source| {
            source.requests(&config.general.frameworks, config.general.context.as_deref())
        })
        .collect();
    info!(
        "Prepared {} requests for {} files",
        requests.len(),
        sources.len()
    );

    // Step 2: Build the analysis engine
    let orchestrator = build_orchestrator(&config)?;

    if !args.quiet {
        println!("🤖 Analyzing with {}...", config.model.name);
        println!("   Ollama: {}", config.model.ollama_url);
        println!(
            "   Limits: {} req/min, {} concurrent, {} retries",
            config.limits.max_requests_per_minute,
            config.limits.max_concurrent_requests,
            config.limits.max_retries
        );
    }

    // Step 3: Run the batch
    let progress = progress_bar(requests.len(), args.quiet);
    let outcome = orchestrator
        .analyze_batch_with_progress(&requests, config.general.concurrency, |settled, _| {
            if let Some(ref pb) = progress {
                pb.set_position(settled as u64);
            }
        })
        .await?;
    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    let gate_status = orchestrator.gate().get_status();
    debug!(
        "Gate: {} active, {} queued, {} requests in the last minute",
        gate_status.active_requests, gate_status.queued_requests, gate_status.requests_in_last_minute
    );

    if let Some(cache) = orchestrator.cache() {
        let stats = cache.get_stats();
        debug!(
            "Cache: {}/{} entries, {} hits, {} misses, hit rate {:.2}",
            stats.size, stats.max_size, stats.hits, stats.misses, stats.hit_rate
        );
    }

    // Step 4: Build and write the report
    let metadata = report::ReportMetadata {
        root: args.path.display().to_string(),
        generated_at: Utc::now(),
        model_used: config.model.name.clone(),
        frameworks: config.general.frameworks.clone(),
        files_scanned: sources.len(),
        duration_seconds: start_time.elapsed().as_secs_f64(),
    };
    let report = ComplianceReport::build(metadata, &requests, outcome);

    let output = match args.format {
        OutputFormat::Json => report::generate_json_report(&report)?,
        OutputFormat::Markdown => report::generate_markdown_report(&report, &config.report),
    };

    let output_path = output_path(&args, &config);
    std::fs::write(&output_path, &output)
        .with_context(|| format!("Failed to write report to {}", output_path.display()))?;

    print_summary(&report, &output_path);

    Ok(threshold_exit_code(&report, &args))
}

/// Wire gate, cache and provider together.
fn build_orchestrator(config: &Config) -> Result<AnalysisOrchestrator> {
    let provider = OllamaProvider::new(OllamaConfig {
        ollama_url: config.model.ollama_url.clone(),
        model_name: config.model.name.clone(),
        temperature: config.model.temperature,
        timeout_seconds: config.model.timeout_seconds,
    })
    .context("Failed to create Ollama client")?;

    let gate = Arc::new(RequestGate::new(GateConfig::from(&config.limits)));
    let mut orchestrator = AnalysisOrchestrator::new(gate, Arc::new(provider));

    if config.cache.enabled {
        let cache = Arc::new(ResultCache::new(CacheConfig::from(&config.cache)));
        // The janitor exits on its own once the cache is dropped.
        let _janitor =
            cache.spawn_janitor(Duration::from_secs(config.cache.cleanup_interval_seconds));
        orchestrator = orchestrator
            .with_cache(cache)
            .with_fallback_caching(config.cache.cache_fallbacks);
    } else {
        info!("Result cache disabled");
    }

    Ok(orchestrator)
}

fn progress_bar(len: usize, quiet: bool) -> Option<ProgressBar> {
    if quiet {
        return None;
    }

    let pb = ProgressBar::new(len as u64);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);
    pb.enable_steady_tick(Duration::from_millis(120));
    Some(pb)
}

/// `--output`, else the configured path; JSON swaps in a `.json` extension.
fn output_path(args: &Args, config: &Config) -> PathBuf {
    if let Some(ref output) = args.output {
        return output.clone();
    }

    let path = PathBuf::from(&config.general.output);
    match args.format {
        OutputFormat::Json => path.with_extension("json"),
        OutputFormat::Markdown => path,
    }
}

fn print_summary(report: &ComplianceReport, output_path: &Path) {
    let summary = &report.summary;
    let totals = report.severity_totals();

    println!("\n📊 Analysis Summary:");
    println!(
        "   Analyses: {} ({} compliant, {} failed)",
        summary.total, summary.compliant, summary.failed
    );
    for framework in &report.frameworks {
        println!(
            "   {}: average score {:.1}",
            framework.framework.display_name(),
            framework.average_score
        );
    }
    println!(
        "   - 🔴 Critical: {} | 🟠 High: {} | 🟡 Medium: {} | 🟢 Low: {}",
        totals.critical, totals.high, totals.medium, totals.low
    );
    println!("   Cache hit rate: {:.0}%", summary.cache_hit_rate * 100.0);
    println!("   Duration: {:.1}s", report.metadata.duration_seconds);
    println!("\n✅ Audit complete! Report saved to: {}", output_path.display());

    if summary.failed > 0 {
        warn!("{} analyses failed; see the report for details", summary.failed);
    }
}

/// Exit code 2 when --fail-on or --min-score is exceeded.
fn threshold_exit_code(report: &ComplianceReport, args: &Args) -> i32 {
    if let Some(level) = args.fail_on {
        if report.has_violation_at_or_above(Severity::from(level)) {
            eprintln!(
                "\n⛔ Violations found at or above {:?} severity. Failing (exit code 2).",
                level
            );
            return 2;
        }
    }

    if let (Some(min_score), Some(lowest)) = (args.min_score, report.lowest_score()) {
        if lowest < min_score {
            eprintln!(
                "\n⛔ Lowest score {:.0} is below --min-score {:.0}. Failing (exit code 2).",
                lowest, min_score
            );
            return 2;
        }
    }

    0
}

/// Handle --dry-run: scan files, print what would be analyzed, exit.
fn handle_dry_run(root: &Path, scan_config: &scanner::ScanConfig, config: &Config) -> Result<i32> {
    println!("\n🔍 Dry run: scanning files (no LLM call)...\n");

    let file_scanner = scanner::FileScanner::new(root.to_path_buf(), scan_config.clone());
    let files = file_scanner.scan()?;

    if files.is_empty() {
        println!("   No matching source files found.");
    } else {
        println!("   Found {} files that would be analyzed:\n", files.len());
        for file in &files {
            println!("     📄 {} ({} bytes)", file.path, file.size);
        }
        println!(
            "\n   Total: {} files x {} frameworks = {} requests",
            files.len(),
            config.general.frameworks.len(),
            files.len() * config.general.frameworks.len()
        );
    }

    println!("\n✅ Dry run complete. No LLM calls were made.");
    Ok(0)
}

/// Load configuration from file or use defaults, then apply CLI overrides.
/// Also returns the file the settings came from.
fn load_config(args: &Args) -> Result<(Config, Option<PathBuf>)> {
    let (mut config, source) = if let Some(ref config_path) = args.config {
        (Config::load(config_path)?, Some(config_path.clone()))
    } else if let Some(config) = Config::load_default()? {
        (config, Some(PathBuf::from(CONFIG_FILE_NAME)))
    } else if let Some(config) = Config::load_from_dir(&args.path)? {
        (config, Some(args.path.join(CONFIG_FILE_NAME)))
    } else {
        (Config::default(), None)
    };

    config.merge_with_args(args);
    Ok((config, source))
}
