//! Configuration file handling.
//!
//! This module handles loading, merging and validating configuration from
//! `.complyaudit.toml` files.

use crate::engine::{CacheConfig, GateConfig};
use crate::error::AnalysisError;
use crate::models::Framework;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = ".complyaudit.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Model settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Admission and retry limits for model calls.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Result cache settings.
    #[serde(default)]
    pub cache: CacheSettings,

    /// Scanner settings.
    #[serde(default)]
    pub scanner: ScannerConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default output file path.
    #[serde(default = "default_output")]
    pub output: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Batch chunk size: requests started together before waiting.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Frameworks every file is checked against.
    #[serde(default = "default_frameworks")]
    pub frameworks: Vec<Framework>,

    /// Description of the audited system, added to every prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            verbose: false,
            concurrency: default_concurrency(),
            frameworks: default_frameworks(),
            context: None,
        }
    }
}

fn default_output() -> String {
    "compliance_report.md".to_string()
}

fn default_concurrency() -> usize {
    5
}

fn default_frameworks() -> Vec<Framework> {
    vec![Framework::Soc2]
}

/// LLM model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model name.
    #[serde(default = "default_model")]
    pub name: String,

    /// Ollama API URL.
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// Temperature for generation.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model(),
            ollama_url: default_ollama_url(),
            temperature: default_temperature(),
            timeout_seconds: default_timeout(),
        }
    }
}

fn default_model() -> String {
    "llama3.2:latest".to_string()
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_temperature() -> f32 {
    0.1
}

fn default_timeout() -> u64 {
    300
}

/// Admission control and retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Completions allowed in any trailing 60 seconds.
    #[serde(default = "default_rpm")]
    pub max_requests_per_minute: usize,

    /// Model calls running at the same time.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,

    /// Growth factor between retry delays.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Retries after the first attempt.
    #[serde(default = "default_retries")]
    pub max_retries: u32,

    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_requests_per_minute: default_rpm(),
            max_concurrent_requests: default_max_concurrent(),
            backoff_multiplier: default_backoff_multiplier(),
            max_retries: default_retries(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

fn default_rpm() -> usize {
    50
}

fn default_max_concurrent() -> usize {
    5
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

impl From<&LimitsConfig> for GateConfig {
    fn from(limits: &LimitsConfig) -> Self {
        Self {
            max_requests_per_minute: limits.max_requests_per_minute,
            max_concurrent_requests: limits.max_concurrent_requests,
            backoff_multiplier: limits.backoff_multiplier,
            max_retries: limits.max_retries,
            base_delay: Duration::from_millis(limits.base_delay_ms),
        }
    }
}

/// Result cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Reuse earlier verdicts for identical code.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum number of cached verdicts.
    #[serde(default = "default_cache_size")]
    pub max_size: usize,

    /// Seconds a verdict stays valid.
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,

    /// Seconds between background sweeps of expired entries.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_seconds: u64,

    /// Also cache the placeholder verdict given for unusable model output.
    #[serde(default = "default_true")]
    pub cache_fallbacks: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size: default_cache_size(),
            ttl_seconds: default_ttl(),
            cleanup_interval_seconds: default_cleanup_interval(),
            cache_fallbacks: true,
        }
    }
}

fn default_cache_size() -> usize {
    1000
}

fn default_ttl() -> u64 {
    3600
}

fn default_cleanup_interval() -> u64 {
    300
}

impl From<&CacheSettings> for CacheConfig {
    fn from(settings: &CacheSettings) -> Self {
        Self {
            max_size: settings.max_size,
            ttl: Duration::from_secs(settings.ttl_seconds),
        }
    }
}

/// File scanner settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Maximum files to analyze.
    #[serde(default = "default_max_files")]
    pub max_files: usize,

    /// File extensions to include.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Patterns to exclude.
    #[serde(default = "default_excludes")]
    pub excludes: Vec<String>,

    /// Maximum file size in bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            max_files: default_max_files(),
            extensions: default_extensions(),
            excludes: default_excludes(),
            max_file_size: default_max_file_size(),
        }
    }
}

fn default_max_files() -> usize {
    100
}

pub(crate) fn default_extensions() -> Vec<String> {
    vec![
        "rs", "py", "js", "ts", "jsx", "tsx", "go", "java", "c", "cpp", "h", "hpp", "cs", "rb",
        "php", "swift", "kt", "scala", "sql", "tf", "yaml", "yml",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

pub(crate) fn default_excludes() -> Vec<String> {
    vec![
        ".git",
        "target",
        "node_modules",
        "vendor",
        "dist",
        "build",
        "__pycache__",
        ".venv",
        "venv",
        ".idea",
        ".vscode",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_max_file_size() -> usize {
    256 * 1024 // 256KB
}

/// Report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Include code snippets in the report.
    #[serde(default = "default_true")]
    pub include_snippets: bool,

    /// Maximum code snippet lines.
    #[serde(default = "default_snippet_lines")]
    pub max_snippet_lines: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            include_snippets: true,
            max_snippet_lines: default_snippet_lines(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_snippet_lines() -> usize {
    10
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        Self::load_from_dir(Path::new("."))
    }

    /// Try to load `.complyaudit.toml` from a directory.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let config_path = dir.join(CONFIG_FILE_NAME);

        if config_path.exists() {
            Ok(Some(Self::load(&config_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were given explicitly.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref model) = args.model {
            self.model.name = model.clone();
        }
        if let Some(ref url) = args.ollama_url {
            self.model.ollama_url = url.clone();
        }
        if let Some(temperature) = args.temperature {
            self.model.temperature = temperature;
        }
        if let Some(timeout) = args.timeout {
            self.model.timeout_seconds = timeout;
        }

        if let Some(ref frameworks) = args.framework {
            self.general.frameworks = frameworks.clone();
        }
        if let Some(concurrency) = args.concurrency {
            self.general.concurrency = concurrency;
        }
        if let Some(ref context) = args.context {
            self.general.context = Some(context.clone());
        }
        if args.verbose {
            self.general.verbose = true;
        }

        if let Some(rpm) = args.rpm {
            self.limits.max_requests_per_minute = rpm;
        }
        if let Some(max_concurrent) = args.max_concurrent {
            self.limits.max_concurrent_requests = max_concurrent;
        }
        if let Some(retries) = args.max_retries {
            self.limits.max_retries = retries;
        }

        if args.no_cache {
            self.cache.enabled = false;
        }

        if let Some(max_files) = args.max_files {
            self.scanner.max_files = max_files;
        }
        if let Some(ref extensions) = args.extensions {
            self.scanner.extensions = extensions.clone();
        }
        if let Some(ref excludes) = args.exclude {
            self.scanner.excludes = excludes.clone();
        }
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        let fail = |msg: &str| Err(AnalysisError::InvalidConfig(msg.to_string()));

        if self.general.frameworks.is_empty() {
            return fail("at least one framework is required");
        }
        if self.general.concurrency == 0 {
            return fail("general.concurrency must be at least 1");
        }
        if self.limits.max_requests_per_minute == 0 {
            return fail("limits.max_requests_per_minute must be at least 1");
        }
        if self.limits.max_concurrent_requests == 0 {
            return fail("limits.max_concurrent_requests must be at least 1");
        }
        if !(self.limits.backoff_multiplier.is_finite() && self.limits.backoff_multiplier >= 1.0) {
            return fail("limits.backoff_multiplier must be a finite number >= 1.0");
        }
        if self.cache.enabled && self.cache.max_size == 0 {
            return fail("cache.max_size must be at least 1");
        }
        if self.cache.enabled && self.cache.ttl_seconds == 0 {
            return fail("cache.ttl_seconds must be at least 1");
        }
        if self.cache.enabled && self.cache.cleanup_interval_seconds == 0 {
            return fail("cache.cleanup_interval_seconds must be at least 1");
        }

        Ok(())
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
