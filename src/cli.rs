//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::models::{Framework, Severity};
use clap::Parser;
use std::path::PathBuf;

/// complyaudit - LLM-assisted compliance auditor for source code
///
/// Checks every source file in a directory against one or more compliance
/// frameworks using a local Ollama model, with rate limiting, retries and a
/// result cache in front of the model. Markdown/JSON reports.
///
/// Examples:
///   complyaudit ./my-service
///   complyaudit ./my-service --framework soc2,gdpr --format json
///   complyaudit . --rpm 20 --max-concurrent 2 --fail-on high
///   complyaudit . --dry-run
///   complyaudit --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Directory to audit
    #[arg(default_value = ".", value_name = "DIR")]
    pub path: PathBuf,

    /// Frameworks to check against (comma-separated)
    ///
    /// Values: soc2, gdpr, iso27001, hipaa, pci
    #[arg(short, long, value_name = "LIST", value_delimiter = ',')]
    pub framework: Option<Vec<Framework>>,

    /// Ollama model to use for analysis
    #[arg(short, long, env = "COMPLYAUDIT_MODEL")]
    pub model: Option<String>,

    /// Output file path for the report
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Ollama API endpoint URL
    #[arg(long, env = "OLLAMA_URL")]
    pub ollama_url: Option<String>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .complyaudit.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Description of the audited system, added to every prompt
    ///
    /// Example: --context "Patient intake service storing PHI"
    #[arg(long, value_name = "TEXT")]
    pub context: Option<String>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Maximum number of files to analyze
    #[arg(long, value_name = "COUNT")]
    pub max_files: Option<usize>,

    /// File extensions to include (comma-separated)
    ///
    /// Example: --extensions rs,py,js
    #[arg(long, value_name = "EXTS", value_delimiter = ',')]
    pub extensions: Option<Vec<String>>,

    /// Names to exclude from analysis (comma-separated)
    ///
    /// Example: --exclude "fixtures,vendor"
    #[arg(long, value_name = "NAMES", value_delimiter = ',')]
    pub exclude: Option<Vec<String>>,

    /// Batch chunk size (requests started together)
    #[arg(long, value_name = "NUM")]
    pub concurrency: Option<usize>,

    /// Maximum model calls per minute
    #[arg(long, value_name = "NUM")]
    pub rpm: Option<usize>,

    /// Maximum model calls in flight
    #[arg(long, value_name = "NUM")]
    pub max_concurrent: Option<usize>,

    /// Retries for rate-limited or transient failures
    #[arg(long, value_name = "NUM")]
    pub max_retries: Option<u32>,

    /// Temperature for LLM responses (0.0 - 1.0)
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Disable the result cache
    #[arg(long)]
    pub no_cache: bool,

    /// Fail if violations at or above this severity are found
    ///
    /// Useful for CI pipelines. Exit code 2 when threshold is exceeded.
    #[arg(long, value_name = "LEVEL")]
    pub fail_on: Option<FailOnLevel>,

    /// Fail if any file scores below this value (0-100)
    #[arg(long, value_name = "SCORE")]
    pub min_score: Option<f64>,

    /// Dry run: scan files without calling the LLM
    #[arg(long)]
    pub dry_run: bool,

    /// Generate a default .complyaudit.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

/// Severity level for --fail-on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, clap::ValueEnum)]
pub enum FailOnLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl From<FailOnLevel> for Severity {
    fn from(level: FailOnLevel) -> Self {
        match level {
            FailOnLevel::Low => Severity::Low,
            FailOnLevel::Medium => Severity::Medium,
            FailOnLevel::High => Severity::High,
            FailOnLevel::Critical => Severity::Critical,
        }
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if !self.path.exists() {
            return Err(format!("Directory does not exist: {}", self.path.display()));
        }
        if !self.path.is_dir() {
            return Err(format!("Path is not a directory: {}", self.path.display()));
        }

        if !self.dry_run {
            if let Some(ref url) = self.ollama_url {
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    return Err("Ollama URL must start with 'http://' or 'https://'".to_string());
                }
            }
        }

        if let Some(temperature) = self.temperature {
            if !(0.0..=1.0).contains(&temperature) {
                return Err("Temperature must be between 0.0 and 1.0".to_string());
            }
        }

        let at_least_one = [
            ("Concurrency", self.concurrency),
            ("Requests per minute", self.rpm),
            ("Max concurrent requests", self.max_concurrent),
            ("Max files", self.max_files),
        ];
        for (name, value) in at_least_one {
            if value == Some(0) {
                return Err(format!("{} must be at least 1", name));
            }
        }

        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }

        if let Some(score) = self.min_score {
            if !(0.0..=100.0).contains(&score) {
                return Err("Minimum score must be between 0 and 100".to_string());
            }
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        Ok(())
    }

    /// Returns the log level. `--quiet` wins over verbosity from either the
    /// command line or the config file.
    pub fn log_level(&self, config_verbose: bool) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose || config_verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> Args {
        Args::parse_from(["complyaudit", "."])
    }

    #[test]
    fn test_defaults() {
        let args = make_args();
        assert_eq!(args.path, PathBuf::from("."));
        assert_eq!(args.format, OutputFormat::Markdown);
        assert!(args.framework.is_none());
        assert!(!args.no_cache);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_framework_list() {
        let args = Args::parse_from(["complyaudit", ".", "--framework", "soc2,gdpr,pci"]);
        assert_eq!(
            args.framework,
            Some(vec![Framework::Soc2, Framework::Gdpr, Framework::Pci])
        );
    }

    #[test]
    fn test_unknown_framework_rejected() {
        assert!(Args::try_parse_from(["complyaudit", ".", "--framework", "nist"]).is_err());
    }

    #[test]
    fn test_validation_missing_directory() {
        let mut args = make_args();
        args.path = PathBuf::from("/definitely/not/here");
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_zero_limits() {
        let mut args = make_args();
        args.rpm = Some(0);
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.max_concurrent = Some(0);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_min_score_range() {
        let mut args = make_args();
        args.min_score = Some(120.0);
        assert!(args.validate().is_err());
        args.min_score = Some(75.0);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(false), tracing::Level::INFO);
        assert_eq!(args.log_level(true), tracing::Level::DEBUG);

        args.verbose = true;
        assert_eq!(args.log_level(false), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(false), tracing::Level::ERROR);
        assert_eq!(args.log_level(true), tracing::Level::ERROR);
    }

    #[test]
    fn test_fail_on_to_severity() {
        assert_eq!(Severity::from(FailOnLevel::High), Severity::High);
        assert_eq!(Severity::from(FailOnLevel::Low), Severity::Low);
    }
}
