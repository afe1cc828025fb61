//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation. Every tunable is optional here so that
//! only flags the user actually passed override `.smellsense.toml`.

use crate::config::Sampling;
use clap::Parser;
use std::path::PathBuf;

/// SmellSense - multi-model LLM code smell detection
///
/// Sends every source file under a releases directory to several
/// language models, asks each for the code smells it sees, and reports
/// per-model statistics, per-release trends and cross-model consensus.
///
/// Examples:
///   smellsense releases
///   smellsense releases --sample-size 5 --sampling balanced
///   smellsense releases --models Qwen/Qwen2.5-7B-Instruct,openai/gpt-oss-120b:groq
///   smellsense releases --dry-run
///   smellsense --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Directory of release subdirectories to analyze
    #[arg(value_name = "DIR", default_value = "releases")]
    pub releases_dir: PathBuf,

    /// Models to query (comma-separated)
    ///
    /// Can also be set via SMELLSENSE_MODELS env var or .smellsense.toml config.
    #[arg(long, value_name = "MODELS", value_delimiter = ',', env = "SMELLSENSE_MODELS")]
    pub models: Option<Vec<String>>,

    /// Analyze only this many files
    #[arg(short = 'n', long, value_name = "COUNT")]
    pub sample_size: Option<usize>,

    /// How to pick the sample (first, balanced)
    #[arg(long, value_name = "STRATEGY")]
    pub sampling: Option<Sampling>,

    /// Skip files larger than this many bytes
    #[arg(long, value_name = "BYTES")]
    pub max_file_size: Option<u64>,

    /// Per-request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Maximum output tokens per model response
    #[arg(long, value_name = "TOKENS")]
    pub max_tokens: Option<u32>,

    /// Sampling temperature (0.0 - 1.0)
    ///
    /// Lower values produce more consistent/deterministic output
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Maximum number of model calls in flight
    #[arg(long, value_name = "NUM")]
    pub concurrency: Option<usize>,

    /// Retries per call on timeouts, network errors, 429 and 5xx
    #[arg(long, value_name = "NUM")]
    pub retries: Option<u32>,

    /// Directory for the result files
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Chat completions endpoint URL
    #[arg(long, value_name = "URL", env = "SMELLSENSE_API_URL")]
    pub api_url: Option<String>,

    /// Line distance under which locations without an identifier still match
    #[arg(long, value_name = "LINES")]
    pub line_tolerance: Option<u32>,

    /// Number of smell types in the ranking
    #[arg(long, value_name = "NUM")]
    pub top_n: Option<usize>,

    /// Stop issuing new model calls after this many seconds
    ///
    /// Calls already in flight are allowed to finish and are reported.
    #[arg(long, value_name = "SECS")]
    pub run_timeout: Option<u64>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .smellsense.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Dry run: scan files without calling any model
    #[arg(long)]
    pub dry_run: bool,

    /// Generate a default .smellsense.toml configuration file
    #[arg(long)]
    pub init_config: bool,
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

        if let Some(temperature) = self.temperature {
            if !(0.0..=1.0).contains(&temperature) {
                return Err("Temperature must be between 0.0 and 1.0".to_string());
            }
        }

        if self.concurrency == Some(0) {
            return Err("Concurrency must be at least 1".to_string());
        }

        if self.sample_size == Some(0) {
            return Err("Sample size must be at least 1".to_string());
        }

        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }

        if self.max_tokens == Some(0) {
            return Err("Max tokens must be at least 1".to_string());
        }

        if self.run_timeout == Some(0) {
            return Err("Run timeout must be at least 1 second".to_string());
        }

        if let Some(ref api_url) = self.api_url {
            if !api_url.starts_with("http://") && !api_url.starts_with("https://") {
                return Err("API URL must start with 'http://' or 'https://'".to_string());
            }
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if !self.releases_dir.exists() {
            return Err(format!(
                "Directory not found: {}",
                self.releases_dir.display()
            ));
        }
        if !self.releases_dir.is_dir() {
            return Err(format!(
                "Not a directory: {}",
                self.releases_dir.display()
            ));
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    ///
    /// `--quiet` wins over everything; `config_verbose` is the
    /// `[general] verbose` key of the config file.
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
        Args {
            releases_dir: std::env::temp_dir(),
            models: None,
            sample_size: None,
            sampling: None,
            max_file_size: None,
            timeout: None,
            max_tokens: None,
            temperature: None,
            concurrency: None,
            retries: None,
            output_dir: None,
            api_url: None,
            line_tolerance: None,
            top_n: None,
            run_timeout: None,
            config: None,
            verbose: false,
            quiet: false,
            dry_run: false,
            init_config: false,
        }
    }

    #[test]
    fn test_valid_defaults() {
        assert!(make_args().validate().is_ok());
    }

    #[test]
    fn test_validation_missing_directory() {
        let mut args = make_args();
        args.releases_dir = PathBuf::from("/definitely/not/a/real/releases/dir");
        assert!(args.validate().is_err());

        args.init_config = true;
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_temperature_range() {
        let mut args = make_args();
        args.temperature = Some(1.5);
        assert!(args.validate().is_err());
        args.temperature = Some(0.0);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_zero_values() {
        let mut args = make_args();
        args.concurrency = Some(0);
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.sample_size = Some(0);
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.timeout = Some(0);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_parse_model_list() {
        let args = Args::try_parse_from([
            "smellsense",
            "rel",
            "--models",
            "a/one,b/two",
            "--sampling",
            "balanced",
        ])
        .unwrap();
        assert_eq!(
            args.models,
            Some(vec!["a/one".to_string(), "b/two".to_string()])
        );
        assert_eq!(args.sampling, Some(Sampling::Balanced));
        assert_eq!(args.releases_dir, PathBuf::from("rel"));
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(false), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(false), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(false), tracing::Level::ERROR);
    }

    #[test]
    fn test_config_verbose_raises_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(true), tracing::Level::DEBUG);

        args.quiet = true;
        assert_eq!(args.log_level(true), tracing::Level::ERROR);
    }
}
