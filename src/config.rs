//! Configuration file handling.
//!
//! This module handles loading `.smellsense.toml`, merging it with CLI
//! arguments, and freezing the result into an immutable [`RunSettings`]
//! record that is threaded through every component of a run.

use crate::analysis::ConsensusSettings;
use crate::error::ConfigError;
use crate::llm::{ClientSettings, InvokeOptions, RetryPolicy};
use crate::scanner::ScanConfig;
use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file name, looked up in the current directory.
pub const CONFIG_FILE_NAME: &str = ".smellsense.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Model settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Scanner settings.
    #[serde(default)]
    pub scanner: ScannerConfig,

    /// Consensus settings.
    #[serde(default)]
    pub consensus: ConsensusConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Directory the three report files are written to.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Maximum number of model calls in flight.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            verbose: false,
            concurrency: default_concurrency(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("results")
}

fn default_concurrency() -> usize {
    4
}

/// LLM model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Models every file is sent to.
    #[serde(default = "default_models")]
    pub models: Vec<String>,

    /// Chat completions endpoint.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Environment variable holding the bearer token.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Temperature for generation.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens in response.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Ask the API to constrain output to a JSON object.
    #[serde(default = "default_true")]
    pub json_mode: bool,

    /// Number of retries on transient failure (0 = single attempt).
    #[serde(default)]
    pub retries: u32,

    /// Base backoff between retries, doubled per attempt.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            models: default_models(),
            api_url: default_api_url(),
            api_key_env: default_api_key_env(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_seconds: default_timeout(),
            json_mode: true,
            retries: 0,
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

fn default_models() -> Vec<String> {
    vec![
        "Qwen/Qwen2.5-7B-Instruct",
        "google/gemma-2-2b-it:nebius",
        "openai/gpt-oss-120b:groq",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_api_url() -> String {
    "https://router.huggingface.co/v1/chat/completions".to_string()
}

fn default_api_key_env() -> String {
    "HF_TOKEN".to_string()
}

fn default_temperature() -> f32 {
    0.1
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_timeout() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

/// How to pick files when a sample size is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Sampling {
    /// The first N files in walk order
    #[default]
    First,
    /// N files spread evenly across releases
    Balanced,
}

/// File scanner settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// File extensions to include.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Directory names to skip.
    #[serde(default = "default_excludes")]
    pub excludes: Vec<String>,

    /// File name fragments to skip.
    #[serde(default = "default_skip_patterns")]
    pub skip_patterns: Vec<String>,

    /// Maximum file size in bytes. Larger files are skipped.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Analyze only this many files (all when unset).
    #[serde(default)]
    pub sample_size: Option<usize>,

    #[serde(default)]
    pub sampling: Sampling,

    /// Regex a path segment must match to count as a release tag.
    #[serde(default = "default_release_pattern")]
    pub release_pattern: String,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            excludes: default_excludes(),
            skip_patterns: default_skip_patterns(),
            max_file_size: default_max_file_size(),
            sample_size: None,
            sampling: Sampling::default(),
            release_pattern: default_release_pattern(),
        }
    }
}

fn default_extensions() -> Vec<String> {
    vec!["py".to_string()]
}

fn default_excludes() -> Vec<String> {
    vec![
        ".git",
        "__pycache__",
        ".venv",
        "venv",
        "node_modules",
        "build",
        "dist",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_skip_patterns() -> Vec<String> {
    vec!["test_".to_string(), "_test.".to_string()]
}

fn default_max_file_size() -> u64 {
    50_000
}

fn default_release_pattern() -> String {
    r"v?\d+(\.\d+)+".to_string()
}

/// Consensus matching settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusConfig {
    /// Line distance under which identifier-less locations still match.
    #[serde(default)]
    pub line_tolerance: u32,

    /// Length of the smell type ranking.
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            line_tolerance: 0,
            top_n: default_top_n(),
        }
    }
}

fn default_top_n() -> usize {
    10
}

/// Immutable settings for a single run.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub models: Vec<String>,
    pub client: ClientSettings,
    pub invoke: InvokeOptions,
    pub retry: RetryPolicy,
    pub concurrency: usize,
    pub scan: ScanConfig,
    pub sample_size: Option<usize>,
    pub sampling: Sampling,
    pub consensus: ConsensusSettings,
    pub output_dir: PathBuf,
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
        let default_path = Path::new(CONFIG_FILE_NAME);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// Only flags the user actually passed override file settings.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref models) = args.models {
            self.model.models = models.clone();
        }
        if let Some(ref api_url) = args.api_url {
            self.model.api_url = api_url.clone();
        }
        if let Some(temperature) = args.temperature {
            self.model.temperature = temperature;
        }
        if let Some(max_tokens) = args.max_tokens {
            self.model.max_tokens = max_tokens;
        }
        if let Some(timeout) = args.timeout {
            self.model.timeout_seconds = timeout;
        }
        if let Some(retries) = args.retries {
            self.model.retries = retries;
        }

        if let Some(max_file_size) = args.max_file_size {
            self.scanner.max_file_size = max_file_size;
        }
        if args.sample_size.is_some() {
            self.scanner.sample_size = args.sample_size;
        }
        if let Some(sampling) = args.sampling {
            self.scanner.sampling = sampling;
        }

        if let Some(line_tolerance) = args.line_tolerance {
            self.consensus.line_tolerance = line_tolerance;
        }
        if let Some(top_n) = args.top_n {
            self.consensus.top_n = top_n;
        }

        if let Some(concurrency) = args.concurrency {
            self.general.concurrency = concurrency;
        }
        if let Some(ref output_dir) = args.output_dir {
            self.general.output_dir = output_dir.clone();
        }

        // Flags always override
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Validate and freeze into the settings for one run.
    pub fn into_settings(self) -> Result<RunSettings, ConfigError> {
        let models: Vec<String> = self
            .model
            .models
            .into_iter()
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .collect();
        if models.is_empty() {
            return Err(ConfigError::NoModels);
        }
        if self.general.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.model.timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "timeout must be at least 1 second".to_string(),
            ));
        }
        if self.model.max_tokens == 0 {
            return Err(ConfigError::Invalid(
                "max_tokens must be at least 1".to_string(),
            ));
        }

        let release_pattern = Regex::new(&self.scanner.release_pattern).map_err(|source| {
            ConfigError::InvalidReleasePattern {
                pattern: self.scanner.release_pattern.clone(),
                source,
            }
        })?;

        Ok(RunSettings {
            models,
            client: ClientSettings {
                api_url: self.model.api_url,
                api_key_env: self.model.api_key_env,
                temperature: self.model.temperature,
                json_mode: self.model.json_mode,
            },
            invoke: InvokeOptions {
                timeout: Duration::from_secs(self.model.timeout_seconds),
                max_tokens: self.model.max_tokens,
            },
            retry: RetryPolicy {
                max_retries: self.model.retries,
                backoff: Duration::from_millis(self.model.retry_backoff_ms),
            },
            concurrency: self.general.concurrency,
            scan: ScanConfig {
                extensions: self.scanner.extensions,
                excludes: self.scanner.excludes,
                skip_patterns: self.scanner.skip_patterns,
                max_file_size: self.scanner.max_file_size,
                release_pattern,
            },
            sample_size: self.scanner.sample_size,
            sampling: self.scanner.sampling,
            consensus: ConsensusSettings {
                line_tolerance: self.consensus.line_tolerance,
                top_n: self.consensus.top_n,
            },
            output_dir: self.general.output_dir,
        })
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
