use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Log level for the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Configuration for the enrichment pipeline.
///
/// Built once and handed to each component at construction; nothing reads
/// settings from global state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the SQLite database file
    pub database_path: PathBuf,

    /// Base URL of the Ollama server
    pub ollama_host: String,

    /// Vision model identifier sent with every request
    pub ollama_model: String,

    /// Request timeout for a single vision call, in seconds
    pub ollama_timeout_secs: u64,

    /// Upper bound on concurrently processed images (0 = number of CPUs)
    pub max_workers: usize,

    /// Batch progress is logged every `batch_size` completed images
    pub batch_size: usize,

    /// Confidence used when the model omits one from otherwise valid JSON
    pub default_confidence: f64,

    /// Confidence assigned when the response could not be parsed at all
    pub fallback_confidence: f64,

    /// How many per-item failures a batch summary keeps
    pub error_detail_limit: usize,

    /// Whether batch operations draw progress bars
    pub show_progress: bool,

    /// Log level
    pub log_level: LogLevel,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data/images.db"),
            ollama_host: "http://localhost:11434".to_string(),
            ollama_model: "llama3.2-vision".to_string(),
            ollama_timeout_secs: 120,
            max_workers: 4,
            batch_size: 10,
            default_confidence: 0.5,
            fallback_confidence: 0.3,
            error_detail_limit: 10,
            show_progress: false,
            log_level: LogLevel::Info,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .map_err(|e| Error::Configuration(format!("Failed to open config file: {}", e)))?;

        let config: Config = serde_json::from_reader(file)
            .map_err(|e| Error::Configuration(format!("Failed to parse config file: {}", e)))?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)
            .map_err(|e| Error::Configuration(format!("Failed to create config file: {}", e)))?;

        serde_json::to_writer_pretty(file, self)
            .map_err(|e| Error::Configuration(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Defaults overridden by `ENRICH_*` environment variables.
    ///
    /// A `.env` file in the working directory is loaded first if present.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a key lookup. Unset keys keep their current value.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("ENRICH_DATABASE_PATH") {
            self.database_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("ENRICH_OLLAMA_HOST") {
            self.ollama_host = v;
        }
        if let Some(v) = lookup("ENRICH_OLLAMA_MODEL") {
            self.ollama_model = v;
        }
        if let Some(v) = lookup("ENRICH_OLLAMA_TIMEOUT") {
            self.ollama_timeout_secs = parse_var("ENRICH_OLLAMA_TIMEOUT", &v)?;
        }
        if let Some(v) = lookup("ENRICH_MAX_WORKERS") {
            self.max_workers = parse_var("ENRICH_MAX_WORKERS", &v)?;
        }
        if let Some(v) = lookup("ENRICH_BATCH_SIZE") {
            self.batch_size = parse_var("ENRICH_BATCH_SIZE", &v)?;
        }
        if let Some(v) = lookup("ENRICH_DEFAULT_CONFIDENCE") {
            self.default_confidence = parse_var("ENRICH_DEFAULT_CONFIDENCE", &v)?;
        }
        if let Some(v) = lookup("ENRICH_FALLBACK_CONFIDENCE") {
            self.fallback_confidence = parse_var("ENRICH_FALLBACK_CONFIDENCE", &v)?;
        }
        Ok(self)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.ollama_host.trim().is_empty() {
            return Err(Error::Configuration(
                "Ollama host must not be empty".to_string(),
            ));
        }

        if self.ollama_model.trim().is_empty() {
            return Err(Error::Configuration(
                "Ollama model must not be empty".to_string(),
            ));
        }

        if self.ollama_timeout_secs == 0 {
            return Err(Error::Configuration(
                "Ollama timeout must be at least one second".to_string(),
            ));
        }

        for (name, value) in [
            ("default_confidence", self.default_confidence),
            ("fallback_confidence", self.fallback_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Configuration(format!(
                    "{} must be between 0.0 and 1.0, got {}",
                    name, value
                )));
            }
        }

        if self.batch_size == 0 {
            return Err(Error::Configuration(
                "Batch size must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    pub fn ollama_timeout(&self) -> Duration {
        Duration::from_secs(self.ollama_timeout_secs)
    }

    /// Effective worker count
    pub fn worker_count(&self) -> usize {
        if self.max_workers == 0 {
            num_cpus::get()
        } else {
            self.max_workers
        }
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Configuration(format!("{} has an invalid value: {:?}", key, value)))
}
