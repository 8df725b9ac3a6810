use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub novelgraph: NovelgraphConfig,
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub graph: GraphConfig,
}

/// Core configuration
#[derive(Debug, Clone, Deserialize)]
pub struct NovelgraphConfig {
    pub db_path: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Extraction service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    pub model: String,
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

/// Graph computation configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GraphConfig {
    #[serde(default = "default_depth")]
    pub default_depth: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            default_depth: default_depth(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_retries() -> usize {
    3
}

fn default_max_tokens() -> u32 {
    2000
}

fn default_temperature() -> f32 {
    0.2
}

fn default_depth() -> usize {
    1
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env (if present) before loading config.
    /// Looks for the config file in this order:
    /// 1. Path specified in NOVELGRAPH_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        // .env is optional; ignore errors
        let _ = dotenv::dotenv();

        let config_path = std::env::var("NOVELGRAPH_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Config = toml::from_str(&config_str).context("Failed to parse config.toml")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        // The API key itself stays out of the config file; only its env var name
        std::env::var(&self.extraction.api_key_env).with_context(|| {
            format!(
                "Environment variable {} not set. Set it in your .env file or as an environment variable.",
                self.extraction.api_key_env
            )
        })?;

        if self.extraction.model.trim().is_empty() {
            anyhow::bail!("extraction.model must not be empty");
        }

        if self.extraction.timeout_secs == 0 {
            anyhow::bail!("extraction.timeout_secs must be greater than 0");
        }

        if !(0.0..=2.0).contains(&self.extraction.temperature) {
            anyhow::bail!("extraction.temperature must be between 0.0 and 2.0");
        }

        if self.graph.default_depth == 0 {
            anyhow::bail!("graph.default_depth must be at least 1");
        }

        Ok(())
    }

    /// Get database path
    pub fn db_path(&self) -> &Path {
        &self.novelgraph.db_path
    }
}
