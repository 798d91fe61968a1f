//! Configuration parsing and validation.
//!
//! `docs-harness` is configured via a TOML file (default: `config/dh.toml`).
//! The config defines the store path, scrape defaults, retrieval tuning, and
//! embedding provider settings.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub scrape: ScrapeDefaults,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub path: PathBuf,
}

/// Defaults applied to a scrape request when the caller omits a field; see
/// spec.md §6 "Scrape options" for the authoritative default values.
#[derive(Debug, Deserialize, Clone)]
pub struct ScrapeDefaults {
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_true")]
    pub follow_redirects: bool,
    #[serde(default = "default_true")]
    pub ignore_errors: bool,
    #[serde(default = "default_max_job_concurrency")]
    pub max_job_concurrency: usize,
}

impl Default for ScrapeDefaults {
    fn default() -> Self {
        Self {
            max_pages: default_max_pages(),
            max_depth: default_max_depth(),
            max_concurrency: default_max_concurrency(),
            follow_redirects: true,
            ignore_errors: true,
            max_job_concurrency: default_max_job_concurrency(),
        }
    }
}

fn default_max_pages() -> u32 {
    1000
}
fn default_max_depth() -> u32 {
    3
}
fn default_max_concurrency() -> usize {
    3
}
fn default_max_job_concurrency() -> usize {
    3
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_rrf_constant")]
    pub rrf_constant: f64,
    #[serde(default = "default_candidate_multiplier")]
    pub candidate_multiplier: i64,
    #[serde(default = "default_final_limit")]
    pub final_limit: i64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            rrf_constant: default_rrf_constant(),
            candidate_multiplier: default_candidate_multiplier(),
            final_limit: default_final_limit(),
        }
    }
}

fn default_rrf_constant() -> f64 {
    60.0
}
fn default_candidate_multiplier() -> i64 {
    5
}
fn default_final_limit() -> i64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.scrape.max_concurrency == 0 {
        anyhow::bail!("scrape.max_concurrency must be > 0");
    }
    if config.scrape.max_job_concurrency == 0 {
        anyhow::bail!("scrape.max_job_concurrency must be > 0");
    }
    if config.retrieval.final_limit < 1 {
        anyhow::bail!("retrieval.final_limit must be >= 1");
    }
    if config.retrieval.rrf_constant <= 0.0 {
        anyhow::bail!("retrieval.rrf_constant must be > 0");
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "vertex" | "gemini" | "aws-bedrock" | "sagemaker"
        | "azure" => {}
        other => anyhow::bail!("Unknown embedding provider: '{other}'"),
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn loads_minimal_config_with_defaults() {
        let f = write_config("[store]\npath = \"dh.db\"\n");
        let cfg = load_config(f.path()).unwrap();
        assert_eq!(cfg.scrape.max_pages, 1000);
        assert_eq!(cfg.scrape.max_depth, 3);
        assert_eq!(cfg.scrape.max_concurrency, 3);
        assert!(cfg.scrape.follow_redirects);
        assert!(!cfg.embedding.is_enabled());
    }

    #[test]
    fn rejects_enabled_embedding_without_dims() {
        let f = write_config(
            "[store]\npath = \"dh.db\"\n[embedding]\nprovider = \"openai\"\nmodel = \"text-embedding-3-small\"\n",
        );
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn rejects_unknown_provider() {
        let f = write_config("[store]\npath = \"dh.db\"\n[embedding]\nprovider = \"bogus\"\n");
        assert!(load_config(f.path()).is_err());
    }
}
