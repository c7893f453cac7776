//! TOML configuration.
//!
//! Every section except `[db]` and `[harvest].collections` has defaults, so a
//! minimal config names a database path and at least one collection.
//!
//! ```toml
//! [db]
//! path = "./data/archivist.sqlite"
//!
//! [cache]
//! root = "./data"
//!
//! [harvest]
//! collections = ["laurentianuniversitylambda"]
//!
//! [server]
//! bind = "127.0.0.1:5000"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub harvest: HarvestConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_root")]
    pub root: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: default_cache_root(),
        }
    }
}

fn default_cache_root() -> PathBuf {
    PathBuf::from("./data")
}

#[derive(Debug, Deserialize, Clone)]
pub struct HarvestConfig {
    /// Collections to harvest, processed in this order.
    #[serde(default)]
    pub collections: Vec<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Minimum spacing between uncached metadata requests.
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// File format name identifying the OCR text artifact in an item's manifest.
    #[serde(default = "default_fulltext_format")]
    pub fulltext_format: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            collections: Vec::new(),
            base_url: default_base_url(),
            page_size: default_page_size(),
            request_delay_ms: default_request_delay_ms(),
            concurrency: default_concurrency(),
            fulltext_format: default_fulltext_format(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_base_url() -> String {
    "https://archive.org".to_string()
}
fn default_page_size() -> u32 {
    100
}
fn default_request_delay_ms() -> u64 {
    1000
}
fn default_concurrency() -> usize {
    4
}
fn default_fulltext_format() -> String {
    "DjVuTXT".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_user_agent() -> String {
    format!("archivist/{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_limit")]
    pub default_limit: i64,
    #[serde(default = "default_max_limit")]
    pub max_limit: i64,
    #[serde(default = "default_max_words")]
    pub max_words: usize,
    #[serde(default = "default_min_words")]
    pub min_words: usize,
    #[serde(default = "default_short_word")]
    pub short_word: usize,
    #[serde(default = "default_max_fragments")]
    pub max_fragments: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            max_words: default_max_words(),
            min_words: default_min_words(),
            short_word: default_short_word(),
            max_fragments: default_max_fragments(),
        }
    }
}

fn default_limit() -> i64 {
    10
}
fn default_max_limit() -> i64 {
    100
}
fn default_max_words() -> usize {
    75
}
fn default_min_words() -> usize {
    25
}
fn default_short_word() -> usize {
    3
}
fn default_max_fragments() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:5000".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    let harvest = &config.harvest;
    if harvest.page_size == 0 {
        anyhow::bail!("harvest.page_size must be >= 1");
    }
    if harvest.concurrency == 0 {
        anyhow::bail!("harvest.concurrency must be >= 1");
    }
    if harvest.fulltext_format.trim().is_empty() {
        anyhow::bail!("harvest.fulltext_format must not be empty");
    }
    if let Some(c) = harvest.collections.iter().find(|c| c.trim().is_empty()) {
        anyhow::bail!("harvest.collections contains an empty name: {:?}", c);
    }

    let search = &config.search;
    if search.max_limit < 1 {
        anyhow::bail!("search.max_limit must be >= 1");
    }
    if !(1..=search.max_limit).contains(&search.default_limit) {
        anyhow::bail!(
            "search.default_limit must be in [1, {}] (search.max_limit)",
            search.max_limit
        );
    }
    if search.min_words > search.max_words {
        anyhow::bail!("search.min_words must be <= search.max_words");
    }
    if search.max_fragments == 0 {
        anyhow::bail!("search.max_fragments must be >= 1");
    }

    Ok(())
}
