use std::cmp;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::CrawlError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlerConfig {
    /// Number of threads fetching pages
    #[serde(default = "default_downloaders")]
    pub downloaders: usize,

    /// Number of threads extracting links from fetched pages
    #[serde(default = "default_extractors")]
    pub extractors: usize,

    /// Maximum number of concurrent fetches against a single host
    #[serde(default = "default_per_host")]
    pub per_host: usize,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            downloaders: default_downloaders(),
            extractors: default_extractors(),
            per_host: default_per_host(),
        }
    }
}

impl CrawlerConfig {
    pub fn validate(&self) -> Result<(), CrawlError> {
        if self.downloaders == 0 {
            return Err(CrawlError::InvalidConfig("downloaders must be at least 1"));
        }
        if self.extractors == 0 {
            return Err(CrawlError::InvalidConfig("extractors must be at least 1"));
        }
        if self.per_host == 0 {
            return Err(CrawlError::InvalidConfig("per_host must be at least 1"));
        }
        Ok(())
    }
}

fn default_downloaders() -> usize {
    16
}

fn default_extractors() -> usize {
    cmp::max(1, num_cpus::get().saturating_sub(2))
}

fn default_per_host() -> usize {
    8
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds, `None` waits forever
    #[serde(default = "default_timeout")]
    pub timeout: Option<u64>,

    /// Directory where fetched bodies are cached
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout: default_timeout(),
            cache_dir: None,
        }
    }
}

fn default_user_agent() -> String {
    String::from("layercrawl")
}

fn default_timeout() -> Option<u64> {
    Some(30)
}
