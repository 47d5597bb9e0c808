use std::io;

use thiserror::Error;

/// Failure attached to a single address, the crawl itself carries on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PageError {
    #[error("invalid address: {0}")]
    Address(String),
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("link extraction failed: {0}")]
    Extract(String),
}

impl PageError {
    pub(crate) fn fetch(e: anyhow::Error) -> Self {
        Self::Fetch(format!("{e:#}"))
    }

    pub(crate) fn extract(e: anyhow::Error) -> Self {
        Self::Extract(format!("{e:#}"))
    }
}

/// Failure of a whole crawler call.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("crawler has been shut down")]
    ShutDown,
    #[error("max depth must be at least 1")]
    InvalidDepth,
    #[error("invalid crawler config: {0}")]
    InvalidConfig(&'static str),
    #[error("couldn't spawn worker thread: {0}")]
    Spawn(#[from] io::Error),
}
