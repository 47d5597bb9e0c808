use std::collections::{HashMap, HashSet};

use dashmap::{DashMap, DashSet};

use crate::error::PageError;

/// Outcome of a crawl.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlResult {
    pub downloaded: HashSet<String>,
    pub errors: HashMap<String, PageError>,
}

/// Per-crawl bookkeeping shared by every worker.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    seen: DashSet<String>,
    downloaded: DashSet<String>,
    errors: DashMap<String, PageError>,
}

impl Registry {
    /// Returns `true` only for the first caller admitting `url`.
    pub fn admit(&self, url: &str) -> bool {
        if self.seen.contains(url) {
            return false;
        }
        self.seen.insert(url.to_string())
    }

    pub fn downloaded(&self, url: &str) {
        self.downloaded.insert(url.to_string());
    }

    pub fn failed(&self, url: &str, error: PageError) {
        log::warn!("Skipping {url}: {error}");
        self.errors.insert(url.to_string(), error);
    }

    pub fn snapshot(&self) -> CrawlResult {
        CrawlResult {
            downloaded: self.downloaded.iter().map(|url| url.key().clone()).collect(),
            errors: self
                .errors
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().clone()))
                .collect(),
        }
    }
}
