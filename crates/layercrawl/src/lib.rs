mod barrier;
mod config;
mod crawler;
mod error;
mod fetch;
mod http;
mod pool;
mod registry;
mod throttle;

pub use config::{CrawlerConfig, HttpConfig};
pub use crawler::Crawler;
pub use error::{CrawlError, PageError};
pub use fetch::{Document, Fetcher};
pub use http::{HtmlPage, HttpFetcher};
pub use registry::CrawlResult;

pub use anyhow;
