use std::env;
use std::fs::File;
use std::path::PathBuf;

use clap::Parser;
use layercrawl::{CrawlResult, Crawler, CrawlerConfig, HttpConfig, HttpFetcher};
use serde::Deserialize;

const DEFAULT_DEPTH: usize = 2;

/// Breadth-first web crawler
#[derive(Debug, Parser)]
#[command(version)]
pub struct Args {
    /// Address to start crawling from
    pub url: String,
    /// Maximum hop distance, 1 only downloads the start page
    #[arg(default_value_t = DEFAULT_DEPTH)]
    pub depth: usize,
    /// Override crawler's number of download threads
    pub downloaders: Option<usize>,
    /// Override crawler's number of link extraction threads
    pub extractors: Option<usize>,
    /// Override crawler's maximum concurrent downloads per host
    pub per_host: Option<usize>,
    /// Optional crawler yaml configuration file
    #[arg(env = "LAYERCRAWL_CONFIG", long)]
    pub crawler_config: Option<PathBuf>,
    /// Override crawler's user agent
    #[arg(long)]
    pub user_agent: Option<String>,
    /// Directory where downloaded pages are cached
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,
    /// Override request timeout in seconds, 0 disables it
    #[arg(long)]
    pub timeout: Option<u64>,
    /// When quiet no logs are outputted
    #[arg(long, short)]
    pub quiet: bool,
}

/// Content of the yaml configuration file.
#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    #[serde(flatten)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

impl TryFrom<&Args> for Settings {
    type Error = anyhow::Error;

    fn try_from(args: &Args) -> Result<Self, Self::Error> {
        let mut conf = if let Some(file) = args.crawler_config.as_ref().map(File::open) {
            serde_yaml::from_reader(file?)?
        } else {
            Settings::default()
        };
        if let Some(downloaders) = args.downloaders {
            conf.crawler.downloaders = downloaders;
        }
        if let Some(extractors) = args.extractors {
            conf.crawler.extractors = extractors;
        }
        if let Some(per_host) = args.per_host {
            conf.crawler.per_host = per_host;
        }
        if let Some(user_agent) = &args.user_agent {
            conf.http.user_agent = user_agent.to_string();
        }
        if let Some(cache_dir) = &args.cache_dir {
            conf.http.cache_dir = Some(cache_dir.clone());
        }
        if let Some(timeout) = args.timeout {
            conf.http.timeout = (timeout > 0).then_some(timeout);
        }
        Ok(conf)
    }
}

pub fn crawl(args: &Args) -> anyhow::Result<CrawlResult> {
    let settings = Settings::try_from(args)?;
    log::debug!("Using {settings:?}");
    let fetcher = HttpFetcher::new(&settings.http)?;
    let crawler = Crawler::new(fetcher, settings.crawler)?;
    let result = crawler.crawl(&args.url, args.depth)?;
    crawler.shutdown();
    Ok(result)
}

fn report(result: &CrawlResult) {
    let mut downloaded = result.downloaded.iter().collect::<Vec<_>>();
    downloaded.sort_unstable();
    for url in downloaded {
        println!("{url}");
    }

    let mut errors = result.errors.iter().collect::<Vec<_>>();
    errors.sort_unstable_by(|a, b| a.0.cmp(b.0));
    for (url, e) in errors {
        eprintln!("{url}: {e}");
    }

    eprintln!(
        "{} downloaded, {} errors",
        result.downloaded.len(),
        result.errors.len()
    );
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if !args.quiet {
        if env::var_os("RUST_LOG").is_none() {
            env::set_var("RUST_LOG", "layercrawl=info");
        }
        env_logger::init();
    }

    let result = crawl(&args)?;
    report(&result);
    Ok(())
}
