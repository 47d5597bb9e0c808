use std::io::prelude::*;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use flate2::read::GzDecoder;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use select::predicate::Name;
use url::Url;

use crate::config::HttpConfig;
use crate::fetch::{Document, Fetcher};

/// Downloads pages over HTTP, optionally caching bodies on disk.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    cache_dir: Option<PathBuf>,
}

impl HttpFetcher {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .gzip(true)
            .deflate(true)
            .timeout(config.timeout.map(Duration::from_secs))
            .build()?;

        if let Some(dir) = &config.cache_dir {
            fs_err::create_dir_all(dir)?;
        }

        Ok(Self {
            client,
            cache_dir: config.cache_dir.clone(),
        })
    }

    fn cache_path(&self, url: &str) -> Option<PathBuf> {
        self.cache_dir
            .as_ref()
            .map(|dir| dir.join(urlencoding::encode(url).as_ref()))
    }

    fn download(&self, url: &str) -> Result<String> {
        let resp = self.client.get(url).send()?.error_for_status()?;

        let page = match resp.headers().get(CONTENT_TYPE) {
            Some(c) if c == "application/x-gzip" || c == "application/gzip" => {
                let compressed = resp.bytes()?;
                let mut gz = GzDecoder::new(&compressed[..]);
                let mut page = String::new();
                gz.read_to_string(&mut page)?;
                page
            }
            _ => resp.text()?,
        };

        Ok(page)
    }
}

impl Fetcher for HttpFetcher {
    type Document = HtmlPage;

    fn fetch(&self, url: &str) -> Result<HtmlPage> {
        let cached = self.cache_path(url);
        if let Some(path) = cached.as_ref().filter(|p| p.is_file()) {
            log::debug!("Cache hit for {url}");
            let body = fs_err::read_to_string(path)?;
            return Ok(HtmlPage::new(url, body));
        }

        log::debug!("Downloading {url}");
        let body = self
            .download(url)
            .with_context(|| format!("Couldn't download {url}"))?;

        if let Some(path) = cached {
            if let Err(e) = fs_err::write(&path, &body) {
                log::warn!("Couldn't cache {url}: {e}");
            }
        }

        Ok(HtmlPage::new(url, body))
    }
}

/// A downloaded HTML page.
#[derive(Debug, Clone)]
pub struct HtmlPage {
    pub url: String,
    pub body: String,
}

impl HtmlPage {
    pub fn new(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            body: body.into(),
        }
    }
}

impl Document for HtmlPage {
    fn extract_links(self) -> Result<Vec<String>> {
        let base =
            Url::parse(&self.url).map_err(|e| anyhow!("Couldn't parse {} got: {e}", self.url))?;
        let document = select::document::Document::from(self.body.as_str());

        let mut links: Vec<String> = Vec::new();
        for href in document.find(Name("a")).filter_map(|node| node.attr("href")) {
            let Ok(mut link) = base.join(href.trim()) else {
                continue;
            };
            if link.scheme() != "http" && link.scheme() != "https" {
                continue;
            }
            link.set_fragment(None);
            let link = String::from(link);
            if !links.contains(&link) {
                links.push(link);
            }
        }

        Ok(links)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn links(url: &str, body: &str) -> Vec<String> {
        HtmlPage::new(url, body).extract_links().unwrap()
    }

    #[test]
    fn resolve_relative_links() {
        let body = r#"<html><body>
            <a href="/docs">docs</a>
            <a href="page.html">page</a>
            <a href="https://other.test/x">other</a>
        </body></html>"#;

        assert_eq!(
            vec![
                "https://example.test/docs".to_string(),
                "https://example.test/dir/page.html".to_string(),
                "https://other.test/x".to_string(),
            ],
            links("https://example.test/dir/index.html", body)
        );
    }

    #[test]
    fn skip_non_http_links() {
        let body = r#"<a href="mailto:me@example.test">mail</a>
            <a href="javascript:void(0)">js</a>
            <a href="ftp://example.test/file">ftp</a>
            <a name="anchor">no href</a>"#;

        assert!(links("https://example.test/", body).is_empty());
    }

    #[test]
    fn strip_fragments_and_dedup() {
        let body = r##"<a href="/a#top">a</a><a href="/a">a</a><a href="#self">self</a>"##;

        assert_eq!(
            vec![
                "https://example.test/a".to_string(),
                "https://example.test/".to_string(),
            ],
            links("https://example.test/", body)
        );
    }

    #[test]
    fn invalid_page_url() {
        assert!(HtmlPage::new("not a url", "").extract_links().is_err());
    }

    #[test]
    fn serve_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let config = HttpConfig {
            cache_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let fetcher = HttpFetcher::new(&config).unwrap();

        // Nothing listens on this address, only the cache can answer
        let url = "http://127.0.0.1:9/index.html";
        let path = fetcher.cache_path(url).unwrap();
        fs_err::write(&path, r#"<a href="/next">next</a>"#).unwrap();

        let page = fetcher.fetch(url).unwrap();
        assert_eq!(url, page.url);
        assert_eq!(
            vec!["http://127.0.0.1:9/next".to_string()],
            page.extract_links().unwrap()
        );
    }

    #[test]
    fn unreachable_host() {
        let config = HttpConfig {
            timeout: Some(2),
            ..Default::default()
        };
        let fetcher = HttpFetcher::new(&config).unwrap();

        let err = fetcher.fetch("http://127.0.0.1:9/").unwrap_err();
        assert!(format!("{err:#}").contains("Couldn't download http://127.0.0.1:9/"));
    }
}
