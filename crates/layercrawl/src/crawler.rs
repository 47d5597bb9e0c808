use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::anyhow;
use dashmap::DashMap;
use parking_lot::Mutex;
use url::Url;

use crate::barrier::{LayerBarrier, Ticket};
use crate::config::CrawlerConfig;
use crate::error::{CrawlError, PageError};
use crate::fetch::{Document, Fetcher};
use crate::pool::{panic_message, WorkerPool};
use crate::registry::{CrawlResult, Registry};
use crate::throttle::HostThrottle;

/// Breadth-first crawler running fetches and link extraction on two
/// separate thread pools.
///
/// Pools and per-host throttles live as long as the crawler, every call to
/// [`crawl`](Crawler::crawl) starts from a fresh state.
pub struct Crawler<F: Fetcher> {
    fetcher: Arc<F>,
    config: CrawlerConfig,
    fetch_pool: Arc<WorkerPool>,
    extract_pool: Arc<WorkerPool>,
    throttles: DashMap<String, Arc<HostThrottle>>,
    closed: AtomicBool,
}

/// State of a single crawl, shared with its tasks.
struct CrawlState {
    registry: Registry,
    next_layer: Mutex<Vec<String>>,
    barrier: Arc<LayerBarrier>,
}

impl<F: Fetcher> Crawler<F> {
    pub fn new(fetcher: F, config: CrawlerConfig) -> Result<Self, CrawlError> {
        config.validate()?;
        let fetch_pool = Arc::new(WorkerPool::new("fetch", config.downloaders)?);
        let extract_pool = Arc::new(WorkerPool::new("extract", config.extractors)?);

        Ok(Self {
            fetcher: Arc::new(fetcher),
            config,
            fetch_pool,
            extract_pool,
            throttles: DashMap::new(),
            closed: AtomicBool::new(false),
        })
    }

    /// Downloads every page reachable from `start` in less than `max_depth`
    /// hops, `max_depth = 1` only downloads `start`.
    ///
    /// Failures of single pages are reported in [`CrawlResult::errors`].
    pub fn crawl(&self, start: &str, max_depth: usize) -> Result<CrawlResult, CrawlError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CrawlError::ShutDown);
        }
        if max_depth == 0 {
            return Err(CrawlError::InvalidDepth);
        }
        log::info!("Crawling {start} up to depth {max_depth}");

        let state = Arc::new(CrawlState {
            registry: Registry::default(),
            next_layer: Mutex::new(Vec::new()),
            barrier: Arc::new(LayerBarrier::default()),
        });

        state.registry.admit(start);
        let mut layer = vec![start.to_string()];
        let mut depth = 0;

        while !layer.is_empty() {
            log::debug!("Layer {depth}: {} pages", layer.len());
            let expand = depth + 1 < max_depth;

            for url in layer.drain(..) {
                self.schedule_fetch(&state, url, expand)?;
            }

            state.barrier.wait();
            // Jobs dropped by a concurrent shutdown settle the barrier too
            if self.closed.load(Ordering::SeqCst) {
                return Err(CrawlError::ShutDown);
            }
            layer = mem::take(&mut *state.next_layer.lock());
            depth += 1;
        }

        let result = state.registry.snapshot();
        log::info!(
            "Crawled {start}: {} downloaded, {} errors",
            result.downloaded.len(),
            result.errors.len()
        );
        Ok(result)
    }

    /// Stops both pools, further crawls fail with [`CrawlError::ShutDown`].
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.fetch_pool.close();
        self.extract_pool.close();
        self.fetch_pool.shutdown();
        self.extract_pool.shutdown();
        for throttle in self.throttles.iter() {
            throttle.clear();
        }
        self.throttles.clear();
    }

    fn throttle(&self, origin: String) -> Arc<HostThrottle> {
        self.throttles
            .entry(origin)
            .or_insert_with(|| {
                Arc::new(HostThrottle::new(
                    self.config.per_host,
                    self.fetch_pool.clone(),
                ))
            })
            .clone()
    }

    fn schedule_fetch(
        &self,
        state: &Arc<CrawlState>,
        url: String,
        expand: bool,
    ) -> Result<(), CrawlError> {
        let origin = match origin(&url) {
            Ok(origin) => origin,
            Err(e) => {
                state.registry.failed(&url, e);
                return Ok(());
            }
        };

        let throttle = self.throttle(origin);
        let ticket = state.barrier.register();
        let fetcher = self.fetcher.clone();
        let extract_pool = self.extract_pool.clone();
        let state = state.clone();
        let throttle_c = throttle.clone();

        throttle.admit(Box::new(move || {
            let _slot = FetchSlot {
                throttle: throttle_c,
                _ticket: ticket,
            };
            match guarded(|| fetcher.fetch(&url)) {
                Ok(document) if expand => {
                    let extract_ticket = state.barrier.register();
                    let state_c = state.clone();
                    let url_c = url.clone();
                    let submitted = extract_pool.submit(Box::new(move || {
                        extract(&state_c, &url_c, document);
                        drop(extract_ticket);
                    }));
                    // The dropped job releases its ticket, the crawl ends with ShutDown
                    if submitted.is_err() {
                        log::debug!("Not extracting links of {url}, crawler is shut down");
                    }
                }
                Ok(_) => state.registry.downloaded(&url),
                Err(e) => state.registry.failed(&url, PageError::fetch(e)),
            }
        }))
    }
}

impl<F: Fetcher> Drop for Crawler<F> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Barrier ticket and host slot of a running fetch, both released on drop.
struct FetchSlot {
    throttle: Arc<HostThrottle>,
    _ticket: Ticket,
}

impl Drop for FetchSlot {
    fn drop(&mut self) {
        self.throttle.complete();
    }
}

/// Calls into a collaborator, a panic becomes an error of that call.
fn guarded<T>(call: impl FnOnce() -> anyhow::Result<T>) -> anyhow::Result<T> {
    panic::catch_unwind(AssertUnwindSafe(call))
        .unwrap_or_else(|payload| Err(anyhow!("panicked: {}", panic_message(&*payload))))
}

fn extract<D: Document>(state: &CrawlState, url: &str, document: D) {
    match guarded(|| document.extract_links()) {
        Ok(links) => {
            state.registry.downloaded(url);
            let fresh = links
                .into_iter()
                .filter(|link| state.registry.admit(link))
                .collect::<Vec<_>>();
            if !fresh.is_empty() {
                state.next_layer.lock().extend(fresh);
            }
        }
        Err(e) => state.registry.failed(url, PageError::extract(e)),
    }
}

/// Host of `url`, with the port when it is explicit.
pub(crate) fn origin(url: &str) -> Result<String, PageError> {
    let parsed = Url::parse(url).map_err(|e| PageError::Address(format!("{url}: {e}")))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| PageError::Address(format!("{url}: missing host")))?;
    Ok(match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_of_url() {
        assert_eq!(Ok("example.test".to_string()), origin("https://example.test/a/b"));
        assert_eq!(
            Ok("example.test:8080".to_string()),
            origin("http://example.test:8080/")
        );
        assert_eq!(Ok("example.test".to_string()), origin("https://example.test:443/"));
    }

    #[test]
    fn guarded_call() {
        assert_eq!(7, guarded(|| Ok(7)).unwrap());
        assert_eq!(
            "nope",
            guarded::<()>(|| Err(anyhow!("nope"))).unwrap_err().to_string()
        );
        assert_eq!(
            "panicked: index out of range",
            guarded::<()>(|| panic!("index out of range"))
                .unwrap_err()
                .to_string()
        );
    }

    #[test]
    fn origin_of_invalid_url() {
        assert!(matches!(origin("not a url"), Err(PageError::Address(_))));
        assert!(matches!(origin("mailto:me@example.test"), Err(PageError::Address(_))));
    }
}
