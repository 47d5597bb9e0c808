/// Retrieves documents, one attempt per call.
///
/// Implementations are shared by every fetch worker, timeouts and caching are
/// theirs to handle.
pub trait Fetcher: Send + Sync + 'static {
    type Document: Document;

    fn fetch(&self, url: &str) -> anyhow::Result<Self::Document>;
}

/// A fetched page whose links can be read once.
pub trait Document: Send + 'static {
    /// Absolute addresses of the pages this document links to.
    fn extract_links(self) -> anyhow::Result<Vec<String>>;
}
