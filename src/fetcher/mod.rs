//! Fetchers (C1): retrieve raw bytes from a URL. `FetcherRegistry` holds an
//! ordered list and selects the first `can_handle` match, grounded on the
//! teacher's `ConnectorRegistry` pattern.

pub mod file;
mod http;

pub use file::FileFetcher;
pub use http::HttpFetcher;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::models::RawContent;

/// Per-request fetch options.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub follow_redirects: bool,
    pub headers: Vec<(String, String)>,
    pub timeout: Option<std::time::Duration>,
}

/// A source of raw bytes for a URL scheme. See spec.md §4.1.
#[async_trait]
pub trait Fetcher: Send + Sync {
    fn can_handle(&self, url: &str) -> bool;
    async fn fetch(
        &self,
        url: &str,
        options: &FetchOptions,
        cancel: &CancellationToken,
    ) -> Result<RawContent>;
}

/// An ordered registry of fetchers; `select` returns the first match.
pub struct FetcherRegistry {
    fetchers: Vec<Box<dyn Fetcher>>,
}

impl FetcherRegistry {
    pub fn new() -> Self {
        Self {
            fetchers: vec![Box::new(HttpFetcher::new()), Box::new(FileFetcher)],
        }
    }

    pub fn select(&self, url: &str) -> Option<&dyn Fetcher> {
        self.fetchers
            .iter()
            .find(|f| f.can_handle(url))
            .map(|b| b.as_ref())
    }
}

impl Default for FetcherRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_http_fetcher_for_https_url() {
        let reg = FetcherRegistry::new();
        assert!(reg.select("https://example.com").is_some());
    }

    #[test]
    fn selects_file_fetcher_for_file_url() {
        let reg = FetcherRegistry::new();
        assert!(reg.select("file:///tmp/a.txt").is_some());
    }

    #[test]
    fn no_match_for_unknown_scheme() {
        let reg = FetcherRegistry::new();
        assert!(reg.select("ftp://example.com").is_none());
    }
}
