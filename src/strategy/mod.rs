//! Scraper Strategies (C3): BFS URL walk under a scope, applying filters,
//! feeding pipelines (spec.md §4.3).

pub mod github;
pub mod local;
pub mod normalize;
pub mod patterns;
pub mod scope;
pub mod web;

pub use github::GitHubScraperStrategy;
pub use local::LocalFileScraperStrategy;
pub use web::WebScraperStrategy;

use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::models::{Document, ScrapeOptions};
use normalize::{normalize, NormalizeOptions};
use patterns::CompiledPatterns;

/// One BFS queue entry.
#[derive(Debug, Clone)]
pub struct QueueItem {
    pub url: String,
    pub depth: u32,
}

/// The outcome of processing a single queue item.
#[derive(Debug, Default)]
pub struct ProcessItemResult {
    pub document: Option<Document>,
    pub links: Vec<String>,
    pub final_url: Option<String>,
}

/// Per-strategy hook the shared BFS driver calls for each item.
#[async_trait]
pub trait ItemProcessor: Send + Sync {
    async fn process_item(
        &self,
        item: &QueueItem,
        options: &ScrapeOptions,
        cancel: &CancellationToken,
    ) -> Result<ProcessItemResult>;

    /// `github-file://` items bypass scope checks (spec.md §4.3).
    fn bypasses_scope(&self, _url: &str) -> bool {
        false
    }
}

/// Called once per scraped document (spec.md §4.6 "Progress").
pub type ProgressCallback<'a> = dyn Fn(u32, u32) + Send + Sync + 'a;

/// A fully constructed scraper strategy, selected from an ordered list by
/// the URL scheme/host (spec.md §4.3).
#[async_trait]
pub trait Strategy: Send + Sync {
    fn can_handle(&self, url: &str) -> bool;
    async fn scrape(
        &self,
        options: &ScrapeOptions,
        progress: &ProgressCallback<'_>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Document>>;
}

/// The shared BFS driver every strategy is built on (spec.md §4.3 "Shared
/// BFS driver"). Generic over the strategy-specific [`ItemProcessor`].
pub async fn run_bfs(
    options: &ScrapeOptions,
    processor: &dyn ItemProcessor,
    progress: &ProgressCallback<'_>,
    cancel: &CancellationToken,
) -> Result<Vec<Document>> {
    let norm_opts = NormalizeOptions::default();
    let exclude = options
        .exclude_patterns
        .clone()
        .unwrap_or_else(patterns::default_exclude_patterns);
    let compiled = CompiledPatterns::compile(&options.include_patterns, &exclude)?;

    let mut queue: VecDeque<QueueItem> = VecDeque::new();
    let mut visited: HashSet<String> = HashSet::new();
    let start_normalized = normalize(&options.url, norm_opts);
    visited.insert(start_normalized);
    queue.push_back(QueueItem {
        url: options.url.clone(),
        depth: 0,
    });

    let mut total_discovered: u32 = 1;
    let mut effective_total: u32 = 1.min(options.max_pages);
    let mut documents = Vec::new();
    let mut sort_order: i64 = 0;
    let mut canonical_base = options.url.clone();
    let mut pages_processed: u32 = 0;

    while !queue.is_empty() && pages_processed < options.max_pages {
        if cancel.is_cancelled() {
            return Err(Error::Cancellation);
        }

        let batch_size = options
            .max_concurrency
            .min((options.max_pages - pages_processed) as usize)
            .min(queue.len())
            .max(1);
        let batch: Vec<QueueItem> = (0..batch_size).filter_map(|_| queue.pop_front()).collect();

        // Fetch/process up to `maxConcurrency` items of the batch concurrently
        // (spec.md §5); results are then folded back in queue order so
        // `sort_order` and `canonical_base` stay deterministic regardless of
        // which item actually finishes first.
        let outcomes = futures::future::join_all(
            batch.iter().map(|item| processor.process_item(item, options, cancel)),
        )
        .await;

        for (item, outcome) in batch.into_iter().zip(outcomes) {
            if cancel.is_cancelled() {
                return Err(Error::Cancellation);
            }

            let result = match outcome {
                Ok(r) => r,
                Err(Error::Cancellation) => return Err(Error::Cancellation),
                Err(e) if options.ignore_errors => {
                    tracing::warn!(url = %item.url, error = %e, "scrape item failed, continuing");
                    ProcessItemResult::default()
                }
                Err(e) => return Err(e),
            };

            if let Some(mut doc) = result.document {
                doc.sort_order = sort_order;
                sort_order += 1;
                documents.push(doc);
            }
            pages_processed += 1;
            progress(pages_processed, effective_total.max(pages_processed));

            if item.depth == 0 {
                if let Some(final_url) = &result.final_url {
                    if *final_url != options.url {
                        if let (Ok(a), Ok(b)) =
                            (url::Url::parse(final_url), url::Url::parse(&options.url))
                        {
                            if a.scheme() == b.scheme() {
                                canonical_base = final_url.clone();
                            }
                        }
                    }
                }
            }

            if item.depth >= options.max_depth {
                continue;
            }

            let Ok(base_url) = url::Url::parse(
                result.final_url.as_deref().unwrap_or(&canonical_base),
            ) else {
                continue;
            };

            for link in &result.links {
                let bypasses = processor.bypasses_scope(link);
                let resolved = if bypasses {
                    link.clone()
                } else {
                    match base_url.join(link) {
                        Ok(u) => u.to_string(),
                        Err(_) => continue,
                    }
                };

                if !bypasses {
                    let Ok(target) = url::Url::parse(&resolved) else {
                        continue;
                    };
                    if !scope::in_scope(&base_url, &target, options.scope) {
                        continue;
                    }
                }

                let candidates: Vec<String> = if resolved.starts_with("github-file://") {
                    vec![resolved.trim_start_matches("github-file://").to_string()]
                } else if let Ok(u) = url::Url::parse(&resolved) {
                    if u.scheme() == "file" {
                        patterns::file_candidates(u.path())
                    } else {
                        patterns::http_candidates(&u)
                    }
                } else {
                    vec![resolved.clone()]
                };
                let refs: Vec<&str> = candidates.iter().map(String::as_str).collect();
                if !compiled.matches(&refs) {
                    continue;
                }

                let normalized = normalize(&resolved, norm_opts);
                if visited.contains(&normalized) {
                    continue;
                }
                visited.insert(normalized);
                total_discovered += 1;
                if effective_total < options.max_pages {
                    effective_total += 1;
                }
                queue.push_back(QueueItem {
                    url: resolved,
                    depth: item.depth + 1,
                });
            }
        }
    }

    let _ = total_discovered;
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Scope, ScrapeMode};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct GraphProcessor {
        links: HashMap<String, Vec<String>>,
    }

    #[async_trait]
    impl ItemProcessor for GraphProcessor {
        async fn process_item(
            &self,
            item: &QueueItem,
            _options: &ScrapeOptions,
            _cancel: &CancellationToken,
        ) -> Result<ProcessItemResult> {
            Ok(ProcessItemResult {
                document: Some(Document {
                    id: 0,
                    library_id: 0,
                    version_id: 0,
                    url: item.url.clone(),
                    content: format!("content of {}", item.url),
                    metadata: serde_json::json!({}),
                    sort_order: 0,
                }),
                links: self.links.get(&item.url).cloned().unwrap_or_default(),
                final_url: Some(item.url.clone()),
            })
        }
    }

    fn opts(url: &str, max_pages: u32, max_depth: u32) -> ScrapeOptions {
        ScrapeOptions {
            url: url.to_string(),
            library: "lib".to_string(),
            version: "".to_string(),
            scope: Scope::Subpages,
            max_pages,
            max_depth,
            max_concurrency: 3,
            follow_redirects: true,
            ignore_errors: true,
            scrape_mode: ScrapeMode::Fetch,
            include_patterns: vec![],
            exclude_patterns: None,
            headers: vec![],
        }
    }

    fn linear_site() -> GraphProcessor {
        let mut links = HashMap::new();
        links.insert(
            "https://example.com/".to_string(),
            vec!["https://example.com/a".to_string()],
        );
        links.insert(
            "https://example.com/a".to_string(),
            vec!["https://example.com/b".to_string()],
        );
        GraphProcessor { links }
    }

    #[tokio::test]
    async fn max_pages_one_stops_after_the_seed_url() {
        let processor = linear_site();
        let options = opts("https://example.com/", 1, 10);
        let cancel = CancellationToken::new();
        let docs = run_bfs(&options, &processor, &|_, _| {}, &cancel).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].url, "https://example.com/");
    }

    #[tokio::test]
    async fn max_depth_zero_never_follows_discovered_links() {
        let processor = linear_site();
        let options = opts("https://example.com/", 100, 0);
        let cancel = CancellationToken::new();
        let docs = run_bfs(&options, &processor, &|_, _| {}, &cancel).await.unwrap();
        assert_eq!(docs.len(), 1);
    }

    #[tokio::test]
    async fn unbounded_depth_and_pages_walks_the_whole_graph() {
        let processor = linear_site();
        let options = opts("https://example.com/", 100, 10);
        let cancel = CancellationToken::new();
        let docs = run_bfs(&options, &processor, &|_, _| {}, &cancel).await.unwrap();
        assert_eq!(docs.len(), 3);
    }

    #[tokio::test]
    async fn cancellation_mid_crawl_returns_cancellation_error() {
        let processor = linear_site();
        let options = opts("https://example.com/", 100, 10);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = run_bfs(&options, &processor, &|_, _| {}, &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancellation());
    }

    #[tokio::test]
    async fn progress_callback_fires_once_per_document() {
        let processor = linear_site();
        let options = opts("https://example.com/", 100, 10);
        let cancel = CancellationToken::new();
        let calls = AtomicUsize::new(0);
        let docs = run_bfs(&options, &processor, &|_, _| { calls.fetch_add(1, Ordering::SeqCst); }, &cancel)
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), docs.len());
    }
}
