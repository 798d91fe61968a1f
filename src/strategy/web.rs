//! `WebScraperStrategy`: the http/https BFS strategy (spec.md §4.3 "Web").

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::{run_bfs, ItemProcessor, ProcessItemResult, ProgressCallback, QueueItem, Strategy};
use crate::error::Result;
use crate::fetcher::{FetchOptions, FetcherRegistry};
use crate::models::{Document, ScrapeOptions};
use crate::pipeline::PipelineRegistry;

pub struct WebScraperStrategy {
    fetchers: FetcherRegistry,
    pipelines: PipelineRegistry,
}

impl WebScraperStrategy {
    pub fn new() -> Self {
        Self {
            fetchers: FetcherRegistry::new(),
            pipelines: PipelineRegistry::new(),
        }
    }
}

impl Default for WebScraperStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ItemProcessor for WebScraperStrategy {
    async fn process_item(
        &self,
        item: &QueueItem,
        options: &ScrapeOptions,
        cancel: &CancellationToken,
    ) -> Result<ProcessItemResult> {
        let fetcher = self
            .fetchers
            .select(&item.url)
            .ok_or_else(|| crate::error::Error::scraper(format!("no fetcher for {}", item.url)))?;

        let fetch_options = FetchOptions {
            follow_redirects: options.follow_redirects,
            headers: options.headers.clone(),
            timeout: None,
        };
        let raw = fetcher.fetch(&item.url, &fetch_options, cancel).await?;

        let Some(pipeline) = self.pipelines.select(&raw) else {
            return Ok(ProcessItemResult {
                document: None,
                links: vec![],
                final_url: Some(raw.source),
            });
        };
        let processed = pipeline.process(&raw, options, fetcher)?;

        let document = Document {
            id: 0,
            library_id: 0,
            version_id: 0,
            url: raw.source.clone(),
            content: processed.text_content,
            metadata: json!({
                "url": raw.source,
                "title": processed.metadata.title,
                "library": options.library,
                "version": options.version,
            }),
            sort_order: 0,
        };

        Ok(ProcessItemResult {
            document: Some(document),
            links: processed.links,
            final_url: Some(raw.source),
        })
    }
}

#[async_trait]
impl Strategy for WebScraperStrategy {
    fn can_handle(&self, url: &str) -> bool {
        (url.starts_with("http://") || url.starts_with("https://"))
            && !super::github::is_github_repo_url(url)
    }

    async fn scrape(
        &self,
        options: &ScrapeOptions,
        progress: &ProgressCallback<'_>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Document>> {
        let docs = run_bfs(options, self, progress, cancel).await?;
        self.pipelines.close_all();
        Ok(docs)
    }
}
