//! `LocalFileScraperStrategy`: the `file://` BFS strategy (spec.md §4.3).
//!
//! Local trees have no outgoing hyperlinks to crawl in the general case;
//! this strategy walks the filesystem directly rather than discovering
//! links from content, reusing the shared BFS driver purely for its
//! scope/pattern/visited-set machinery with a synthetic "link list" equal
//! to a directory's children.

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::{run_bfs, ItemProcessor, ProcessItemResult, ProgressCallback, QueueItem, Strategy};
use crate::error::Result;
use crate::fetcher::{FetchOptions, FileFetcher, Fetcher};
use crate::models::{Document, ScrapeOptions};
use crate::pipeline::PipelineRegistry;

pub struct LocalFileScraperStrategy {
    fetcher: FileFetcher,
    pipelines: PipelineRegistry,
}

impl LocalFileScraperStrategy {
    pub fn new() -> Self {
        Self {
            fetcher: FileFetcher,
            pipelines: PipelineRegistry::new(),
        }
    }
}

impl Default for LocalFileScraperStrategy {
    fn default() -> Self {
        Self::new()
    }
}

fn dir_entries_as_links(path: &std::path::Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(path) else {
        return vec![];
    };
    entries
        .filter_map(|e| e.ok())
        .filter_map(|e| url::Url::from_file_path(e.path()).ok())
        .map(|u| u.to_string())
        .collect()
}

#[async_trait]
impl ItemProcessor for LocalFileScraperStrategy {
    async fn process_item(
        &self,
        item: &QueueItem,
        options: &ScrapeOptions,
        cancel: &CancellationToken,
    ) -> Result<ProcessItemResult> {
        let parsed = url::Url::parse(&item.url)?;
        let path = parsed
            .to_file_path()
            .map_err(|()| crate::error::Error::scraper(format!("invalid file URL: {}", item.url)))?;

        if path.is_dir() {
            return Ok(ProcessItemResult {
                document: None,
                links: dir_entries_as_links(&path),
                final_url: Some(item.url.clone()),
            });
        }

        let fetch_options = FetchOptions::default();
        let raw = self.fetcher.fetch(&item.url, &fetch_options, cancel).await?;
        let Some(pipeline) = self.pipelines.select(&raw) else {
            return Ok(ProcessItemResult {
                document: None,
                links: vec![],
                final_url: Some(raw.source),
            });
        };
        let processed = pipeline.process(&raw, options, &self.fetcher)?;

        let document = Document {
            id: 0,
            library_id: 0,
            version_id: 0,
            url: raw.source.clone(),
            content: processed.text_content,
            metadata: json!({
                "url": raw.source,
                "path": path.display().to_string(),
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
impl Strategy for LocalFileScraperStrategy {
    fn can_handle(&self, url: &str) -> bool {
        url.starts_with("file://")
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
