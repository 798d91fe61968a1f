//! The facade (C7) tying the store and job pipeline together: the single
//! entry point embedders (CLI, MCP adapter, etc.) call into (spec.md §4.7).
//! Everything outside this module is a capability the facade composes, not
//! a thing callers reach into directly.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::RetrievalConfig;
use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::fetcher::{FetchOptions, FetcherRegistry};
use crate::job::{JobPipeline, JobView};
use crate::models::{RawContent, ScrapeOptions, SearchResult};
use crate::pipeline::PipelineRegistry;
use crate::store::{hybrid_search, HybridSearchParams, LibrarySummary, SqliteStore, VersionResolution};

pub struct SearchService {
    store: Arc<SqliteStore>,
    jobs: Arc<JobPipeline>,
    embedder: Arc<dyn Embedder>,
    retrieval: RetrievalConfig,
    fetchers: FetcherRegistry,
    pipelines: PipelineRegistry,
}

impl SearchService {
    pub fn new(
        store: Arc<SqliteStore>,
        jobs: Arc<JobPipeline>,
        embedder: Arc<dyn Embedder>,
        retrieval: RetrievalConfig,
    ) -> Self {
        Self {
            store,
            jobs,
            embedder,
            retrieval,
            fetchers: FetcherRegistry::new(),
            pipelines: PipelineRegistry::new(),
        }
    }

    /// Run a hybrid search against the best-matching version of `library`
    /// (spec.md §4.7 "search").
    pub async fn search(
        &self,
        library: &str,
        version: Option<&str>,
        query: &str,
    ) -> Result<Vec<SearchResult>> {
        let resolution = self.find_version(library, version).await?;
        let Some(resolved) = resolution.best_match else {
            let available = self.available_versions(library).await?;
            return Err(Error::VersionNotFound {
                library: library.to_string(),
                requested: version.unwrap_or("").to_string(),
                available_versions: available,
            });
        };

        let Some(version_row) = self.store.get_version(library, &resolved).await? else {
            return Ok(vec![]);
        };

        let embedder: Option<&dyn Embedder> = if self.embedder.dimensions() > 0 {
            Some(self.embedder.as_ref())
        } else {
            None
        };

        let params = HybridSearchParams {
            rrf_constant: self.retrieval.rrf_constant,
            candidate_multiplier: self.retrieval.candidate_multiplier.max(1) as usize,
            final_limit: self.retrieval.final_limit.max(1) as usize,
        };

        hybrid_search(self.store.pool(), version_row.id, query, embedder, &params).await
    }

    pub async fn find_version(&self, library: &str, version: Option<&str>) -> Result<VersionResolution> {
        self.store.find_best_version(library, version).await
    }

    async fn available_versions(&self, library: &str) -> Result<Vec<String>> {
        let libs = self.store.list_libraries().await?;
        Ok(libs
            .into_iter()
            .find(|l| l.library == library)
            .map(|l| l.versions.into_iter().map(|v| v.name).collect())
            .unwrap_or_default())
    }

    pub async fn list_libraries(&self) -> Result<Vec<LibrarySummary>> {
        self.store.list_libraries().await
    }

    pub async fn list_jobs(&self) -> Vec<JobView> {
        self.jobs.get_jobs().await
    }

    /// Enqueue a crawl; returns immediately with the job id (spec.md §4.7
    /// "scrape").
    pub async fn scrape(&self, options: ScrapeOptions) -> Result<Uuid> {
        self.jobs.enqueue_job(options).await
    }

    pub async fn cancel(&self, job_id: Uuid) -> Result<()> {
        self.jobs.cancel_job(job_id).await
    }

    pub async fn remove_version(&self, library: &str, version: &str) -> Result<()> {
        self.store.remove_version(library, version).await
    }

    /// One-shot fetch-and-process with no store write (spec.md §4.7
    /// "fetchUrl"): used to preview how a URL would be scraped without
    /// committing anything.
    pub async fn fetch_url(&self, url: &str) -> Result<RawContent> {
        let fetcher = self
            .fetchers
            .select(url)
            .ok_or_else(|| Error::Tool(format!("no fetcher can handle URL: {url}")))?;
        fetcher
            .fetch(url, &FetchOptions::default(), &CancellationToken::new())
            .await
    }

    /// Fetch a URL and run it through the matching content pipeline,
    /// without persisting anything (spec.md §4.7 "fetchUrl").
    pub async fn fetch_and_process(&self, url: &str, options: &ScrapeOptions) -> Result<crate::models::ProcessedContent> {
        let raw = self.fetch_url(url).await?;
        let fetcher = self
            .fetchers
            .select(url)
            .ok_or_else(|| Error::Tool(format!("no fetcher can handle URL: {url}")))?;
        let Some(pipeline) = self.pipelines.select(&raw) else {
            return Ok(crate::models::ProcessedContent {
                text_content: String::from_utf8_lossy(&raw.content).into_owned(),
                ..Default::default()
            });
        };
        pipeline.process(&raw, options, fetcher)
    }
}
