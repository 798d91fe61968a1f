//! Core data models flowing through ingestion, storage, and retrieval.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A namespace documents are indexed under. Unique by `name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Library {
    pub id: i64,
    pub name: String,
}

/// Lifecycle state of a [`Version`], mirrored between the running job
/// and the persisted `versions` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VersionStatus {
    NotIndexed,
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
    Updating,
}

impl VersionStatus {
    /// Parse the `SCREAMING_SNAKE_CASE` form stored in `versions.status`.
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "NOT_INDEXED" => Self::NotIndexed,
            "QUEUED" => Self::Queued,
            "RUNNING" => Self::Running,
            "COMPLETED" => Self::Completed,
            "FAILED" => Self::Failed,
            "CANCELLED" => Self::Cancelled,
            "UPDATING" => Self::Updating,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotIndexed => "NOT_INDEXED",
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
            Self::Updating => "UPDATING",
        }
    }

    /// Terminal states a job never leaves once reached.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// A named, versioned index under a [`Library`]. `name` is a normalized
/// semver string, a partial semver, or `""` for "unversioned".
#[derive(Debug, Clone)]
pub struct Version {
    pub id: i64,
    pub library_id: i64,
    pub name: String,
    pub status: VersionStatus,
    pub source_url: Option<String>,
    pub progress_pages: i64,
    pub progress_max_pages: i64,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Persisted unit of indexed content.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: i64,
    pub library_id: i64,
    pub version_id: i64,
    pub url: String,
    pub content: String,
    /// Free-form JSON metadata (`title`, `path`, ...).
    pub metadata: serde_json::Value,
    /// Preserves BFS visitation order within one crawl.
    pub sort_order: i64,
}

/// One hit returned from hybrid search.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub content: String,
    pub metadata: serde_json::Value,
    pub score: f64,
    pub rank: i64,
}

/// Content recovered from a fetcher before pipeline processing.
#[derive(Debug, Clone)]
pub struct RawContent {
    pub content: Vec<u8>,
    pub mime_type: String,
    pub charset: Option<String>,
    pub encoding: Option<String>,
    /// Final URL after any redirects.
    pub source: String,
}

/// Output of a content pipeline.
#[derive(Debug, Clone, Default)]
pub struct ProcessedContent {
    pub text_content: String,
    pub metadata: ContentMetadata,
    pub links: Vec<String>,
    pub errors: Vec<ProcessingError>,
}

#[derive(Debug, Clone, Default)]
pub struct ContentMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProcessingError {
    pub message: String,
}

/// The recognized scrape options (spec.md §6 "Scrape options").
#[derive(Debug, Clone)]
pub struct ScrapeOptions {
    pub url: String,
    pub library: String,
    pub version: String,
    pub scope: Scope,
    pub max_pages: u32,
    pub max_depth: u32,
    pub max_concurrency: usize,
    pub follow_redirects: bool,
    pub ignore_errors: bool,
    pub scrape_mode: ScrapeMode,
    pub include_patterns: Vec<String>,
    /// `None` = caller passed nothing, apply built-in defaults.
    /// `Some(vec![])` = caller explicitly disabled defaults.
    pub exclude_patterns: Option<Vec<String>>,
    pub headers: Vec<(String, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Subpages,
    Hostname,
    Domain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeMode {
    Fetch,
}

/// Live, unthrottled progress snapshot a running job carries; the persisted
/// `Version.progress_pages` lags behind this via periodic throttled writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobProgress {
    pub pages: u32,
    pub max_pages: u32,
}
