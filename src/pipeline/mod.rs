//! Content Pipelines (C2): transform raw bytes into normalized
//! text+metadata+links (spec.md §4.2).

mod html;
mod markdown;
mod plaintext;

pub use html::HtmlPipeline;
pub use markdown::MarkdownPipeline;
pub use plaintext::PlainTextPipeline;

use crate::error::Result;
use crate::fetcher::Fetcher;
use crate::models::{ProcessedContent, RawContent, ScrapeOptions};

/// A content transformer selected by MIME type. `close()` releases any
/// expensive resources (e.g. a headless browser process) the pipeline
/// instance may hold; the owning strategy calls it once per crawl.
pub trait Pipeline: Send + Sync {
    fn can_process(&self, raw: &RawContent) -> bool;
    fn process(
        &self,
        raw: &RawContent,
        options: &ScrapeOptions,
        fetcher: &dyn Fetcher,
    ) -> Result<ProcessedContent>;
    fn close(&self) {}
}

/// An ordered registry of pipelines; `select` returns the first match.
pub struct PipelineRegistry {
    pipelines: Vec<Box<dyn Pipeline>>,
}

impl PipelineRegistry {
    pub fn new() -> Self {
        Self {
            pipelines: vec![
                Box::new(HtmlPipeline::new()),
                Box::new(MarkdownPipeline),
                Box::new(PlainTextPipeline),
            ],
        }
    }

    pub fn select(&self, raw: &RawContent) -> Option<&dyn Pipeline> {
        self.pipelines.iter().find(|p| p.can_process(raw)).map(|b| b.as_ref())
    }

    pub fn close_all(&self) {
        for p in &self.pipelines {
            p.close();
        }
    }
}

impl Default for PipelineRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(mime: &str) -> RawContent {
        RawContent {
            content: b"hello".to_vec(),
            mime_type: mime.to_string(),
            charset: None,
            encoding: None,
            source: "https://example.com".to_string(),
        }
    }

    #[test]
    fn selects_html_pipeline_for_html_mime() {
        let reg = PipelineRegistry::new();
        assert!(matches!(
            reg.select(&raw("text/html")).map(|_| ()),
            Some(())
        ));
    }

    #[test]
    fn falls_back_to_plaintext_for_unknown_mime() {
        let reg = PipelineRegistry::new();
        assert!(reg.select(&raw("application/octet-stream")).is_some());
    }
}
