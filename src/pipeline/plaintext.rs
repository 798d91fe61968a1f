//! Plain-text and source-code pipeline: decode and return verbatim, with
//! no links (spec.md §4.2 "Source-code and plain-text pipelines").

use super::Pipeline;
use crate::charset;
use crate::error::Result;
use crate::fetcher::Fetcher;
use crate::models::{ContentMetadata, ProcessedContent, RawContent, ScrapeOptions};

pub struct PlainTextPipeline;

impl Pipeline for PlainTextPipeline {
    fn can_process(&self, _raw: &RawContent) -> bool {
        // Catch-all: selected only when no earlier pipeline in the
        // registry claims the content.
        true
    }

    fn process(
        &self,
        raw: &RawContent,
        _options: &ScrapeOptions,
        _fetcher: &dyn Fetcher,
    ) -> Result<ProcessedContent> {
        let charset_label =
            charset::resolve_charset(&raw.content, &raw.mime_type, raw.charset.as_deref());
        let text = charset::decode(&raw.content, &charset_label);
        Ok(ProcessedContent {
            text_content: text,
            metadata: ContentMetadata::default(),
            links: vec![],
            errors: vec![],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::HttpFetcher;
    use crate::models::{Scope, ScrapeMode};

    #[test]
    fn returns_verbatim_text_with_no_links() {
        let raw = RawContent {
            content: b"fn main() {}".to_vec(),
            mime_type: "text/x-rust".into(),
            charset: None,
            encoding: None,
            source: "file:///a.rs".into(),
        };
        let opts = ScrapeOptions {
            url: "file:///a.rs".into(),
            library: "lib".into(),
            version: String::new(),
            scope: Scope::Subpages,
            max_pages: 1,
            max_depth: 0,
            max_concurrency: 1,
            follow_redirects: true,
            ignore_errors: true,
            scrape_mode: ScrapeMode::Fetch,
            include_patterns: vec![],
            exclude_patterns: None,
            headers: vec![],
        };
        let p = PlainTextPipeline;
        let fetcher = HttpFetcher::new();
        let processed = p.process(&raw, &opts, &fetcher).unwrap();
        assert_eq!(processed.text_content, "fn main() {}");
        assert!(processed.links.is_empty());
    }
}
