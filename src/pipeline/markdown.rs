//! Markdown pipeline: parse, extract H1/front-matter title, collect link
//! targets, return text unchanged (spec.md §4.2).

use pulldown_cmark::{Event, HeadingLevel, Parser, Tag, TagEnd};

use super::Pipeline;
use crate::charset;
use crate::error::Result;
use crate::fetcher::Fetcher;
use crate::models::{ContentMetadata, ProcessedContent, RawContent, ScrapeOptions};

pub struct MarkdownPipeline;

impl Pipeline for MarkdownPipeline {
    fn can_process(&self, raw: &RawContent) -> bool {
        raw.mime_type.eq_ignore_ascii_case("text/markdown")
            || raw.mime_type.contains("markdown")
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

        let title = front_matter_title(&text).or_else(|| first_h1(&text));
        let links = collect_links(&text, &raw.source);

        Ok(ProcessedContent {
            text_content: text,
            metadata: ContentMetadata {
                title,
                description: None,
            },
            links,
            errors: vec![],
        })
    }
}

/// Pull `title:` out of a leading `---`-delimited YAML front-matter block,
/// without a YAML dependency (the value is taken verbatim, quotes stripped).
fn front_matter_title(text: &str) -> Option<String> {
    let body = text.strip_prefix("---\n")?;
    let end = body.find("\n---")?;
    let front_matter = &body[..end];
    for line in front_matter.lines() {
        if let Some(rest) = line.strip_prefix("title:") {
            return Some(rest.trim().trim_matches('"').trim_matches('\'').to_string());
        }
    }
    None
}

fn first_h1(text: &str) -> Option<String> {
    let parser = Parser::new(text);
    let mut in_h1 = false;
    let mut title = String::new();
    for event in parser {
        match event {
            Event::Start(Tag::Heading { level: HeadingLevel::H1, .. }) => in_h1 = true,
            Event::End(TagEnd::Heading(HeadingLevel::H1)) => {
                if !title.is_empty() {
                    return Some(title.trim().to_string());
                }
                in_h1 = false;
            }
            Event::Text(t) if in_h1 => title.push_str(&t),
            _ => {}
        }
    }
    None
}

fn collect_links(text: &str, base: &str) -> Vec<String> {
    let base_url = url::Url::parse(base).ok();
    let parser = Parser::new(text);
    let mut links = Vec::new();
    for event in parser {
        if let Event::Start(Tag::Link { dest_url, .. }) = event {
            let resolved = base_url
                .as_ref()
                .and_then(|b| b.join(&dest_url).ok())
                .map(|u| u.to_string())
                .unwrap_or_else(|| dest_url.to_string());
            links.push(resolved);
        }
    }
    links
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::HttpFetcher;
    use crate::models::{Scope, ScrapeMode};

    fn opts() -> ScrapeOptions {
        ScrapeOptions {
            url: "https://example.com/doc.md".into(),
            library: "lib".into(),
            version: String::new(),
            scope: Scope::Subpages,
            max_pages: 10,
            max_depth: 3,
            max_concurrency: 1,
            follow_redirects: true,
            ignore_errors: true,
            scrape_mode: ScrapeMode::Fetch,
            include_patterns: vec![],
            exclude_patterns: None,
            headers: vec![],
        }
    }

    #[test]
    fn extracts_h1_title_and_links() {
        let md = "# Intro\n\nSee [other](other.md) for more.\n";
        let raw = RawContent {
            content: md.as_bytes().to_vec(),
            mime_type: "text/markdown".into(),
            charset: None,
            encoding: None,
            source: "https://example.com/doc.md".into(),
        };
        let p = MarkdownPipeline;
        let fetcher = HttpFetcher::new();
        let processed = p.process(&raw, &opts(), &fetcher).unwrap();
        assert_eq!(processed.metadata.title.as_deref(), Some("Intro"));
        assert_eq!(processed.links, vec!["https://example.com/other.md"]);
        assert_eq!(processed.text_content, md);
    }

    #[test]
    fn front_matter_title_wins_over_h1() {
        let md = "---\ntitle: \"Front Matter Title\"\n---\n\n# Different H1\n";
        let raw = RawContent {
            content: md.as_bytes().to_vec(),
            mime_type: "text/markdown".into(),
            charset: None,
            encoding: None,
            source: "https://example.com/doc.md".into(),
        };
        let p = MarkdownPipeline;
        let fetcher = HttpFetcher::new();
        let processed = p.process(&raw, &opts(), &fetcher).unwrap();
        assert_eq!(processed.metadata.title.as_deref(), Some("Front Matter Title"));
    }
}
