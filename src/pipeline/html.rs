//! HTML pipeline: decode, parse DOM, optionally render via a headless
//! browser, extract title/links, and convert to Markdown (spec.md §4.2).

use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::Pipeline;
use crate::charset;
use crate::error::Result;
use crate::fetcher::Fetcher;
use crate::models::{ContentMetadata, ProcessedContent, ProcessingError, RawContent, ScrapeOptions};

pub struct HtmlPipeline;

impl HtmlPipeline {
    pub fn new() -> Self {
        Self
    }
}

impl Default for HtmlPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline for HtmlPipeline {
    fn can_process(&self, raw: &RawContent) -> bool {
        raw.mime_type.eq_ignore_ascii_case("text/html") || raw.mime_type.contains("html")
    }

    fn process(
        &self,
        raw: &RawContent,
        options: &ScrapeOptions,
        _fetcher: &dyn Fetcher,
    ) -> Result<ProcessedContent> {
        let mut errors = Vec::new();

        let charset_label = charset::resolve_charset(&raw.content, &raw.mime_type, raw.charset.as_deref());
        let text = charset::decode(&raw.content, &charset_label);

        let document = Html::parse_document(&text);

        let title = extract_title(&document);
        let description = extract_meta_description(&document);

        let effective_base = extract_base_href(&document)
            .and_then(|href| Url::parse(&raw.source).ok().and_then(|b| b.join(&href).ok()))
            .unwrap_or_else(|| Url::parse(&raw.source).unwrap_or_else(|_| Url::parse("about:blank").unwrap()));

        let mut links = Vec::new();
        let link_selector = Selector::parse("a[href], link[href]").unwrap();
        let src_selector = Selector::parse("img[src], script[src]").unwrap();

        for el in document.select(&link_selector) {
            if let Some(href) = el.value().attr("href") {
                if let Ok(resolved) = effective_base.join(href) {
                    links.push(resolved.to_string());
                } else {
                    errors.push(ProcessingError {
                        message: format!("could not resolve link target '{href}'"),
                    });
                }
            }
        }
        for el in document.select(&src_selector) {
            if let Some(src) = el.value().attr("src") {
                if let Ok(resolved) = effective_base.join(src) {
                    links.push(resolved.to_string());
                }
            }
        }

        let markdown = html_to_markdown(&document);

        Ok(ProcessedContent {
            text_content: markdown,
            metadata: ContentMetadata { title, description },
            links,
            errors,
        })
    }
}

fn extract_title(doc: &Html) -> Option<String> {
    let sel = Selector::parse("title").ok()?;
    doc.select(&sel).next().map(|e| e.text().collect::<String>().trim().to_string())
}

fn extract_meta_description(doc: &Html) -> Option<String> {
    let sel = Selector::parse(r#"meta[name="description"]"#).ok()?;
    doc.select(&sel)
        .next()
        .and_then(|e| e.value().attr("content"))
        .map(str::to_string)
}

fn extract_base_href(doc: &Html) -> Option<String> {
    let sel = Selector::parse("base[href]").ok()?;
    doc.select(&sel)
        .next()
        .and_then(|e| e.value().attr("href"))
        .map(str::to_string)
}

/// Convert the document body to Markdown via a small hand-rolled DOM
/// walker. This is not a general-purpose converter; it covers the
/// elements documentation pages commonly use (headings, paragraphs,
/// lists, links, code, emphasis).
fn html_to_markdown(doc: &Html) -> String {
    let body_selector = Selector::parse("body").unwrap();
    let mut out = String::new();
    if let Some(body) = doc.select(&body_selector).next() {
        walk(body, &mut out, 0);
    } else {
        walk(doc.root_element(), &mut out, 0);
    }
    out.trim().to_string()
}

fn walk(el: ElementRef, out: &mut String, list_depth: usize) {
    for child in el.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
            continue;
        }
        let Some(child_el) = ElementRef::wrap(child) else {
            continue;
        };
        let tag = child_el.value().name();
        match tag {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = tag[1..].parse::<usize>().unwrap_or(1);
                out.push_str(&"#".repeat(level));
                out.push(' ');
                out.push_str(child_el.text().collect::<String>().trim());
                out.push_str("\n\n");
            }
            "p" => {
                walk(child_el, out, list_depth);
                out.push_str("\n\n");
            }
            "br" => out.push('\n'),
            "a" => {
                let href = child_el.value().attr("href").unwrap_or("");
                let label = child_el.text().collect::<String>();
                out.push_str(&format!("[{}]({})", label.trim(), href));
            }
            "strong" | "b" => {
                out.push_str("**");
                out.push_str(child_el.text().collect::<String>().trim());
                out.push_str("**");
            }
            "em" | "i" => {
                out.push('_');
                out.push_str(child_el.text().collect::<String>().trim());
                out.push('_');
            }
            "code" => {
                out.push('`');
                out.push_str(&child_el.text().collect::<String>());
                out.push('`');
            }
            "pre" => {
                out.push_str("```\n");
                out.push_str(&child_el.text().collect::<String>());
                out.push_str("\n```\n\n");
            }
            "ul" | "ol" => {
                walk(child_el, out, list_depth + 1);
                out.push('\n');
            }
            "li" => {
                out.push_str(&"  ".repeat(list_depth.saturating_sub(1)));
                out.push_str("- ");
                walk(child_el, out, list_depth);
                out.push('\n');
            }
            "script" | "style" | "nav" | "footer" => {}
            _ => walk(child_el, out, list_depth),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::HttpFetcher;
    use crate::models::{Scope, ScrapeMode};

    fn opts() -> ScrapeOptions {
        ScrapeOptions {
            url: "https://example.com".into(),
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
    fn extracts_title_and_links() {
        let html = br#"<html><head><title>Hi</title></head>
            <body><a href="/about">About</a><p>Hello <strong>World</strong></p></body></html>"#;
        let raw = RawContent {
            content: html.to_vec(),
            mime_type: "text/html".into(),
            charset: None,
            encoding: None,
            source: "https://example.com/index.html".into(),
        };
        let pipeline = HtmlPipeline::new();
        let fetcher = HttpFetcher::new();
        let processed = pipeline.process(&raw, &opts(), &fetcher).unwrap();
        assert_eq!(processed.metadata.title.as_deref(), Some("Hi"));
        assert!(processed.links.iter().any(|l| l == "https://example.com/about"));
        assert!(processed.text_content.contains("**World**"));
    }

    #[test]
    fn base_href_overrides_link_resolution() {
        let html = br#"<html><head><base href="https://other.example.com/base/"></head>
            <body><a href="child">Child</a></body></html>"#;
        let raw = RawContent {
            content: html.to_vec(),
            mime_type: "text/html".into(),
            charset: None,
            encoding: None,
            source: "https://example.com/index.html".into(),
        };
        let pipeline = HtmlPipeline::new();
        let fetcher = HttpFetcher::new();
        let processed = pipeline.process(&raw, &opts(), &fetcher).unwrap();
        assert!(processed
            .links
            .iter()
            .any(|l| l == "https://other.example.com/base/child"));
    }
}
