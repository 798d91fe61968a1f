//! `FileFetcher`: reads `file://` URLs from local disk (spec.md §4.1).

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{FetchOptions, Fetcher};
use crate::error::{Error, Result};
use crate::models::RawContent;

/// Extension → MIME type table covering the text-like formats this core
/// processes (spec.md §6's source-extension allow-list, reused here for
/// MIME classification as well as the GitHub strategy's filter).
pub fn mime_type_for_extension(ext: &str) -> Option<&'static str> {
    let ext = ext.to_ascii_lowercase();
    Some(match ext.as_str() {
        "html" | "htm" => "text/html",
        "md" | "mdx" => "text/markdown",
        "txt" | "rst" | "adoc" | "asciidoc" | "log" => "text/plain",
        "xml" => "application/xml",
        "json" => "application/json",
        "yaml" | "yml" => "application/yaml",
        "toml" => "application/toml",
        "css" | "scss" | "sass" | "less" => "text/css",
        "js" | "jsx" | "mjs" | "cjs" => "text/javascript",
        "ts" | "tsx" => "text/typescript",
        "py" => "text/x-python",
        "java" => "text/x-java",
        "c" | "h" => "text/x-c",
        "cpp" | "cc" | "cxx" | "hpp" => "text/x-c++",
        "cs" => "text/x-csharp",
        "go" => "text/x-go",
        "rs" => "text/x-rust",
        "rb" => "text/x-ruby",
        "php" => "text/x-php",
        "swift" => "text/x-swift",
        "kt" => "text/x-kotlin",
        "scala" => "text/x-scala",
        "sh" | "bash" | "zsh" | "fish" => "text/x-shellscript",
        "sql" => "application/sql",
        "csv" => "text/csv",
        "tsv" => "text/tab-separated-values",
        _ => return None,
    })
}

pub struct FileFetcher;

#[async_trait]
impl Fetcher for FileFetcher {
    fn can_handle(&self, url: &str) -> bool {
        url.starts_with("file://")
    }

    async fn fetch(
        &self,
        url: &str,
        _options: &FetchOptions,
        cancel: &CancellationToken,
    ) -> Result<RawContent> {
        if cancel.is_cancelled() {
            return Err(Error::Cancellation);
        }
        let parsed = url::Url::parse(url)?;
        let path = parsed
            .to_file_path()
            .map_err(|()| Error::scraper(format!("invalid file URL: {url}")))?;

        let content = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::Cancellation),
            r = tokio::fs::read(&path) => r.map_err(Error::from)?,
        };

        let mime_type = if content.contains(&0u8) {
            "application/octet-stream".to_string()
        } else {
            path.extension()
                .and_then(|e| e.to_str())
                .and_then(mime_type_for_extension)
                .unwrap_or("application/octet-stream")
                .to_string()
        };

        Ok(RawContent {
            content,
            mime_type,
            charset: None,
            encoding: None,
            source: url.to_string(),
        })
    }
}
