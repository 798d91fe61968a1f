//! `GitHubScraperStrategy`: walks a GitHub repository's tree via the REST
//! API rather than following hyperlinks (spec.md §4.3 "GitHub", §6).

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::{run_bfs, ItemProcessor, ProcessItemResult, ProgressCallback, QueueItem, Strategy};
use crate::error::{Error, Result};
use crate::fetcher::{file::mime_type_for_extension, FetchOptions, Fetcher, HttpFetcher};
use crate::models::{Document, ScrapeOptions};
use crate::pipeline::PipelineRegistry;

/// The exact text-file extension allow-list (spec.md §6), without the
/// leading dot.
const TEXT_EXTENSIONS: &[&str] = &[
    "md", "mdx", "txt", "rst", "adoc", "asciidoc", "html", "htm", "xml", "css", "scss", "sass",
    "less", "js", "jsx", "ts", "tsx", "py", "java", "c", "cpp", "cc", "cxx", "h", "hpp", "cs",
    "go", "rs", "rb", "php", "swift", "kt", "scala", "clj", "cljs", "hs", "elm", "dart", "r", "m",
    "mm", "sh", "bash", "zsh", "fish", "ps1", "bat", "cmd", "json", "yaml", "yml", "toml", "ini",
    "cfg", "conf", "properties", "env", "gitignore", "dockerignore", "gitattributes",
    "editorconfig", "gradle", "pom", "sbt", "maven", "cmake", "make", "dockerfile", "mod", "sum",
    "sql", "graphql", "gql", "proto", "thrift", "avro", "csv", "tsv", "log",
];

/// Extensionless basenames accepted regardless of extension (spec.md §6).
const EXTENSIONLESS_NAMES: &[&str] = &[
    "readme",
    "license",
    "changelog",
    "contributing",
    "authors",
    "maintainers",
    "code_of_conduct",
    "dockerfile",
    "makefile",
    "rakefile",
    "gemfile",
    "podfile",
    "cartfile",
    "brewfile",
    "procfile",
    "vagrantfile",
    "gulpfile",
    "gruntfile",
];

/// Dotfile roots accepted even with a suffix, e.g. `.prettierrc.js`
/// (spec.md §6).
const DOTFILE_ROOTS: &[&str] = &[".prettierrc", ".eslintrc", ".babelrc", ".nvmrc", ".npmrc"];

/// Decide whether a repository tree entry path should be walked, per the
/// extension allow-list, extensionless basenames, dotfile roots, and
/// compound triggers (`.env.`, ends `.env`, `.config.`, `.lock`) in
/// spec.md §6.
pub fn is_text_like_path(path: &str) -> bool {
    let basename = path.rsplit('/').next().unwrap_or(path);
    let lower = basename.to_ascii_lowercase();

    if lower.contains(".env.") || lower.ends_with(".env") || lower.contains(".config.") || lower.contains(".lock")
    {
        return true;
    }

    for root in DOTFILE_ROOTS {
        if lower == *root || lower.starts_with(&format!("{root}.")) {
            return true;
        }
    }

    let stem = basename.split('.').next().unwrap_or(basename).to_ascii_lowercase();
    if EXTENSIONLESS_NAMES.contains(&stem.as_str()) && !basename.contains('.') {
        return true;
    }
    if EXTENSIONLESS_NAMES.contains(&lower.as_str()) {
        return true;
    }

    if let Some(ext) = basename.rsplit('.').next() {
        if basename.contains('.') && TEXT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) {
            return true;
        }
    }
    false
}

/// True for `https://github.com/owner/repo[/tree/branch]`-shaped URLs.
pub fn is_github_repo_url(url: &str) -> bool {
    parse_owner_repo(url).is_some()
}

struct RepoRef {
    owner: String,
    repo: String,
    branch: Option<String>,
}

fn parse_owner_repo(url: &str) -> Option<RepoRef> {
    let parsed = url::Url::parse(url).ok()?;
    if parsed.host_str() != Some("github.com") {
        return None;
    }
    let segments: Vec<&str> = parsed.path_segments()?.filter(|s| !s.is_empty()).collect();
    if segments.len() < 2 {
        return None;
    }
    let owner = segments[0].to_string();
    let repo = segments[1].trim_end_matches(".git").to_string();
    let branch = if segments.len() >= 4 && segments[2] == "tree" {
        Some(segments[3].to_string())
    } else {
        None
    };
    Some(RepoRef { owner, repo, branch })
}

pub struct GitHubScraperStrategy {
    fetcher: HttpFetcher,
    pipelines: PipelineRegistry,
}

impl GitHubScraperStrategy {
    pub fn new() -> Self {
        Self {
            fetcher: HttpFetcher::new(),
            pipelines: PipelineRegistry::new(),
        }
    }

    async fn resolve_branch(&self, repo: &RepoRef, cancel: &CancellationToken) -> String {
        if let Some(b) = &repo.branch {
            return b.clone();
        }
        let api_url = format!("https://api.github.com/repos/{}/{}", repo.owner, repo.repo);
        let opts = FetchOptions {
            follow_redirects: true,
            headers: vec![("Accept".into(), "application/vnd.github+json".into())],
            timeout: None,
        };
        match self.fetcher.fetch(&api_url, &opts, cancel).await {
            Ok(raw) => serde_json::from_slice::<serde_json::Value>(&raw.content)
                .ok()
                .and_then(|v| v.get("default_branch").and_then(|b| b.as_str().map(str::to_string)))
                .unwrap_or_else(|| "main".to_string()),
            Err(_) => "main".to_string(),
        }
    }

    async fn fetch_tree(
        &self,
        repo: &RepoRef,
        branch: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        let tree_url = format!(
            "https://api.github.com/repos/{}/{}/git/trees/{}?recursive=1",
            repo.owner, repo.repo, branch
        );
        let opts = FetchOptions {
            follow_redirects: true,
            headers: vec![("Accept".into(), "application/vnd.github+json".into())],
            timeout: None,
        };
        let raw = self.fetcher.fetch(&tree_url, &opts, cancel).await?;
        let json: serde_json::Value = serde_json::from_slice(&raw.content)
            .map_err(|e| Error::scraper(format!("invalid GitHub tree response: {e}")))?;
        let entries = json
            .get("tree")
            .and_then(|t| t.as_array())
            .cloned()
            .unwrap_or_default();

        Ok(entries
            .into_iter()
            .filter(|e| e.get("type").and_then(|t| t.as_str()) == Some("blob"))
            .filter_map(|e| e.get("path").and_then(|p| p.as_str()).map(str::to_string))
            .filter(|p| is_text_like_path(p))
            .collect())
    }
}

impl Default for GitHubScraperStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ItemProcessor for GitHubScraperStrategy {
    async fn process_item(
        &self,
        item: &QueueItem,
        options: &ScrapeOptions,
        cancel: &CancellationToken,
    ) -> Result<ProcessItemResult> {
        if let Some(path) = item.url.strip_prefix("github-file://") {
            let repo = parse_owner_repo(&options.url)
                .ok_or_else(|| Error::Tool(format!("not a GitHub repo URL: {}", options.url)))?;
            let branch = self.resolve_branch(&repo, cancel).await;
            let raw_url = format!(
                "https://raw.githubusercontent.com/{}/{}/{}/{}",
                repo.owner, repo.repo, branch, path
            );
            let fetch_opts = FetchOptions {
                follow_redirects: true,
                headers: vec![],
                timeout: None,
            };
            let mut raw = self.fetcher.fetch(&raw_url, &fetch_opts, cancel).await?;
            if raw.mime_type == "text/plain" || raw.mime_type == "application/octet-stream" {
                if let Some(ext) = path.rsplit('.').next() {
                    if let Some(mime) = mime_type_for_extension(ext) {
                        raw.mime_type = mime.to_string();
                    }
                }
            }

            let Some(pipeline) = self.pipelines.select(&raw) else {
                return Ok(ProcessItemResult::default());
            };
            let processed = pipeline.process(&raw, options, &self.fetcher)?;
            let basename = path.rsplit('/').next().unwrap_or(path);
            let title = processed.metadata.title.clone().unwrap_or_else(|| basename.to_string());

            let document = Document {
                id: 0,
                library_id: 0,
                version_id: 0,
                url: format!(
                    "https://github.com/{}/{}/blob/{}/{}",
                    repo.owner, repo.repo, branch, path
                ),
                content: processed.text_content,
                metadata: json!({
                    "url": format!("https://github.com/{}/{}/blob/{}/{}", repo.owner, repo.repo, branch, path),
                    "title": title,
                    "library": options.library,
                    "version": options.version,
                }),
                sort_order: 0,
            };

            return Ok(ProcessItemResult {
                document: Some(document),
                links: vec![],
                final_url: Some(item.url.clone()),
            });
        }

        let repo = parse_owner_repo(&item.url)
            .ok_or_else(|| Error::Tool(format!("not a GitHub repo URL: {}", item.url)))?;
        let branch = self.resolve_branch(&repo, cancel).await;
        let paths = self.fetch_tree(&repo, &branch, cancel).await?;
        let links = paths.into_iter().map(|p| format!("github-file://{p}")).collect();

        Ok(ProcessItemResult {
            document: None,
            links,
            final_url: Some(item.url.clone()),
        })
    }

    fn bypasses_scope(&self, url: &str) -> bool {
        url.starts_with("github-file://")
    }
}

#[async_trait]
impl Strategy for GitHubScraperStrategy {
    fn can_handle(&self, url: &str) -> bool {
        is_github_repo_url(url)
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s4_filters_tree_entries_to_text_like_blobs() {
        let candidates = [
            "README.md",
            ".dockerignore",
            "src/main.js",
            "image.png",
            "package.json",
        ];
        let accepted: Vec<&str> = candidates.into_iter().filter(|p| is_text_like_path(p)).collect();
        assert_eq!(
            accepted,
            vec!["README.md", ".dockerignore", "src/main.js", "package.json"]
        );
    }

    #[test]
    fn recognizes_extensionless_allow_listed_names() {
        assert!(is_text_like_path("Dockerfile"));
        assert!(is_text_like_path("LICENSE"));
        assert!(is_text_like_path("Makefile"));
    }

    #[test]
    fn recognizes_dotfile_roots_with_suffix() {
        assert!(is_text_like_path(".prettierrc.js"));
        assert!(is_text_like_path(".eslintrc"));
    }

    #[test]
    fn recognizes_compound_triggers() {
        assert!(is_text_like_path(".env.production"));
        assert!(is_text_like_path("app.env"));
        assert!(is_text_like_path("webpack.config.js"));
        assert!(is_text_like_path("package-lock.json"));
    }

    #[test]
    fn rejects_binary_assets() {
        assert!(!is_text_like_path("image.png"));
        assert!(!is_text_like_path("logo.svg".replace("svg", "ico").as_str()));
    }

    #[test]
    fn parses_owner_repo_and_branch() {
        let r = parse_owner_repo("https://github.com/owner/repo").unwrap();
        assert_eq!(r.owner, "owner");
        assert_eq!(r.repo, "repo");
        assert!(r.branch.is_none());

        let r2 = parse_owner_repo("https://github.com/owner/repo/tree/develop").unwrap();
        assert_eq!(r2.branch.as_deref(), Some("develop"));
    }

    #[test]
    fn is_github_repo_url_excludes_other_hosts() {
        assert!(!is_github_repo_url("https://example.com/owner/repo"));
    }
}
