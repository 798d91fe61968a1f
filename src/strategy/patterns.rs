//! Include/exclude pattern filtering (spec.md §4.3 "Pattern filter").
//!
//! Each pattern is a glob (`*` matches any run of non-`/`, `**` matches
//! any number of path segments) unless wrapped in `/…/`, in which case it
//! is a regex. Compilation happens once per strategy run via
//! [`CompiledPatterns::compile`].

use globset::{Glob, GlobMatcher};
use regex::Regex;

use crate::error::{Error, Result};

enum CompiledPattern {
    Glob(GlobMatcher),
    Regex(Regex),
}

impl CompiledPattern {
    fn is_match(&self, s: &str) -> bool {
        match self {
            CompiledPattern::Glob(g) => g.is_match(s),
            CompiledPattern::Regex(r) => r.is_match(s),
        }
    }
}

fn compile_one(pattern: &str) -> Result<CompiledPattern> {
    if pattern.len() >= 2 && pattern.starts_with('/') && pattern.ends_with('/') {
        let inner = &pattern[1..pattern.len() - 1];
        let re = Regex::new(inner)
            .map_err(|e| Error::Tool(format!("invalid regex pattern '{pattern}': {e}")))?;
        Ok(CompiledPattern::Regex(re))
    } else {
        let glob = Glob::new(pattern)
            .map_err(|e| Error::Tool(format!("invalid glob pattern '{pattern}': {e}")))?;
        Ok(CompiledPattern::Glob(glob.compile_matcher()))
    }
}

/// A compiled include/exclude pattern list, built once per strategy run.
pub struct CompiledPatterns {
    include: Vec<CompiledPattern>,
    exclude: Vec<CompiledPattern>,
}

impl CompiledPatterns {
    pub fn compile(include: &[String], exclude: &[String]) -> Result<Self> {
        Ok(Self {
            include: include
                .iter()
                .map(|p| compile_one(p))
                .collect::<Result<_>>()?,
            exclude: exclude
                .iter()
                .map(|p| compile_one(p))
                .collect::<Result<_>>()?,
        })
    }

    /// Exclude wins over include. An empty include list matches everything
    /// not excluded.
    pub fn matches(&self, candidates: &[&str]) -> bool {
        if candidates
            .iter()
            .any(|c| self.exclude.iter().any(|p| p.is_match(c)))
        {
            return false;
        }
        if self.include.is_empty() {
            return true;
        }
        candidates
            .iter()
            .any(|c| self.include.iter().any(|p| p.is_match(c)))
    }
}

/// The built-in exclude defaults applied when a caller passes no exclude
/// list at all (spec.md §6 "Default exclude patterns"). An explicit empty
/// `Vec` from the caller disables these.
pub fn default_exclude_patterns() -> Vec<String> {
    vec![
        "**/CHANGELOG*".to_string(),
        "**/LICENSE*".to_string(),
        "**/CODE_OF_CONDUCT*".to_string(),
        "**/*.test.*".to_string(),
        "**/*.spec.*".to_string(),
        "**/*_test.py".to_string(),
        "**/*_test.go".to_string(),
        "**/*.lock".to_string(),
        "**/*.min.js".to_string(),
        "**/*.min.css".to_string(),
        "**/.DS_Store".to_string(),
        "**/Thumbs.db".to_string(),
        "**/.vscode/**".to_string(),
        "**/.idea/**".to_string(),
        "**/archive/**".to_string(),
        "**/archived/**".to_string(),
        "**/deprecated/**".to_string(),
        "**/legacy/**".to_string(),
        "**/old/**".to_string(),
        "**/outdated/**".to_string(),
        "**/previous/**".to_string(),
        "**/superseded/**".to_string(),
        "**/dist/**".to_string(),
        "**/build/**".to_string(),
        "**/out/**".to_string(),
        "**/target/**".to_string(),
        "**/.next/**".to_string(),
        "**/.nuxt/**".to_string(),
        "/i18n/[!e][!n]*/**".to_string(),
        "**/zh-cn/**".to_string(),
        "**/zh-tw/**".to_string(),
        "**/zh-hk/**".to_string(),
        "**/zh-mo/**".to_string(),
        "**/zh-sg/**".to_string(),
    ]
}

/// Build the `(path?query, basename)`-style candidate strings spec.md
/// §4.3 says to match patterns against, for an HTTP(S) URL.
pub fn http_candidates(url: &url::Url) -> Vec<String> {
    let mut s = url.path().to_string();
    if let Some(q) = url.query() {
        s.push('?');
        s.push_str(q);
    }
    vec![s]
}

/// Candidates for a `file://` URL: the full path and the basename.
pub fn file_candidates(path: &str) -> Vec<String> {
    let basename = path.rsplit('/').next().unwrap_or(path).to_string();
    vec![path.to_string(), basename]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_star_matches_single_segment() {
        let p = CompiledPatterns::compile(&["/docs/*.md".to_string()], &[]).unwrap();
        assert!(p.matches(&["/docs/intro.md"]));
        assert!(!p.matches(&["/docs/sub/intro.md"]));
    }

    #[test]
    fn glob_double_star_matches_any_depth() {
        let p = CompiledPatterns::compile(&["/docs/**/*.md".to_string()], &[]).unwrap();
        assert!(p.matches(&["/docs/a/b/intro.md"]));
    }

    #[test]
    fn regex_wrapped_pattern_is_used_as_regex() {
        let p = CompiledPatterns::compile(&["/^/blog/\\d+$/".to_string()], &[]).unwrap();
        assert!(p.matches(&["/blog/42"]));
        assert!(!p.matches(&["/blog/forty-two"]));
    }

    #[test]
    fn exclude_wins_over_include() {
        let p = CompiledPatterns::compile(
            &["**/*.md".to_string()],
            &["**/CHANGELOG.md".to_string()],
        )
        .unwrap();
        assert!(p.matches(&["/docs/intro.md"]));
        assert!(!p.matches(&["/docs/CHANGELOG.md"]));
    }

    #[test]
    fn pure_function_of_inputs() {
        let p1 = CompiledPatterns::compile(&["*.md".to_string()], &[]).unwrap();
        let p2 = CompiledPatterns::compile(&["*.md".to_string()], &[]).unwrap();
        assert_eq!(p1.matches(&["a.md"]), p2.matches(&["a.md"]));
    }

    #[test]
    fn file_candidates_includes_basename() {
        let c = file_candidates("/repo/CHANGELOG.md");
        assert_eq!(c, vec!["/repo/CHANGELOG.md", "CHANGELOG.md"]);
    }
}
