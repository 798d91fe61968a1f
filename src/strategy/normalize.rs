//! Deterministic URL normalization for crawl deduplication (spec.md §4.3).

use url::Url;

/// Individual normalization rules, each independently toggleable (spec.md
/// §4.3: "Options flip each rule individually").
#[derive(Debug, Clone, Copy)]
pub struct NormalizeOptions {
    pub lowercase: bool,
    pub strip_fragment: bool,
    pub strip_trailing_slash: bool,
    pub strip_index_files: bool,
    pub strip_query: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            lowercase: true,
            strip_fragment: true,
            strip_trailing_slash: true,
            strip_index_files: true,
            strip_query: false,
        }
    }
}

const INDEX_FILES: &[&str] = &["index.html", "index.htm", "index.asp", "index.php", "index.jsp"];

/// Normalize `raw` per `opts`. Parse failures return the input unchanged
/// (the caller is expected to have already validated the URL parses).
pub fn normalize(raw: &str, opts: NormalizeOptions) -> String {
    let Ok(mut url) = Url::parse(raw) else {
        return raw.to_string();
    };

    if opts.strip_fragment {
        url.set_fragment(None);
    }
    if opts.strip_query {
        url.set_query(None);
    }

    if opts.strip_index_files {
        let path = url.path().to_string();
        if let Some(pos) = path.rfind('/') {
            let (dir, last) = path.split_at(pos + 1);
            if INDEX_FILES.iter().any(|f| f.eq_ignore_ascii_case(last)) {
                url.set_path(dir);
            }
        }
    }

    if opts.strip_trailing_slash {
        let path = url.path().to_string();
        if path.len() > 1 && path.ends_with('/') {
            url.set_path(path.trim_end_matches('/'));
        }
    }

    let mut s = url.to_string();
    if opts.lowercase {
        s = s.to_ascii_lowercase();
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idempotent_for_arbitrary_urls() {
        let opts = NormalizeOptions::default();
        for raw in [
            "HTTPS://Example.com/Foo/Index.html#section",
            "https://example.com/foo/",
            "https://example.com/foo?x=1",
            "https://example.com",
        ] {
            let once = normalize(raw, opts);
            let twice = normalize(&once, opts);
            assert_eq!(once, twice, "not idempotent for {raw}");
        }
    }

    #[test]
    fn strips_fragment_and_lowercases() {
        let n = normalize("HTTPS://Example.com/Path#frag", NormalizeOptions::default());
        assert_eq!(n, "https://example.com/path");
    }

    #[test]
    fn strips_index_file_from_directory() {
        let n = normalize(
            "https://example.com/docs/index.html",
            NormalizeOptions::default(),
        );
        assert_eq!(n, "https://example.com/docs");
    }

    #[test]
    fn preserves_query_by_default() {
        let n = normalize(
            "https://example.com/page?view=1",
            NormalizeOptions::default(),
        );
        assert_eq!(n, "https://example.com/page?view=1");
    }

    #[test]
    fn strip_query_opts_out() {
        let mut opts = NormalizeOptions::default();
        opts.strip_query = true;
        let n = normalize("https://example.com/page?view=1", opts);
        assert_eq!(n, "https://example.com/page");
    }

    #[test]
    fn removes_trailing_slash() {
        let n = normalize("https://example.com/docs/", NormalizeOptions::default());
        assert_eq!(n, "https://example.com/docs");
    }
}
