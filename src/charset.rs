//! Charset resolution and decoding (spec.md §4.2 "Charset resolution").
//!
//! Resolution order is deterministic, not statistical: HTML `<meta
//! charset>` wins, then the HTTP charset, then UTF-8. `chardetng` is a
//! documented extension point only — wiring it into the default path would
//! make decoding depend on document content, which the priority order
//! explicitly rules out.

use encoding_rs::Encoding;
use once_cell_lite::OnceRegex;

mod once_cell_lite {
    use std::sync::OnceLock;

    /// A tiny lazily-compiled regex holder, avoiding a `once_cell`
    /// dependency for the handful of statics this module needs.
    pub struct OnceRegex(OnceLock<regex::Regex>, &'static str);

    impl OnceRegex {
        pub const fn new(pattern: &'static str) -> Self {
            Self(OnceLock::new(), pattern)
        }

        pub fn get(&self) -> &regex::Regex {
            self.0
                .get_or_init(|| regex::Regex::new(self.1).expect("static regex is valid"))
        }
    }
}

static META_CHARSET: OnceRegex =
    OnceRegex::new(r#"(?i)<meta\s+charset\s*=\s*["']?([a-zA-Z0-9_\-]+)"#);
static META_HTTP_EQUIV: OnceRegex = OnceRegex::new(
    r#"(?i)<meta\s+http-equiv\s*=\s*["']content-type["']\s+content\s*=\s*["'][^"']*charset=([a-zA-Z0-9_\-]+)"#,
);

/// Normalize common charset aliases to the canonical name `encoding_rs`
/// expects (spec.md §4.2: `iso-8859-1 → latin1`, `windows-1252 → cp1252`,
/// `utf8 → utf-8`, `us-ascii → ascii`, ...).
pub fn canonicalize_alias(label: &str) -> String {
    let lower = label.trim().to_ascii_lowercase();
    match lower.as_str() {
        "iso-8859-1" | "iso8859-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        "utf8" => "utf-8".to_string(),
        "us-ascii" | "ascii" => "us-ascii".to_string(),
        other => other.to_string(),
    }
}

/// Scan the first 1024 bytes of an HTML document (decoded best-effort as
/// UTF-8) for a declared charset.
fn scan_html_meta_charset(head: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(&head[..head.len().min(1024)]);
    if let Some(caps) = META_CHARSET.get().captures(&text) {
        return Some(canonicalize_alias(&caps[1]));
    }
    if let Some(caps) = META_HTTP_EQUIV.get().captures(&text) {
        return Some(canonicalize_alias(&caps[1]));
    }
    None
}

/// Resolve the charset to use for a fetched body, per the fixed priority
/// order in spec.md §4.2.
pub fn resolve_charset(bytes: &[u8], mime_type: &str, http_charset: Option<&str>) -> String {
    if mime_type.eq_ignore_ascii_case("text/html") || mime_type.contains("html") {
        if let Some(c) = scan_html_meta_charset(bytes) {
            return c;
        }
    }
    if let Some(c) = http_charset {
        return canonicalize_alias(c);
    }
    "utf-8".to_string()
}

/// Decode `bytes` using `charset_label`, falling back to UTF-8 then
/// latin-1 on failure. Never errors.
pub fn decode(bytes: &[u8], charset_label: &str) -> String {
    if let Some(encoding) = Encoding::for_label(charset_label.as_bytes()) {
        let (text, _, had_errors) = encoding.decode(bytes);
        if !had_errors {
            return text.into_owned();
        }
    }
    if let Ok(s) = String::from_utf8(bytes.to_vec()) {
        return s;
    }
    let (text, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
    text.into_owned()
}
