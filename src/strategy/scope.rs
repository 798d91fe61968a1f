//! Scope rules deciding whether a discovered URL may be followed
//! (spec.md §4.3 "Scopes").

use crate::models::Scope;
use url::Url;

/// Non-exhaustive list of multi-label public suffixes that need
/// special-cased registrable-domain handling. There is no
/// `publicsuffix`/`psl` crate in this project's dependency stack; this
/// list covers the cases spec.md calls out explicitly (`co.uk`,
/// `github.io`) plus a handful of other common ones. A URL under an
/// unlisted multi-label TLD falls back to the plain two-label heuristic.
const KNOWN_MULTI_LABEL_SUFFIXES: &[&str] = &[
    "co.uk", "org.uk", "ac.uk", "gov.uk", "co.jp", "co.nz", "com.au", "github.io",
    "gitlab.io", "netlify.app", "vercel.app", "pages.dev", "herokuapp.com",
];

/// The registrable domain of a hostname: the public suffix plus one
/// label, e.g. `docs.example.com` → `example.com`, `foo.github.io` →
/// `foo.github.io` (each user/org subdomain of `github.io` is its own
/// registrable domain, per spec.md §4.3).
pub fn registrable_domain(host: &str) -> String {
    let host = host.trim_end_matches('.');
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() <= 2 {
        return host.to_string();
    }

    for suffix in KNOWN_MULTI_LABEL_SUFFIXES {
        if host == *suffix {
            return host.to_string();
        }
        if let Some(stripped) = host.strip_suffix(&format!(".{suffix}")) {
            // One more label than the suffix itself.
            let extra = stripped.rsplit('.').next().unwrap_or(stripped);
            return format!("{extra}.{suffix}");
        }
    }

    labels[labels.len() - 2..].join(".")
}

fn same_host_port(a: &Url, b: &Url) -> bool {
    if a.scheme() != b.scheme() {
        return false;
    }
    a.host_str() == b.host_str() && a.port_or_known_default() == b.port_or_known_default()
}

/// Directory derivation for `subpages` scope (spec.md §4.3): if the
/// pathname ends in `/`, use as-is; else if the last segment contains a
/// `.`, use its parent directory; else append `/`.
fn base_directory(url: &Url) -> String {
    let path = url.path();
    if path.ends_with('/') {
        return path.to_string();
    }
    if let Some(pos) = path.rfind('/') {
        let last = &path[pos + 1..];
        if last.contains('.') {
            return path[..pos + 1].to_string();
        }
    }
    format!("{path}/")
}

/// Decide whether `target`, discovered while crawling `base`, is in scope.
/// Cross-protocol (http vs https) is always out of scope (spec.md §4.3).
pub fn in_scope(base: &Url, target: &Url, scope: Scope) -> bool {
    if base.scheme() != target.scheme() {
        return false;
    }
    match scope {
        Scope::Hostname => same_host_port(base, target),
        Scope::Domain => {
            let (Some(bh), Some(th)) = (base.host_str(), target.host_str()) else {
                return false;
            };
            registrable_domain(bh) == registrable_domain(th)
        }
        Scope::Subpages => {
            if !same_host_port(base, target) {
                return false;
            }
            let dir = base_directory(base);
            target.path().starts_with(&dir)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn default_port_scope_equivalence() {
        let a = u("https://example.com");
        let b = u("https://example.com:443");
        assert!(same_host_port(&a, &b));
    }

    #[test]
    fn cross_protocol_never_in_scope() {
        let base = u("http://example.com/a/");
        let target = u("https://example.com/a/b");
        assert!(!in_scope(&base, &target, Scope::Domain));
        assert!(!in_scope(&base, &target, Scope::Hostname));
        assert!(!in_scope(&base, &target, Scope::Subpages));
    }

    #[test]
    fn s2_subpages_scope() {
        let base = u("https://example.com/api/index.html");
        let in1 = u("https://example.com/api/aiq/agent/index.html");
        let out1 = u("https://example.com/shared/index.html");
        assert!(in_scope(&base, &in1, Scope::Subpages));
        assert!(!in_scope(&base, &out1, Scope::Subpages));
    }

    #[test]
    fn s3_domain_scope_across_subdomains() {
        let base = u("https://docs.example.com/guide/");
        let same = u("https://api.example.com/endpoint");
        let other = u("https://other.org/");
        assert!(in_scope(&base, &same, Scope::Domain));
        assert!(!in_scope(&base, &other, Scope::Domain));
    }

    #[test]
    fn registrable_domain_handles_known_multi_label_suffixes() {
        assert_eq!(registrable_domain("docs.example.co.uk"), "example.co.uk");
        assert_eq!(registrable_domain("alice.github.io"), "alice.github.io");
        assert_eq!(registrable_domain("bob.github.io"), "bob.github.io");
        assert_ne!(registrable_domain("alice.github.io"), registrable_domain("bob.github.io"));
        assert_eq!(registrable_domain("example.com"), "example.com");
    }

    #[test]
    fn hostname_scope_is_exact() {
        let base = u("https://docs.example.com/a");
        let same = u("https://docs.example.com/b");
        let sub = u("https://api.example.com/c");
        assert!(in_scope(&base, &same, Scope::Hostname));
        assert!(!in_scope(&base, &sub, Scope::Hostname));
    }
}
