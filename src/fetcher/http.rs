//! `HttpFetcher`: GET over `reqwest` with retry/backoff, manual redirect
//! handling (so a disabled-redirect 3xx can be reported precisely), and
//! `Content-Type`/`Content-Encoding` parsing (spec.md §4.1).

use async_trait::async_trait;
use backoff::{backoff::Backoff, ExponentialBackoff};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::str::FromStr;
use std::time::Duration;

use super::{FetchOptions, Fetcher};
use crate::error::{Error, Result};
use crate::models::RawContent;

const RETRYABLE_STATUSES: &[u16] = &[408, 429, 500, 502, 503, 504, 525];
const MAX_REDIRECTS: u8 = 5;
const DEFAULT_MAX_RETRIES: u32 = 6;
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(250);

pub struct HttpFetcher {
    client: reqwest::Client,
    max_retries: u32,
    base_delay: Duration,
}

impl HttpFetcher {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .user_agent(
                "Mozilla/5.0 (compatible; docs-harness/0.1; +https://github.com/parallax-labs/docs-harness)",
            )
            .build()
            .expect("reqwest client builds with static config");
        Self {
            client,
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }

    fn build_headers(options: &FetchOptions) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert("Accept", HeaderValue::from_static("*/*"));
        headers.insert(
            "Accept-Language",
            HeaderValue::from_static("en-US,en;q=0.9"),
        );
        // user-supplied headers override the defaults above.
        for (k, v) in &options.headers {
            let name = HeaderName::from_str(k)
                .map_err(|e| Error::Tool(format!("invalid header name '{k}': {e}")))?;
            let value = HeaderValue::from_str(v)
                .map_err(|e| Error::Tool(format!("invalid header value for '{k}': {e}")))?;
            headers.insert(name, value);
        }
        Ok(headers)
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    fn can_handle(&self, url: &str) -> bool {
        url.starts_with("http://") || url.starts_with("https://")
    }

    async fn fetch(
        &self,
        url: &str,
        options: &FetchOptions,
        cancel: &tokio_util::sync::CancellationToken,
    ) -> Result<RawContent> {
        let headers = Self::build_headers(options)?;
        let mut current = url.to_string();
        let mut hops = 0u8;

        loop {
            let mut backoff = ExponentialBackoff {
                initial_interval: self.base_delay,
                multiplier: 2.0,
                max_elapsed_time: None,
                ..ExponentialBackoff::default()
            };
            let mut attempt = 0u32;

            let response = loop {
                let mut req = self.client.get(&current).headers(headers.clone());
                if let Some(timeout) = options.timeout {
                    req = req.timeout(timeout);
                }

                let result = tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Err(Error::Cancellation),
                    r = req.send() => r,
                };

                match result {
                    Ok(resp) => {
                        let status = resp.status().as_u16();
                        if RETRYABLE_STATUSES.contains(&status) && attempt < self.max_retries {
                            attempt += 1;
                            let delay = backoff.next_backoff().unwrap_or(self.base_delay);
                            tokio::select! {
                                biased;
                                () = cancel.cancelled() => return Err(Error::Cancellation),
                                () = tokio::time::sleep(delay) => {}
                            }
                            continue;
                        }
                        break resp;
                    }
                    Err(e) => {
                        if attempt < self.max_retries {
                            attempt += 1;
                            let delay = backoff.next_backoff().unwrap_or(self.base_delay);
                            tokio::select! {
                                biased;
                                () = cancel.cancelled() => return Err(Error::Cancellation),
                                () = tokio::time::sleep(delay) => {}
                            }
                            continue;
                        }
                        return Err(e.into());
                    }
                }
            };

            let status = response.status();
            if status.is_redirection() {
                let location = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);

                let Some(location) = location else {
                    return Err(Error::scraper(format!(
                        "redirect status {status} without Location header"
                    )));
                };
                let next = url::Url::parse(&current)
                    .and_then(|base| base.join(&location))
                    .map(|u| u.to_string())
                    .unwrap_or(location);

                if !options.follow_redirects {
                    return Err(Error::Redirect {
                        original_url: current,
                        redirect_url: next,
                        status_code: status.as_u16(),
                    });
                }
                hops += 1;
                if hops > MAX_REDIRECTS {
                    return Err(Error::scraper(format!(
                        "exceeded {MAX_REDIRECTS} redirect hops starting from {url}"
                    )));
                }
                current = next;
                continue;
            }

            if !status.is_success() {
                return Err(Error::Scraper {
                    retryable: false,
                    message: format!("HTTP {status} fetching {current}"),
                    cause: None,
                });
            }

            let mime_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(parse_mime)
                .unwrap_or_else(|| ("application/octet-stream".to_string(), None));
            let encoding = response
                .headers()
                .get(reqwest::header::CONTENT_ENCODING)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let final_url = response.url().to_string();

            let bytes = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(Error::Cancellation),
                b = response.bytes() => b.map_err(Error::from)?,
            };

            return Ok(RawContent {
                content: bytes.to_vec(),
                mime_type: mime_type.0,
                charset: mime_type.1,
                encoding,
                source: final_url,
            });
        }
    }
}

/// Parse a `Content-Type` header value into `(mimeType, charset)`.
fn parse_mime(value: &str) -> (String, Option<String>) {
    let mut parts = value.split(';');
    let mime = parts.next().unwrap_or_default().trim().to_string();
    let charset = parts.find_map(|p| {
        let p = p.trim();
        p.strip_prefix("charset=")
            .map(|c| c.trim_matches('"').to_string())
    });
    (mime, charset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mime_and_charset() {
        let (mime, charset) = parse_mime("text/html; charset=UTF-8");
        assert_eq!(mime, "text/html");
        assert_eq!(charset.as_deref(), Some("UTF-8"));
    }

    #[test]
    fn parses_mime_without_charset() {
        let (mime, charset) = parse_mime("application/json");
        assert_eq!(mime, "application/json");
        assert_eq!(charset, None);
    }

    #[test]
    fn can_handle_only_http_https() {
        let f = HttpFetcher::new();
        assert!(f.can_handle("https://example.com"));
        assert!(f.can_handle("http://example.com"));
        assert!(!f.can_handle("file:///tmp/x"));
    }
}
