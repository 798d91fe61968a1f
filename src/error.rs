//! The closed error taxonomy used across the crate.
//!
//! Every fallible operation in `docs_harness` returns [`Result<T>`], whose
//! error variants mirror the kinds enumerated in the design: a retryable
//! [`Error::Scraper`] for generic fetch/parse failures, a dedicated
//! [`Error::Redirect`] for disabled-redirect 3xx responses, a
//! [`Error::Cancellation`] that is never retried and never reported as a
//! job failure, a [`Error::Tool`] for invalid facade input, a
//! [`Error::Store`] for database/migration failures, and a
//! [`Error::VersionNotFound`] that callers translate into a structured
//! "no match" response rather than an exception.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// The closed error taxonomy (see module docs).
#[derive(Error, Debug)]
pub enum Error {
    /// A generic network or parse failure from a fetcher or pipeline.
    ///
    /// `retryable` records whether the fetcher's retry policy already
    /// considered (and exhausted, or deliberately skipped) retrying this
    /// request; it is informational for callers deciding whether to
    /// surface a "try again" affordance.
    #[error("scrape failed: {message}")]
    Scraper {
        /// Whether the fetcher's retry policy applies to this failure.
        retryable: bool,
        /// Human-readable cause.
        message: String,
        /// Underlying error, if any.
        #[source]
        cause: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A 3xx response encountered with `followRedirects = false`.
    #[error("redirect from {original_url} to {redirect_url} ({status_code})")]
    Redirect {
        /// The URL that was requested.
        original_url: String,
        /// The `Location` header value.
        redirect_url: String,
        /// The HTTP status code of the redirect.
        status_code: u16,
    },

    /// A cooperative cancellation. Never retried, never surfaced as a job
    /// failure — callers must match on this variant explicitly to resolve
    /// the caller-visible state as "cancelled" rather than "failed".
    #[error("operation cancelled")]
    Cancellation,

    /// Invalid input to a facade operation (the `SearchService` or a
    /// job-pipeline submission), as opposed to a failure performing it.
    #[error("invalid request: {0}")]
    Tool(String),

    /// A database or migration failure.
    #[error("store error: {0}")]
    Store(String),

    /// Version resolution failed to find a match for the requested range.
    #[error("no version of '{library}' matches '{requested}'")]
    VersionNotFound {
        /// The library that was queried.
        library: String,
        /// The version string (or range) the caller asked for.
        requested: String,
        /// Versions that do exist for this library, for display.
        available_versions: Vec<String>,
    },
}

impl Error {
    /// Construct a non-retryable [`Error::Scraper`] from a message.
    pub fn scraper(message: impl Into<String>) -> Self {
        Error::Scraper {
            retryable: false,
            message: message.into(),
            cause: None,
        }
    }

    /// Construct a retryable [`Error::Scraper`] from a message.
    pub fn retryable_scraper(message: impl Into<String>) -> Self {
        Error::Scraper {
            retryable: true,
            message: message.into(),
            cause: None,
        }
    }

    /// True for [`Error::Cancellation`]; used at job boundaries to avoid
    /// ever mapping a cancellation onto `status = FAILED`.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Cancellation)
    }
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        Error::Store(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Scraper {
            retryable: e.is_timeout() || e.is_connect() || e.status().is_none(),
            message: e.to_string(),
            cause: Some(Box::new(e)),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::scraper(e.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Error::Tool(format!("invalid URL: {e}"))
    }
}
