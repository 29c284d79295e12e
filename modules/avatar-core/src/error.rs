//! Typed errors for each stage of the discovery pipeline.
//!
//! None of these reach the caller of `discover_avatar`; every stage logs its
//! error and degrades to an absent or negative value.

use thiserror::Error;

/// Reasons a URL is refused before any request is made to it.
#[derive(Debug, Error)]
pub enum SecurityError {
    /// URL scheme not allowed (e.g., file://, ftp://)
    #[error("disallowed URL scheme: {0}")]
    DisallowedScheme(String),

    /// IP in blocked CIDR range (e.g., 10.0.0.0/8)
    #[error("blocked IP range: {0}")]
    BlockedCidr(String),

    /// URL has no host
    #[error("URL has no host")]
    NoHost,

    /// DNS resolution failed or returned nothing
    #[error("DNS resolution failed: {0}")]
    DnsResolution(String),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

/// Failures while downloading a page or image.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream returned status {0}")]
    Status(u16),

    #[error("declared size {declared} exceeds limit {limit}")]
    DeclaredTooLarge { declared: u64, limit: usize },

    #[error("body exceeded limit {limit} after {read} bytes")]
    BodyTooLarge { read: usize, limit: usize },

    #[error("redirected off the validated host to {0}")]
    RedirectBlocked(String),
}

/// The verification endpoint replied with something other than the
/// expected verdict object.
#[derive(Debug, Error)]
pub enum VerdictError {
    #[error("verdict is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("verdict is not a JSON object")]
    NotAnObject,

    #[error("confidence {0} outside [0, 1]")]
    ConfidenceOutOfRange(f64),
}

/// Result type alias for security operations.
pub type SecurityResult<T> = std::result::Result<T, SecurityError>;

/// Result type alias for fetch operations.
pub type FetchResult<T> = std::result::Result<T, FetchError>;
