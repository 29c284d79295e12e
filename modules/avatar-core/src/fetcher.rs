//! Size- and time-bounded downloads from validated targets.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::redirect::Policy;
use tracing::{debug, warn};

use crate::error::{FetchError, FetchResult};
use crate::security::SafeTarget;

pub const DEFAULT_MAX_BYTES: usize = 5 * 1024 * 1024;
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

const MAX_REDIRECTS: usize = 5;

/// Downloads one image. Any failure is an absent result.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, target: &SafeTarget) -> Option<Bytes>;
}

/// A response body that can be read a chunk at a time, with whatever length
/// the server declared up front.
#[async_trait]
pub(crate) trait BodySource: Send {
    fn declared_len(&self) -> Option<u64>;
    async fn next_chunk(&mut self) -> FetchResult<Option<Bytes>>;
}

#[async_trait]
impl BodySource for reqwest::Response {
    fn declared_len(&self) -> Option<u64> {
        self.content_length()
    }

    async fn next_chunk(&mut self) -> FetchResult<Option<Bytes>> {
        Ok(self.chunk().await?)
    }
}

/// Read a body into memory, refusing anything larger than `limit`.
///
/// The declared length is checked before the first chunk is pulled. The
/// running total is checked after every chunk, so a missing or lying
/// `Content-Length` costs at most one chunk past the limit.
pub(crate) async fn read_capped<B: BodySource>(body: &mut B, limit: usize) -> FetchResult<Bytes> {
    if let Some(declared) = body.declared_len() {
        if declared > limit as u64 {
            return Err(FetchError::DeclaredTooLarge { declared, limit });
        }
    }

    let mut buf = BytesMut::new();
    while let Some(chunk) = body.next_chunk().await? {
        buf.extend_from_slice(&chunk);
        if buf.len() > limit {
            return Err(FetchError::BodyTooLarge {
                read: buf.len(),
                limit,
            });
        }
    }
    Ok(buf.freeze())
}

/// Build a client that connects only to the address the target was
/// validated against.
///
/// Redirects are followed while they stay on the same host, which keeps the
/// pinned address valid; anything else stops and surfaces as
/// [`FetchError::RedirectBlocked`]. System proxies are ignored, since a
/// proxy would resolve the name again.
pub(crate) fn pinned_client(
    target: &SafeTarget,
    timeout: Duration,
    user_agent: &str,
) -> reqwest::Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(user_agent)
        .no_proxy()
        .redirect(same_host_redirects());

    if let Some(domain) = target.url().domain() {
        // Port 0: use the port from the URL (or the scheme default).
        builder = builder.resolve(domain, SocketAddr::new(target.addr().ip(), 0));
    }

    builder.build()
}

fn same_host_redirects() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() > MAX_REDIRECTS {
            return attempt.error("too many redirects");
        }
        let same_host = {
            let origin = attempt.previous().first().and_then(|u| u.host_str());
            let next = attempt.url();
            matches!(next.scheme(), "http" | "https") && next.host_str() == origin
        };
        if same_host {
            attempt.follow()
        } else {
            attempt.stop()
        }
    })
}

/// GET a validated target and return its body, bounded by `limit`.
pub(crate) async fn get_bounded(
    target: &SafeTarget,
    limit: usize,
    timeout: Duration,
    user_agent: &str,
) -> FetchResult<Bytes> {
    let client = pinned_client(target, timeout, user_agent)?;
    let mut response = client.get(target.url().clone()).send().await?;

    let status = response.status();
    if status.is_redirection() {
        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        return Err(FetchError::RedirectBlocked(location));
    }
    if !status.is_success() {
        return Err(FetchError::Status(status.as_u16()));
    }

    read_capped(&mut response, limit).await
}

/// Downloads image bytes under a hard size and time ceiling.
#[derive(Debug, Clone)]
pub struct BoundedFetcher {
    max_bytes: usize,
    timeout: Duration,
    user_agent: String,
}

impl Default for BoundedFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BYTES, DEFAULT_FETCH_TIMEOUT)
    }
}

impl BoundedFetcher {
    pub fn new(max_bytes: usize, timeout: Duration) -> Self {
        Self {
            max_bytes,
            timeout,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Fetch with the failure reason intact.
    pub async fn try_fetch(&self, target: &SafeTarget) -> FetchResult<Bytes> {
        get_bounded(target, self.max_bytes, self.timeout, &self.user_agent).await
    }
}

#[async_trait]
impl ImageFetcher for BoundedFetcher {
    async fn fetch(&self, target: &SafeTarget) -> Option<Bytes> {
        match self.try_fetch(target).await {
            Ok(bytes) => {
                debug!(url = target.as_str(), bytes = bytes.len(), "Fetched image");
                Some(bytes)
            }
            Err(e) => {
                warn!(url = target.as_str(), error = %e, "Image download failed");
                None
            }
        }
    }
}
