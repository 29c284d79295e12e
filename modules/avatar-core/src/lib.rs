pub mod cache;
pub mod candidates;
pub mod config;
pub mod discovery;
pub mod error;
pub mod fetcher;
pub mod security;
pub mod types;
pub mod vision;

#[cfg(test)]
mod test_http;

pub use cache::ResultCache;
pub use candidates::{extract_candidates, CandidateSource, HomepageScraper};
pub use config::{AppConfig, DiscoveryConfig};
pub use discovery::{accepts, AvatarDiscovery, ACCEPTANCE_THRESHOLD};
pub use error::{FetchError, FetchResult, SecurityError, SecurityResult, VerdictError};
pub use fetcher::{BoundedFetcher, ImageFetcher};
pub use security::{Resolver, SafeTarget, SystemResolver, UrlValidator};
pub use types::*;
pub use vision::{parse_verdict, AvatarVerifier, VisionVerifier};
