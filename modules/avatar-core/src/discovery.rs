//! End-to-end avatar discovery: cache, gate, scrape, fetch, verify.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{info, warn};

use crate::cache::ResultCache;
use crate::candidates::{CandidateSource, HomepageScraper, MAX_CANDIDATES};
use crate::config::AppConfig;
use crate::fetcher::{BoundedFetcher, ImageFetcher};
use crate::security::UrlValidator;
use crate::types::{AvatarResult, VerificationVerdict};
use crate::vision::{AvatarVerifier, VisionVerifier};

/// Minimum confidence for accepting a face.
///
/// Stricter than the verifier's own plausibility floor; this is the
/// threshold that decides what gets returned.
pub const ACCEPTANCE_THRESHOLD: f64 = 0.75;

/// Whether a verdict is good enough to return its candidate.
pub fn accepts(verdict: &VerificationVerdict) -> bool {
    verdict.is_human_face && verdict.confidence >= ACCEPTANCE_THRESHOLD
}

/// Finds and verifies a profile photo for a homepage.
///
/// Owns the result cache. Candidates within a run are checked one at a
/// time; concurrent runs for the same URL wait for the first one and reuse
/// its cached outcome.
pub struct AvatarDiscovery {
    validator: UrlValidator,
    scraper: Arc<dyn CandidateSource>,
    fetcher: Arc<dyn ImageFetcher>,
    verifier: Arc<dyn AvatarVerifier>,
    cache: ResultCache,
    in_flight: Mutex<HashMap<String, Flight>>,
}

type Flight = Arc<tokio::sync::Mutex<()>>;

/// Membership in the single-flight map for one URL. Dropping it, whether the
/// run finished or its future was cancelled, removes the map entry once no
/// other caller holds it.
struct FlightGuard<'a> {
    in_flight: &'a Mutex<HashMap<String, Flight>>,
    key: &'a str,
    flight: Flight,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map, one held here: nobody else is waiting.
        if Arc::strong_count(&self.flight) <= 2 {
            in_flight.remove(self.key);
        }
    }
}

impl AvatarDiscovery {
    pub fn new(
        validator: UrlValidator,
        scraper: Arc<dyn CandidateSource>,
        fetcher: Arc<dyn ImageFetcher>,
        verifier: Arc<dyn AvatarVerifier>,
        cache: ResultCache,
    ) -> Self {
        Self {
            validator,
            scraper,
            fetcher,
            verifier,
            cache,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Wire up the HTTP scraper, bounded fetcher and Ollama verifier.
    pub fn from_config(config: &AppConfig) -> Self {
        let limits = &config.discovery;
        let scraper = HomepageScraper::new(limits.page_timeout, limits.max_page_bytes)
            .with_user_agent(&limits.user_agent);
        let fetcher = BoundedFetcher::new(limits.max_image_bytes, limits.image_timeout)
            .with_user_agent(&limits.user_agent);
        let verifier = VisionVerifier::ollama(&config.ollama_url, &config.vision_model);

        Self::new(
            UrlValidator::new(),
            Arc::new(scraper),
            Arc::new(fetcher),
            Arc::new(verifier),
            ResultCache::new(limits.cache_capacity, limits.cache_ttl),
        )
    }

    /// Discover a verified avatar for `website_url`.
    ///
    /// Failures at any stage surface only as `avatar_url: None`.
    pub async fn discover_avatar(&self, website_url: &str) -> AvatarResult {
        if let Some(hit) = self.cache.get(website_url).await {
            info!(url = website_url, found = hit.is_some(), "Avatar cache hit");
            return hit.into();
        }

        let flight = self.join_flight(website_url);
        let _turn = flight.flight.lock().await;
        let outcome = match self.cache.get(website_url).await {
            Some(hit) => {
                info!(url = website_url, "Reusing result of concurrent run");
                hit
            }
            None => {
                let outcome = self.resolve(website_url).await;
                self.cache.insert(website_url, outcome.clone()).await;
                outcome
            }
        };

        outcome.into()
    }

    /// Cached outcome for a URL, if live. Never touches the network.
    pub async fn cached(&self, website_url: &str) -> Option<Option<String>> {
        self.cache.get(website_url).await
    }

    async fn resolve(&self, website_url: &str) -> Option<String> {
        let Some(homepage) = self.validator.check(website_url).await else {
            return None;
        };

        let mut candidates = self.scraper.scrape(&homepage).await;
        if candidates.is_empty() {
            info!(url = website_url, "No image candidates found");
            return None;
        }
        candidates.sort_by(|a, b| b.score.cmp(&a.score));
        candidates.truncate(MAX_CANDIDATES);

        let total = candidates.len();
        for (i, candidate) in candidates.into_iter().enumerate() {
            info!(
                url = website_url,
                candidate = %candidate.url,
                score = candidate.score,
                "Checking candidate {}/{}",
                i + 1,
                total
            );

            let Some(target) = self.validator.check(&candidate.url).await else {
                continue;
            };
            let Some(image) = self.fetcher.fetch(&target).await else {
                warn!(candidate = %candidate.url, "Failed to download candidate");
                continue;
            };

            let verdict = self.verifier.verify(&image).await;
            if accepts(&verdict) {
                info!(
                    url = website_url,
                    avatar = %candidate.url,
                    confidence = verdict.confidence,
                    "Accepted avatar"
                );
                return Some(candidate.url);
            }
            info!(
                candidate = %candidate.url,
                confidence = verdict.confidence,
                reason = %verdict.reason,
                "Rejected candidate"
            );
        }

        info!(url = website_url, "No candidate passed verification");
        None
    }

    /// Number of URLs with a run in progress or waiting on one.
    pub fn runs_in_flight(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn join_flight<'a>(&'a self, key: &'a str) -> FlightGuard<'a> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        let flight = in_flight.entry(key.to_string()).or_default().clone();
        FlightGuard {
            in_flight: &self.in_flight,
            key,
            flight,
        }
    }
}
