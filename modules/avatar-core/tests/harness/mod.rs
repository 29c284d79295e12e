//! Fakes for every network-facing seam of the pipeline, each counting its
//! calls so tests can assert exactly what a run touched.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use avatar_core::{
    AvatarDiscovery, AvatarVerifier, CandidateImage, CandidateSource, ImageFetcher, Resolver,
    ResultCache, SafeTarget, UrlValidator, VerificationVerdict,
};
use bytes::Bytes;

pub const HOMEPAGE: &str = "https://lab.test/~jane/";

#[derive(Default)]
pub struct FakeDns {
    answers: Mutex<HashMap<String, IpAddr>>,
    pub lookups: AtomicUsize,
}

impl FakeDns {
    pub fn point(&self, host: &str, ip: &str) {
        self.answers
            .lock()
            .unwrap()
            .insert(host.to_string(), ip.parse().unwrap());
    }
}

#[async_trait]
impl Resolver for FakeDns {
    async fn lookup(&self, host: &str, port: u16) -> std::io::Result<Vec<SocketAddr>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        match self.answers.lock().unwrap().get(host) {
            Some(ip) => Ok(vec![SocketAddr::new(*ip, port)]),
            None => Err(std::io::Error::new(std::io::ErrorKind::NotFound, "NXDOMAIN")),
        }
    }
}

#[derive(Default)]
pub struct FakeScraper {
    candidates: Mutex<Vec<CandidateImage>>,
    pub calls: AtomicUsize,
    pub delay: Option<Duration>,
}

impl FakeScraper {
    pub fn returning(candidates: Vec<CandidateImage>) -> Self {
        Self {
            candidates: Mutex::new(candidates),
            ..Self::default()
        }
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl CandidateSource for FakeScraper {
    async fn scrape(&self, _homepage: &SafeTarget) -> Vec<CandidateImage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.candidates.lock().unwrap().clone()
    }
}

/// Serves image bytes per URL; unknown URLs fail like a 404.
#[derive(Default)]
pub struct FakeFetcher {
    images: Mutex<HashMap<String, Bytes>>,
    pub fetched: Mutex<Vec<SafeTarget>>,
}

impl FakeFetcher {
    pub fn serve(&self, url: &str, body: &'static [u8]) {
        self.images
            .lock()
            .unwrap()
            .insert(url.to_string(), Bytes::from_static(body));
    }

    pub fn count(&self) -> usize {
        self.fetched.lock().unwrap().len()
    }

    pub fn urls(&self) -> Vec<String> {
        self.fetched
            .lock()
            .unwrap()
            .iter()
            .map(|t| t.as_str().to_string())
            .collect()
    }
}

#[async_trait]
impl ImageFetcher for FakeFetcher {
    async fn fetch(&self, target: &SafeTarget) -> Option<Bytes> {
        self.fetched.lock().unwrap().push(target.clone());
        self.images.lock().unwrap().get(target.as_str()).cloned()
    }
}

/// Answers with a verdict keyed by image body; unknown bodies are negative.
#[derive(Default)]
pub struct FakeVerifier {
    verdicts: Mutex<HashMap<Vec<u8>, (bool, f64)>>,
    pub calls: AtomicUsize,
}

impl FakeVerifier {
    pub fn judge(&self, body: &[u8], is_human_face: bool, confidence: f64) {
        self.verdicts
            .lock()
            .unwrap()
            .insert(body.to_vec(), (is_human_face, confidence));
    }
}

#[async_trait]
impl AvatarVerifier for FakeVerifier {
    async fn verify(&self, image: &[u8]) -> VerificationVerdict {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.verdicts.lock().unwrap().get(image) {
            Some(&(is_human_face, confidence)) => VerificationVerdict {
                is_human_face,
                confidence,
                reason: "scripted".to_string(),
            },
            None => VerificationVerdict::failed("unrecognised image"),
        }
    }
}

pub fn candidate(url: &str, score: i32) -> CandidateImage {
    CandidateImage {
        url: url.to_string(),
        score,
        alt_text: String::new(),
    }
}

/// A discovery service over fakes, plus handles to inspect them.
pub struct Rig {
    pub discovery: AvatarDiscovery,
    pub dns: Arc<FakeDns>,
    pub scraper: Arc<FakeScraper>,
    pub fetcher: Arc<FakeFetcher>,
    pub verifier: Arc<FakeVerifier>,
}

impl Rig {
    pub fn new(scraper: FakeScraper) -> Self {
        Self::with_cache(scraper, ResultCache::new(100, Duration::from_secs(3600)))
    }

    pub fn with_cache(scraper: FakeScraper, cache: ResultCache) -> Self {
        let dns = Arc::new(FakeDns::default());
        dns.point("lab.test", "93.184.216.34");
        dns.point("cdn.test", "151.101.1.1");

        let scraper = Arc::new(scraper);
        let fetcher = Arc::new(FakeFetcher::default());
        let verifier = Arc::new(FakeVerifier::default());
        let discovery = AvatarDiscovery::new(
            UrlValidator::with_resolver(dns.clone()),
            scraper.clone(),
            fetcher.clone(),
            verifier.clone(),
            cache,
        );

        Self {
            discovery,
            dns,
            scraper,
            fetcher,
            verifier,
        }
    }

    /// Every network-facing call the pipeline has made so far.
    pub fn network_calls(&self) -> usize {
        self.dns.lookups.load(Ordering::SeqCst)
            + self.scraper.calls.load(Ordering::SeqCst)
            + self.fetcher.count()
            + self.verifier.calls.load(Ordering::SeqCst)
    }

    pub fn scrapes(&self) -> usize {
        self.scraper.calls.load(Ordering::SeqCst)
    }

    pub fn verifications(&self) -> usize {
        self.verifier.calls.load(Ordering::SeqCst)
    }
}
