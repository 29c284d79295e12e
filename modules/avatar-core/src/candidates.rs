//! Homepage scraping and candidate ranking.
//!
//! Scoring is table-driven: each [`ScoreRule`] names a keyword set, the
//! element contexts it looks in, and a weight. A rule fires at most once per
//! element, however many of its keywords match.

use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, warn};
use url::Url;

use crate::fetcher::{get_bounded, DEFAULT_FETCH_TIMEOUT, DEFAULT_MAX_BYTES, DEFAULT_USER_AGENT};
use crate::security::SafeTarget;
use crate::types::CandidateImage;

pub const MAX_CANDIDATES: usize = 5;
/// Candidates scoring at or below this are dropped.
pub const SCORE_CUTOFF: i32 = -10;
pub const OG_IMAGE_SCORE: i32 = 20;
pub const OG_IMAGE_ALT: &str = "og:image";

const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".webp"];

const PROFILE_KEYWORDS: &[&str] = &[
    "profile", "avatar", "photo", "me", "headshot", "face", "portrait",
];
const CHROME_KEYWORDS: &[&str] = &[
    "logo", "icon", "banner", "footer", "header", "sprite", "shim", "blank",
];

/// Where on an `<img>` element a rule looks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreContext {
    /// The `alt` attribute.
    AltText,
    /// The `src` attribute as written in the markup.
    Url,
    /// Each token of the `class` attribute.
    Class,
}

#[derive(Debug, Clone, Copy)]
pub struct ScoreRule {
    pub keywords: &'static [&'static str],
    pub contexts: &'static [ScoreContext],
    pub weight: i32,
}

pub const SCORE_RULES: &[ScoreRule] = &[
    ScoreRule {
        keywords: PROFILE_KEYWORDS,
        contexts: &[ScoreContext::AltText],
        weight: 10,
    },
    ScoreRule {
        keywords: PROFILE_KEYWORDS,
        contexts: &[ScoreContext::Url],
        weight: 5,
    },
    ScoreRule {
        keywords: PROFILE_KEYWORDS,
        contexts: &[ScoreContext::Class],
        weight: 5,
    },
    ScoreRule {
        keywords: CHROME_KEYWORDS,
        contexts: &[ScoreContext::Url, ScoreContext::AltText, ScoreContext::Class],
        weight: -50,
    },
];

static IMG_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img[src]").expect("valid selector"));
static OG_IMAGE_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"meta[property="og:image"], meta[name="og:image"]"#).expect("valid selector")
});

/// The parts of an `<img>` element the rules look at, lowercased.
#[derive(Debug, Clone, Default)]
pub struct ImageAttrs {
    pub src: String,
    pub alt: String,
    pub classes: Vec<String>,
}

impl ImageAttrs {
    pub fn new(src: &str, alt: &str, classes: &[&str]) -> Self {
        Self {
            src: src.to_lowercase(),
            alt: alt.to_lowercase(),
            classes: classes.iter().map(|c| c.to_lowercase()).collect(),
        }
    }

    fn from_element(element: &ElementRef<'_>) -> Self {
        let value = element.value();
        Self::new(
            value.attr("src").unwrap_or_default(),
            value.attr("alt").unwrap_or_default(),
            &value.classes().collect::<Vec<_>>(),
        )
    }

    fn matches(&self, context: ScoreContext, keyword: &str) -> bool {
        match context {
            ScoreContext::AltText => self.alt.contains(keyword),
            ScoreContext::Url => self.src.contains(keyword),
            ScoreContext::Class => self.classes.iter().any(|c| c.contains(keyword)),
        }
    }
}

impl ScoreRule {
    pub fn fires(&self, attrs: &ImageAttrs) -> bool {
        self.contexts.iter().any(|&context| {
            self.keywords
                .iter()
                .any(|keyword| attrs.matches(context, keyword))
        })
    }
}

/// Score an image element against [`SCORE_RULES`].
pub fn score_image(attrs: &ImageAttrs) -> i32 {
    SCORE_RULES
        .iter()
        .filter(|rule| rule.fires(attrs))
        .map(|rule| rule.weight)
        .sum()
}

fn has_image_extension(url: &Url) -> bool {
    let path = url.path().to_ascii_lowercase();
    IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

fn resolve(raw: &str, base: &Url) -> Option<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let mut url = base.join(raw).ok()?;
    url.set_fragment(None);
    Some(url)
}

/// Extract scored candidates from a page, in document order, before ranking.
///
/// `<img>` elements come first. The Open-Graph image, if any, is appended
/// with a fixed score and skips the extension filter, unless an `<img>`
/// already claimed its URL. Duplicates keep their first occurrence.
pub fn collect_candidates(html: &str, base: &Url) -> Vec<CandidateImage> {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    for element in document.select(&IMG_SELECTOR) {
        let Some(url) = element.value().attr("src").and_then(|src| resolve(src, base)) else {
            continue;
        };
        if !has_image_extension(&url) {
            continue;
        }
        let key = url.to_string();
        if !seen.insert(key.clone()) {
            continue;
        }

        let attrs = ImageAttrs::from_element(&element);
        candidates.push(CandidateImage {
            url: key,
            score: score_image(&attrs),
            alt_text: element.value().attr("alt").unwrap_or_default().trim().to_string(),
        });
    }

    let og_image = document
        .select(&OG_IMAGE_SELECTOR)
        .filter_map(|meta| meta.value().attr("content"))
        .find_map(|content| resolve(content, base));
    if let Some(url) = og_image {
        if seen.insert(url.to_string()) {
            candidates.push(CandidateImage {
                url: url.into(),
                score: OG_IMAGE_SCORE,
                alt_text: OG_IMAGE_ALT.to_string(),
            });
        }
    }

    candidates
}

/// Sort best-first, drop anything at or below the cutoff, keep the top few.
///
/// The sort is stable, so equal scores keep document order.
pub fn rank(mut candidates: Vec<CandidateImage>) -> Vec<CandidateImage> {
    candidates.sort_by(|a, b| b.score.cmp(&a.score));
    candidates.retain(|c| c.score > SCORE_CUTOFF);
    candidates.truncate(MAX_CANDIDATES);
    candidates
}

/// Ranked candidates for a page.
pub fn extract_candidates(html: &str, base: &Url) -> Vec<CandidateImage> {
    rank(collect_candidates(html, base))
}

/// Produces ranked profile-image candidates for a homepage.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    /// Never fails: any fetch or parse problem yields an empty list.
    async fn scrape(&self, homepage: &SafeTarget) -> Vec<CandidateImage>;
}

/// Fetches the homepage over HTTP and ranks its images.
#[derive(Debug, Clone)]
pub struct HomepageScraper {
    timeout: Duration,
    max_page_bytes: usize,
    user_agent: String,
}

impl Default for HomepageScraper {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_FETCH_TIMEOUT,
            max_page_bytes: DEFAULT_MAX_BYTES,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl HomepageScraper {
    pub fn new(timeout: Duration, max_page_bytes: usize) -> Self {
        Self {
            timeout,
            max_page_bytes,
            ..Self::default()
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

#[async_trait]
impl CandidateSource for HomepageScraper {
    async fn scrape(&self, homepage: &SafeTarget) -> Vec<CandidateImage> {
        let url = homepage.as_str();
        let fetched = get_bounded(
            homepage,
            self.max_page_bytes,
            self.timeout,
            &self.user_agent,
        )
        .await;
        let body = match fetched {
            Ok(body) => body,
            Err(e) => {
                warn!(url, error = %e, "Homepage fetch failed");
                return Vec::new();
            }
        };

        let html = String::from_utf8_lossy(&body);
        let candidates = extract_candidates(&html, homepage.url());
        info!(url, bytes = body.len(), candidates = candidates.len(), "Scraped homepage");
        for c in &candidates {
            debug!(url = %c.url, score = c.score, alt = %c.alt_text, "Candidate");
        }
        candidates
    }
}
