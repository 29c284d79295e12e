use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::cache::{DEFAULT_CAPACITY, DEFAULT_TTL};
use crate::fetcher::{DEFAULT_FETCH_TIMEOUT, DEFAULT_MAX_BYTES, DEFAULT_USER_AGENT};

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_VISION_MODEL: &str = "llama3.2-vision";

/// Limits for a single discovery run and the result cache.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub page_timeout: Duration,
    pub image_timeout: Duration,
    pub max_page_bytes: usize,
    pub max_image_bytes: usize,
    pub user_agent: String,
    pub cache_capacity: usize,
    pub cache_ttl: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            page_timeout: DEFAULT_FETCH_TIMEOUT,
            image_timeout: DEFAULT_FETCH_TIMEOUT,
            max_page_bytes: DEFAULT_MAX_BYTES,
            max_image_bytes: DEFAULT_MAX_BYTES,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            cache_capacity: DEFAULT_CAPACITY,
            cache_ttl: DEFAULT_TTL,
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    // Vision model
    pub ollama_url: String,
    pub vision_model: String,

    // Web server
    pub api_host: String,
    pub api_port: u16,

    pub discovery: DiscoveryConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = DiscoveryConfig::default();
        let config = Self {
            ollama_url: env_or("OLLAMA_URL", DEFAULT_OLLAMA_URL.to_string())?,
            vision_model: env_or("VISION_MODEL", DEFAULT_VISION_MODEL.to_string())?,
            api_host: env_or("API_HOST", "0.0.0.0".to_string())?,
            api_port: env_or("API_PORT", 8000)?,
            discovery: DiscoveryConfig {
                max_page_bytes: env_or("MAX_PAGE_BYTES", defaults.max_page_bytes)?,
                max_image_bytes: env_or("MAX_IMAGE_BYTES", defaults.max_image_bytes)?,
                user_agent: env_or("SCRAPER_USER_AGENT", defaults.user_agent)?,
                cache_capacity: env_or("AVATAR_CACHE_CAPACITY", defaults.cache_capacity)?,
                cache_ttl: Duration::from_secs(env_or(
                    "AVATAR_CACHE_TTL_SECS",
                    defaults.cache_ttl.as_secs(),
                )?),
                ..defaults
            },
        };

        config.log_config();
        Ok(config)
    }

    fn log_config(&self) {
        tracing::info!("Config loaded:");
        tracing::info!("  OLLAMA_URL: {}", self.ollama_url);
        tracing::info!("  VISION_MODEL: {}", self.vision_model);
        tracing::info!(
            "  AVATAR_CACHE: {} entries, {}s TTL",
            self.discovery.cache_capacity,
            self.discovery.cache_ttl.as_secs()
        );
        tracing::info!(
            "  LIMITS: page {} bytes, image {} bytes",
            self.discovery.max_page_bytes,
            self.discovery.max_image_bytes
        );
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw:?}")),
        _ => Ok(default),
    }
}
