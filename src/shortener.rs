use log::{error, info, warn};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::settings_store::ShortenerSettings;

pub const TEST_URL: &str = "https://google.com";
const ALIAS_LENGTH: usize = 8;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const STATUS_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub enum ShortenerError {
    HttpError(reqwest::Error),
    ApiError { status: u16, message: String },
    NotConfigured,
}

impl std::fmt::Display for ShortenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShortenerError::HttpError(e) => write!(f, "HTTP error: {}", e),
            ShortenerError::ApiError { status, message } => {
                write!(f, "Shortener API error ({}): {}", status, message)
            }
            ShortenerError::NotConfigured => write!(f, "Shortener domain or API key is not set"),
        }
    }
}

impl std::error::Error for ShortenerError {}

impl From<reqwest::Error> for ShortenerError {
    fn from(err: reqwest::Error) -> Self {
        ShortenerError::HttpError(err)
    }
}

#[derive(Debug, Deserialize)]
struct ShortenResponse {
    status: Option<String>,
    #[serde(rename = "shortenedUrl")]
    shortened_url: Option<String>,
    message: Option<String>,
}

/// interprets a shortener API reply; success needs HTTP 200 and `status == "success"`
fn parse_response(
    status: StatusCode,
    body: &str,
    original: &str,
) -> Result<String, ShortenerError> {
    let parsed: ShortenResponse =
        serde_json::from_str(body).map_err(|e| ShortenerError::ApiError {
            status: status.as_u16(),
            message: format!("unreadable response: {}", e),
        })?;

    if status == StatusCode::OK && parsed.status.as_deref() == Some("success") {
        return Ok(parsed
            .shortened_url
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| original.to_string()));
    }

    Err(ShortenerError::ApiError {
        status: status.as_u16(),
        message: parsed
            .message
            .unwrap_or_else(|| "Unknown error".to_string()),
    })
}

pub fn generate_alias() -> String {
    std::iter::repeat_with(fastrand::alphanumeric)
        .take(ALIAS_LENGTH)
        .collect()
}

/// bounded map of shortened urls with time-based expiry
#[derive(Debug)]
pub struct ShortLinkCache {
    entries: HashMap<String, (String, Instant)>,
    capacity: usize,
    ttl: Duration,
}

impl ShortLinkCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            capacity,
            ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_fresh(&self, inserted_at: Instant) -> bool {
        inserted_at.elapsed() < self.ttl
    }

    pub fn get(&mut self, url: &str) -> Option<String> {
        let (short, inserted_at) = self.entries.get(url)?.clone();
        if self.is_fresh(inserted_at) {
            Some(short)
        } else {
            self.entries.remove(url);
            None
        }
    }

    pub fn insert(&mut self, url: String, short: String) {
        if self.capacity == 0 {
            return;
        }
        if !self.entries.contains_key(&url) && self.entries.len() >= self.capacity {
            self.purge_expired();
            if self.entries.len() >= self.capacity {
                self.evict_oldest();
            }
        }
        self.entries.insert(url, (short, Instant::now()));
    }

    fn purge_expired(&mut self) {
        let ttl = self.ttl;
        self.entries
            .retain(|_, (_, inserted_at)| inserted_at.elapsed() < ttl);
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, (_, inserted_at))| *inserted_at)
            .map(|(url, _)| url.clone());
        if let Some(url) = oldest {
            self.entries.remove(&url);
        }
    }
}

/// outcome of the admin "test shortener" action
#[derive(Debug, Clone)]
pub enum ShortenerTestOutcome {
    Success { short_link: String },
    Failed { status: Option<u16>, message: String },
}

pub struct Shortener {
    client: Client,
    cache: Mutex<ShortLinkCache>,
}

impl Shortener {
    pub fn new(cache_capacity: usize, cache_ttl: Duration) -> Result<Self, ShortenerError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            cache: Mutex::new(ShortLinkCache::new(cache_capacity, cache_ttl)),
        })
    }

    async fn request(
        &self,
        url: &str,
        settings: &ShortenerSettings,
        timeout: Duration,
    ) -> Result<String, ShortenerError> {
        if settings.domain.is_empty() || settings.api_key.is_empty() {
            return Err(ShortenerError::NotConfigured);
        }

        let alias = generate_alias();
        let response = self
            .client
            .get(format!("https://{}/api", settings.domain))
            .query(&[
                ("api", settings.api_key.as_str()),
                ("url", url),
                ("alias", alias.as_str()),
            ])
            .timeout(timeout)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        parse_response(status, &body, url)
    }

    /// shortens `url`, falling back to it unchanged on any failure.
    /// with `force` the enabled flag is ignored.
    pub async fn shorten(&self, url: &str, settings: &ShortenerSettings, force: bool) -> String {
        if !force && !settings.enabled {
            return url.to_string();
        }

        // links shortened by a previous shortener are not reused
        let cache_key = format!("{}|{}", settings.domain, url);
        if let Some(cached) = self.cache.lock().await.get(&cache_key) {
            return cached;
        }

        match self.request(url, settings, REQUEST_TIMEOUT).await {
            Ok(short) => {
                info!("Shortened {} via {}", url, settings.domain);
                self.cache
                    .lock()
                    .await
                    .insert(cache_key, short.clone());
                short
            }
            Err(e) => {
                error!("Shortener error for {}: {}", settings.domain, e);
                url.to_string()
            }
        }
    }

    pub async fn test(&self, settings: &ShortenerSettings) -> ShortenerTestOutcome {
        match self.request(TEST_URL, settings, REQUEST_TIMEOUT).await {
            Ok(short_link) => ShortenerTestOutcome::Success { short_link },
            Err(ShortenerError::ApiError { status, message }) => ShortenerTestOutcome::Failed {
                status: Some(status),
                message,
            },
            Err(e) => ShortenerTestOutcome::Failed {
                status: None,
                message: e.to_string(),
            },
        }
    }

    /// quick reachability probe for the settings panel
    pub async fn check_status(&self, settings: &ShortenerSettings) -> bool {
        match self.request(TEST_URL, settings, STATUS_PROBE_TIMEOUT).await {
            Ok(_) => true,
            Err(e) => {
                warn!("Shortener status check failed for {}: {}", settings.domain, e);
                false
            }
        }
    }
}
