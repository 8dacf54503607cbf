use crate::{BattleLogEntry, RankedPlayer};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::time::Duration;

pub type ApiResult<T> = Result<T, ApiError>;

pub const BRAWL_STARS_API: &str = "https://api.brawlstars.com/v1";

/// Brawl Stars API client authenticated with a developer bearer token.
#[derive(Debug, Clone)]
pub struct BrawlApi {
    client: Client,
    base_url: String,
    token: String,
    timeout: Duration,
}

#[derive(Debug)]
pub enum ApiError {
    Network(reqwest::Error, String),
    Api(reqwest::Error, String),
    Parsing(reqwest::Error, String),
    InvalidUrl(String),
    Other(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Network(e, url) => write!(f, "Network error for {url}: {e}"),
            ApiError::Api(e, url) => write!(f, "API error for {url}: {e}"),
            ApiError::Parsing(e, url) => write!(f, "Parse error for {url}: {e}"),
            ApiError::InvalidUrl(url) => write!(f, "Invalid URL: {url}"),
            ApiError::Other(msg) => write!(f, "Error: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

/// Every list endpoint wraps its payload as `{"items": [...], "paging": {...}}`.
#[derive(Debug, Deserialize)]
struct Items<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

impl<T> Default for Items<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl BrawlApi {
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_base_url(token, BRAWL_STARS_API)
    }

    pub fn with_base_url(token: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .user_agent("battlecrawl/0.1 (ranked battle crawler)")
                .build()
                .unwrap_or_default(),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            token: token.into(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Fetch the global top-player ranking.
    pub async fn fetch_top_players(&self) -> ApiResult<Vec<RankedPlayer>> {
        let url = self.endpoint(&["rankings", "global", "players"])?;
        let raw: Items<RankedPlayer> = self.get(url).await?;
        Ok(raw.items)
    }

    /// Fetch a player's recent battles. The tag (`#2PP...`) is escaped as one path segment.
    pub async fn fetch_battlelog(&self, tag: &str) -> ApiResult<Vec<BattleLogEntry>> {
        let url = self.endpoint(&["players", tag, "battlelog"])?;
        let raw: Items<BattleLogEntry> = self.get(url).await?;
        Ok(raw.items)
    }

    fn endpoint(&self, segments: &[&str]) -> ApiResult<Url> {
        let mut url =
            Url::parse(&self.base_url).map_err(|_| ApiError::InvalidUrl(self.base_url.clone()))?;
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get<T: Default + DeserializeOwned>(&self, url: Url) -> ApiResult<T> {
        let url_str = url.to_string();
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ApiError::Network(e, url_str.clone()))?;

        match response.error_for_status() {
            Ok(res) => res
                .json::<T>()
                .await
                .map_err(|e| ApiError::Parsing(e, url_str)),
            // Unknown or banned player tags answer 404; there is simply nothing to crawl.
            Err(e) if e.status() == Some(StatusCode::NOT_FOUND) => Ok(T::default()),
            Err(e) => Err(ApiError::Api(e, url_str)),
        }
    }
}
