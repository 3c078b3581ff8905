//! Candidate search against the YouTube Data API v3

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::{
    config::{SearchConfig, credential},
    domain::candidate::Candidate,
};

pub const SEARCH_ENDPOINT: &str = "https://www.googleapis.com/youtube/v3/search";

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search API key not found, set {0} in the environment or .env file")]
    MissingCredential(String),

    #[error("search API rejected the credential (HTTP {status}): {message}")]
    Unauthorized { status: u16, message: String },

    #[error("search service returned HTTP {status}: {message}")]
    Service { status: u16, message: String },

    #[error("search service unreachable: {0}")]
    Unreachable(String),

    #[error("invalid search response: {0}")]
    InvalidResponse(String),
}

/// Maps a query to candidates, in the search engine's relevance order
pub trait CandidateSearch {
    fn search(&self, query: &str, max_results: u32) -> Result<Vec<Candidate>, SearchError>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: ItemId,
    #[serde(default)]
    snippet: Snippet,
}

#[derive(Debug, Deserialize)]
struct ItemId {
    #[serde(rename = "videoId")]
    video_id: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct Snippet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    thumbnails: Thumbnails,
}

#[derive(Debug, Deserialize, Default)]
struct Thumbnails {
    high: Option<Thumbnail>,
    medium: Option<Thumbnail>,
    default: Option<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

impl SearchResponse {
    fn into_candidates(self) -> Vec<Candidate> {
        self.items
            .into_iter()
            .filter_map(|item| {
                let id = item.id.video_id?;
                let thumbs = item.snippet.thumbnails;
                let thumbnail = thumbs
                    .high
                    .or(thumbs.medium)
                    .or(thumbs.default)
                    .map(|t| t.url)
                    .unwrap_or_default();
                Some(Candidate::new(id, item.snippet.title, thumbnail))
            })
            .collect()
    }
}

/// Video-only search, one request per call, no retries
pub struct YouTubeSearch {
    http_client: ureq::Agent,
    api_key: Option<String>,
    api_key_env: String,
    endpoint: String,
}

impl YouTubeSearch {
    pub fn new(config: &SearchConfig) -> Self {
        Self::with_endpoint(
            credential(&config.api_key_env),
            &config.api_key_env,
            SEARCH_ENDPOINT,
        )
    }

    pub fn with_endpoint(api_key: Option<String>, api_key_env: &str, endpoint: &str) -> Self {
        let http_client = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout_read(Duration::from_secs(15))
            .build();
        Self {
            http_client,
            api_key,
            api_key_env: api_key_env.to_string(),
            endpoint: endpoint.to_string(),
        }
    }

    fn classify_ureq_failure(error: ureq::Error) -> SearchError {
        match error {
            ureq::Error::Status(status, response) => {
                let message = response
                    .into_string()
                    .unwrap_or_else(|e| format!("<unreadable body: {e}>"));
                match status {
                    400 if message.contains("API key") || message.contains("keyInvalid") => {
                        SearchError::Unauthorized { status, message }
                    }
                    401 | 403 => SearchError::Unauthorized { status, message },
                    _ => SearchError::Service { status, message },
                }
            }
            ureq::Error::Transport(transport) => SearchError::Unreachable(transport.to_string()),
        }
    }
}

impl CandidateSearch for YouTubeSearch {
    fn search(&self, query: &str, max_results: u32) -> Result<Vec<Candidate>, SearchError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| SearchError::MissingCredential(self.api_key_env.clone()))?;

        log::info!("searching videos for \"{query}\"");
        let response = self
            .http_client
            .get(&self.endpoint)
            .query("part", "snippet")
            .query("q", query)
            .query("maxResults", &max_results.to_string())
            .query("type", "video")
            .query("key", api_key)
            .call()
            .map_err(Self::classify_ureq_failure)?;

        let body: SearchResponse = response
            .into_json()
            .map_err(|e| SearchError::InvalidResponse(e.to_string()))?;

        let candidates = body.into_candidates();
        log::debug!("search returned {} candidates", candidates.len());
        Ok(candidates)
    }
}
