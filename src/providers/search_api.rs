//! Web-search candidate acquisition and raw page fetch.
//!
//! The search API is consumed as an oracle: a free-text query in, an
//! ordered list of hits out, capped to five. Upstream failures (non-2xx,
//! an API-reported error field) are fatal for the whole request. The raw
//! fetcher, by contrast, tolerates everything: non-HTML, non-2xx, and
//! timeouts all degrade to empty text.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ScoutError;
use crate::results::SearchCandidate;

/// Search hits are capped to this many candidates.
pub const MAX_SEARCH_RESULTS: usize = 5;

/// External web-search boundary.
#[async_trait]
pub trait WebSearchApi: Send + Sync {
    /// Search the web, returning at most [`MAX_SEARCH_RESULTS`] hits.
    async fn search(&self, query: &str) -> Result<Vec<SearchCandidate>, ScoutError>;
}

/// Tavily-style JSON search client.
pub struct TavilySearchApi {
    api_key: String,
    endpoint: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct TavilyRequest<'a> {
    query: &'a str,
    search_depth: &'a str,
    max_results: usize,
}

#[derive(Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct TavilyResult {
    url: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

impl TavilySearchApi {
    pub fn new(api_key: impl Into<String>, endpoint: impl Into<String>) -> Result<Self, ScoutError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()?;
        Ok(Self {
            api_key: api_key.into(),
            endpoint: endpoint.into(),
            client,
        })
    }
}

#[async_trait]
impl WebSearchApi for TavilySearchApi {
    async fn search(&self, query: &str) -> Result<Vec<SearchCandidate>, ScoutError> {
        let request = TavilyRequest {
            query,
            search_depth: "basic",
            max_results: MAX_SEARCH_RESULTS,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key.trim()))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ScoutError::SearchApi {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: TavilyResponse = response.json().await?;
        if let Some(error) = parsed.error {
            return Err(ScoutError::SearchApi {
                status: status.as_u16(),
                body: error,
            });
        }

        let candidates = parsed
            .results
            .into_iter()
            .take(MAX_SEARCH_RESULTS)
            .map(|r| SearchCandidate {
                title: r.title.unwrap_or_default(),
                link: r.url,
                snippet: r.content.unwrap_or_default(),
            })
            .collect();
        Ok(candidates)
    }
}

/// Body and content type of a raw fetch; both empty when anything failed.
#[derive(Debug, Clone, Default)]
pub struct FetchedText {
    pub body: String,
    pub content_type: String,
}

impl FetchedText {
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

/// Raw GET against arbitrary third-party origins.
#[async_trait]
pub trait RawFetcher: Send + Sync {
    /// Fetch the URL as text; every failure mode yields an empty result.
    async fn fetch_text(&self, url: &str) -> FetchedText;
}

/// reqwest-backed fetcher with a short prefetch timeout.
pub struct HttpTextFetcher {
    client: reqwest::Client,
}

impl HttpTextFetcher {
    pub fn new(timeout: Duration) -> Result<Self, ScoutError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl RawFetcher for HttpTextFetcher {
    async fn fetch_text(&self, url: &str) -> FetchedText {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                ::log::debug!("raw fetch of {} failed: {}", url, e);
                return FetchedText::default();
            }
        };
        if !response.status().is_success() {
            ::log::debug!("raw fetch of {} returned {}", url, response.status());
            return FetchedText::default();
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let body = response.text().await.unwrap_or_default();
        FetchedText { body, content_type }
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use std::collections::HashMap;

    use async_trait::async_trait;

    use super::{FetchedText, RawFetcher};

    /// Canned fetcher for tests; unknown URLs come back empty, the way a
    /// failed fetch does in production.
    #[derive(Debug, Default)]
    pub struct MockFetcher {
        bodies: HashMap<String, FetchedText>,
    }

    impl MockFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_body(mut self, url: &str, body: &str, content_type: &str) -> Self {
            self.bodies.insert(
                url.to_string(),
                FetchedText {
                    body: body.to_string(),
                    content_type: content_type.to_string(),
                },
            );
            self
        }
    }

    #[async_trait]
    impl RawFetcher for MockFetcher {
        async fn fetch_text(&self, url: &str) -> FetchedText {
            self.bodies.get(url).cloned().unwrap_or_default()
        }
    }
}
