use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ScoutError;

/// Configuration for one discovery pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// URL for the WebDriver instance
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,

    /// Web-search API endpoint
    #[serde(default = "default_search_endpoint")]
    pub search_endpoint: String,

    /// Generative-model name used for the oracles
    #[serde(default = "default_oracle_model")]
    pub oracle_model: String,

    /// Web-search API key; usually supplied via SEARCH_API_KEY
    #[serde(default)]
    pub search_api_key: String,

    /// Oracle API key; usually supplied via ORACLE_API_KEY
    #[serde(default)]
    pub oracle_api_key: String,

    /// Page navigation timeout in seconds
    #[serde(default = "default_nav_timeout_secs")]
    pub nav_timeout_secs: u64,

    /// Raw-text prefetch timeout in seconds
    #[serde(default = "default_prefetch_timeout_secs")]
    pub prefetch_timeout_secs: u64,

    /// Delay before the search probe's second keyword pass, in seconds
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    /// How many top crawl candidates get a full extraction visit
    #[serde(default = "default_max_extract_candidates")]
    pub max_extract_candidates: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            webdriver_url: default_webdriver_url(),
            search_endpoint: default_search_endpoint(),
            oracle_model: default_oracle_model(),
            search_api_key: String::new(),
            oracle_api_key: String::new(),
            nav_timeout_secs: default_nav_timeout_secs(),
            prefetch_timeout_secs: default_prefetch_timeout_secs(),
            retry_delay_secs: default_retry_delay_secs(),
            max_extract_candidates: default_max_extract_candidates(),
        }
    }
}

impl DiscoveryConfig {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ScoutError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        Ok(config)
    }

    /// Apply environment overrides for the WebDriver URL and credentials.
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("WEBDRIVER_URL") {
            if !url.is_empty() {
                self.webdriver_url = url;
            }
        }
        if let Ok(key) = std::env::var("SEARCH_API_KEY") {
            if !key.is_empty() {
                self.search_api_key = key;
            }
        }
        if let Ok(key) = std::env::var("ORACLE_API_KEY") {
            if !key.is_empty() {
                self.oracle_api_key = key;
            }
        }
    }

    /// Missing credentials are a fatal configuration error, checked once
    /// before any work starts.
    pub fn require_credentials(&self) -> Result<(), ScoutError> {
        if self.search_api_key.trim().is_empty() {
            return Err(ScoutError::MissingCredential("SEARCH_API_KEY"));
        }
        if self.oracle_api_key.trim().is_empty() {
            return Err(ScoutError::MissingCredential("ORACLE_API_KEY"));
        }
        Ok(())
    }
}

/// Default value for webdriver_url
fn default_webdriver_url() -> String {
    "http://localhost:4444".to_string()
}

/// Default value for search_endpoint
fn default_search_endpoint() -> String {
    "https://api.tavily.com/search".to_string()
}

/// Default value for oracle_model
fn default_oracle_model() -> String {
    "claude-3-5-haiku-latest".to_string()
}

/// Default page navigation timeout
fn default_nav_timeout_secs() -> u64 {
    15
}

/// Default raw-text prefetch timeout
fn default_prefetch_timeout_secs() -> u64 {
    8
}

/// Default probe retry delay
fn default_retry_delay_secs() -> u64 {
    2
}

/// Default number of candidates visited for extraction
fn default_max_extract_candidates() -> usize {
    3
}
