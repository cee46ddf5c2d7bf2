// Re-export modules
pub mod browser;
pub mod config;
pub mod crawlers;
pub mod dom;
pub mod error;
pub mod pipeline;
pub mod price;
pub mod providers;
pub mod results;
pub mod scoring;
pub mod search;
pub mod signals;
pub mod store;
pub mod utils;

// Re-export commonly used types for convenience
pub use config::DiscoveryConfig;
pub use error::{Result, ScoutError};
pub use results::{ProductReport, ProductSignals};

use std::path::Path;
use std::time::Duration;

use crate::providers::oracle::AnthropicOracle;
use crate::providers::search_api::{HttpTextFetcher, TavilySearchApi};
use crate::store::ReportSink;

/// Builder for one product-discovery request.
pub struct Discovery {
    keyword: String,
    brand: Option<String>,
    config: DiscoveryConfig,
}

impl Discovery {
    /// Create a new discovery builder for the given product keyword.
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            brand: None,
            config: DiscoveryConfig::default(),
        }
    }

    /// Anchor the web search with a brand name.
    pub fn with_brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = Some(brand.into());
        self
    }

    /// Apply a configuration.
    pub fn with_config(mut self, config: DiscoveryConfig) -> Self {
        self.config = config;
        self
    }

    /// Load configuration from a JSON file.
    pub fn with_config_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self> {
        self.config = DiscoveryConfig::from_file(path)?;
        Ok(self)
    }

    /// Override the WebDriver server URL.
    pub fn with_webdriver_url(mut self, url: impl Into<String>) -> Self {
        self.config.webdriver_url = url.into();
        self
    }

    /// Run the discovery pipeline and return the finished report.
    pub async fn run(self) -> Result<ProductReport> {
        let (config, search_api, oracle, fetcher) = self.build_providers()?;
        pipeline::run_request(
            &self.keyword,
            self.brand.as_deref(),
            &config,
            &search_api,
            &oracle,
            &fetcher,
        )
        .await
    }

    /// Run the pipeline and persist the report through the sink, whether
    /// the request completed or failed. Only sink errors surface.
    pub async fn run_recorded(self, sink: &dyn ReportSink) -> Result<ProductReport> {
        let (config, search_api, oracle, fetcher) = self.build_providers()?;
        pipeline::run_and_record(
            &self.keyword,
            self.brand.as_deref(),
            &config,
            &search_api,
            &oracle,
            &fetcher,
            sink,
        )
        .await
    }

    fn build_providers(
        &self,
    ) -> Result<(DiscoveryConfig, TavilySearchApi, AnthropicOracle, HttpTextFetcher)> {
        let mut config = self.config.clone();
        config.apply_env();
        config.require_credentials()?;

        let search_api = TavilySearchApi::new(&config.search_api_key, &config.search_endpoint)?;
        let oracle = AnthropicOracle::new(&config.oracle_api_key, &config.oracle_model)?;
        let fetcher = HttpTextFetcher::new(Duration::from_secs(config.prefetch_timeout_secs))?;
        Ok((config, search_api, oracle, fetcher))
    }
}
