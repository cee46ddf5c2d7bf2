//! Browser session boundary.
//!
//! The crawl, probe, and collection components only need a handful of
//! operations on a live page; they take `&mut dyn BrowserSession` so tests
//! can substitute a snapshot-backed mock. The production implementation
//! wraps a fantoccini WebDriver client.

use std::time::Duration;

use async_trait::async_trait;
use fantoccini::{Client, ClientBuilder, Locator};
use thiserror::Error;
use tokio::time::timeout;

use crate::error::ScoutError;
use crate::utils::calculate_timeout;

/// Alternative WebDriver addresses tried when the configured one is down.
const FALLBACK_WEBDRIVER_URLS: [&str; 3] = [
    "http://localhost:9515", // ChromeDriver default
    "http://localhost:4444",
    "http://127.0.0.1:4444", // IP instead of localhost
];

/// Recoverable browser-step failures. Components degrade on these; they
/// never abort a request.
#[derive(Debug, Error)]
pub enum BrowseError {
    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("page load timed out after {0:?}")]
    Timeout(Duration),

    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("webdriver session error: {0}")]
    Session(String),
}

/// One exclusively-owned browser session.
///
/// The opener is responsible for calling `close` on every exit path.
#[async_trait]
pub trait BrowserSession: Send {
    /// Navigate to the URL and wait for the load to settle.
    async fn goto(&mut self, url: &str) -> Result<(), BrowseError>;

    /// Source of the currently loaded page.
    async fn source(&mut self) -> Result<String, BrowseError>;

    /// URL the browser actually ended up on.
    async fn current_url(&mut self) -> Result<String, BrowseError>;

    /// Click the element with the given id on the current page.
    async fn click_id(&mut self, id: &str) -> Result<(), BrowseError>;

    /// Release the underlying session.
    async fn close(&mut self) -> Result<(), BrowseError>;
}

/// Fantoccini-backed session.
pub struct WebDriverSession {
    client: Client,
    nav_timeout_ms: u64,
}

impl WebDriverSession {
    /// Connect to the configured WebDriver server, falling back to the
    /// common local addresses before giving up.
    pub async fn connect(webdriver_url: &str, nav_timeout: Duration) -> Result<Self, ScoutError> {
        match ClientBuilder::native().connect(webdriver_url).await {
            Ok(client) => {
                ::log::debug!("connected to WebDriver at {}", webdriver_url);
                return Ok(Self {
                    client,
                    nav_timeout_ms: nav_timeout.as_millis() as u64,
                });
            }
            Err(e) => {
                ::log::error!("failed to connect to WebDriver at {}: {}", webdriver_url, e);
            }
        }

        for url in FALLBACK_WEBDRIVER_URLS {
            if url == webdriver_url {
                continue;
            }
            ::log::info!("trying fallback WebDriver URL: {}", url);
            if let Ok(client) = ClientBuilder::native().connect(url).await {
                ::log::debug!("connected to fallback WebDriver at {}", url);
                return Ok(Self {
                    client,
                    nav_timeout_ms: nav_timeout.as_millis() as u64,
                });
            }
        }

        ::log::error!(
            "no WebDriver server reachable; set WEBDRIVER_URL or start one at {}",
            webdriver_url
        );
        Err(ScoutError::BrowserUnavailable(webdriver_url.to_string()))
    }
}

/// Session-loss errors get their own variant so callers can log them the
/// way navigation errors are logged, without retry machinery around them.
fn map_cmd_error(error: fantoccini::error::CmdError) -> BrowseError {
    let message = error.to_string();
    if message.contains("Unable to find session") {
        BrowseError::Session(message)
    } else {
        BrowseError::Navigation(message)
    }
}

#[async_trait]
impl BrowserSession for WebDriverSession {
    async fn goto(&mut self, url: &str) -> Result<(), BrowseError> {
        let limit = calculate_timeout(self.nav_timeout_ms, url.len());
        match timeout(limit, self.client.goto(url)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(map_cmd_error(e)),
            Err(_) => Err(BrowseError::Timeout(limit)),
        }
    }

    async fn source(&mut self) -> Result<String, BrowseError> {
        self.client.source().await.map_err(map_cmd_error)
    }

    async fn current_url(&mut self) -> Result<String, BrowseError> {
        self.client
            .current_url()
            .await
            .map(|u| u.to_string())
            .map_err(map_cmd_error)
    }

    async fn click_id(&mut self, id: &str) -> Result<(), BrowseError> {
        let element = self
            .client
            .find(Locator::Id(id))
            .await
            .map_err(|_| BrowseError::ElementNotFound(id.to_string()))?;
        element.click().await.map(|_| ()).map_err(map_cmd_error)
    }

    async fn close(&mut self) -> Result<(), BrowseError> {
        self.client.clone().close().await.map_err(map_cmd_error)
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use std::collections::HashMap;

    use async_trait::async_trait;

    use super::{BrowseError, BrowserSession};

    /// Snapshot-backed session for tests: a map from URL to page source,
    /// plus optional per-element-id overlays that replace the current page
    /// when clicked.
    #[derive(Debug, Default)]
    pub struct MockSession {
        pages: HashMap<String, String>,
        click_overlays: HashMap<String, String>,
        pub visited: Vec<String>,
        current_url: String,
        current_html: Option<String>,
    }

    impl MockSession {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_page(mut self, url: &str, html: &str) -> Self {
            self.pages.insert(url.to_string(), html.to_string());
            self
        }

        pub fn with_click_overlay(mut self, id: &str, html: &str) -> Self {
            self.click_overlays.insert(id.to_string(), html.to_string());
            self
        }
    }

    #[async_trait]
    impl BrowserSession for MockSession {
        async fn goto(&mut self, url: &str) -> Result<(), BrowseError> {
            self.visited.push(url.to_string());
            match self.pages.get(url) {
                Some(html) => {
                    self.current_url = url.to_string();
                    self.current_html = Some(html.clone());
                    Ok(())
                }
                None => Err(BrowseError::Navigation(format!("no page for {url}"))),
            }
        }

        async fn source(&mut self) -> Result<String, BrowseError> {
            self.current_html
                .clone()
                .ok_or_else(|| BrowseError::Session("no page loaded".to_string()))
        }

        async fn current_url(&mut self) -> Result<String, BrowseError> {
            if self.current_url.is_empty() {
                return Err(BrowseError::Session("no page loaded".to_string()));
            }
            Ok(self.current_url.clone())
        }

        async fn click_id(&mut self, id: &str) -> Result<(), BrowseError> {
            match self.click_overlays.get(id) {
                Some(html) => {
                    self.current_html = Some(html.clone());
                    Ok(())
                }
                None => Err(BrowseError::ElementNotFound(id.to_string())),
            }
        }

        async fn close(&mut self) -> Result<(), BrowseError> {
            Ok(())
        }
    }
}
