use thiserror::Error;

/// Fatal errors for a discovery request.
///
/// Everything that can be recovered from locally (a page that fails to load,
/// a selector that misses, an oracle reply that does not parse) is expressed
/// as an empty or negative result value at the component boundary instead of
/// a variant here. A `ScoutError` aborts the whole request.
#[derive(Debug, Error)]
pub enum ScoutError {
    /// A required API credential was not configured.
    #[error("missing credential: {0} is not set")]
    MissingCredential(&'static str),

    /// The web-search API rejected the request or reported an error.
    #[error("search API error (status {status}): {body}")]
    SearchApi { status: u16, body: String },

    /// The generative oracle endpoint rejected the request.
    #[error("oracle error (status {status}): {body}")]
    Oracle { status: u16, body: String },

    /// HTTP transport failure talking to an upstream API.
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// No WebDriver server could be reached at any known address.
    #[error("no WebDriver server reachable (tried {0})")]
    BrowserUnavailable(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ScoutError>;
