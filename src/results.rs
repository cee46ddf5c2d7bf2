use serde::{Deserialize, Serialize};

/// One hit returned by the external web-search API.
///
/// Sourced externally and consumed read-only; the pipeline never mutates
/// a candidate after acquisition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchCandidate {
    /// Result title as reported by the search provider
    pub title: String,

    /// Absolute URL of the hit
    pub link: String,

    /// Snippet/description text from the search provider
    pub snippet: String,
}

impl SearchCandidate {
    pub fn new(title: String, link: String, snippet: String) -> Self {
        Self {
            title,
            link,
            snippet,
        }
    }
}

/// A normalized, deduplicated URL with an additive heuristic score.
///
/// The uniqueness key is the normalized URL string (fragment stripped);
/// within one crawl the score is the maximum ever observed for that URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredUrl {
    pub url: String,
    pub score: u32,
}

/// Structured facts extracted from a single page snapshot.
///
/// Created once per page visit and never mutated afterwards. `list_price`
/// and `sale_price` are either empty or a normalized positive integer-amount
/// string, optionally currency-formatted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductSignals {
    /// URL of the page the snapshot came from
    pub url: String,

    /// Head of the page body text (bounded)
    pub text: String,

    /// Text of the block the product title was found in, if any
    pub title_block_text: String,

    /// Text of the block the price labels were found in, if any
    pub price_block_text: String,

    /// Lines of page text that look like prices (bounded)
    pub price_lines: Vec<String>,

    /// Detected currency code ("KRW", "USD", ...) or empty when unknown
    pub currency_hint: String,

    /// Product image source URL, if any
    pub image_src: String,

    /// Resolved product name, or empty when no candidate survived
    pub product_name: String,

    pub list_price: String,
    pub sale_price: String,

    /// Crawl relevance score of the page this record came from
    pub score: u32,
}

impl ProductSignals {
    /// All-empty record carrying only the source URL. Used when extraction
    /// fails internally so downstream steps degrade instead of aborting.
    pub fn empty(url: &str) -> Self {
        Self {
            url: url.to_string(),
            ..Self::default()
        }
    }

    /// True when at least one price field is populated.
    pub fn has_price(&self) -> bool {
        !self.list_price.is_empty() || !self.sale_price.is_empty()
    }

    /// True when the record carries both a name and a price.
    pub fn is_resolved(&self) -> bool {
        !self.product_name.is_empty() && self.has_price()
    }
}

/// A discovered in-site GET search endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchFormDescriptor {
    /// Form action, resolved to an absolute URL
    pub action: String,

    /// Form method, lowercased; anything other than "get" invalidates
    /// the descriptor
    pub method: String,

    /// Name attribute of the search input
    pub input_name: String,
}

impl SearchFormDescriptor {
    pub fn is_valid(&self) -> bool {
        self.method.eq_ignore_ascii_case("get") && !self.input_name.is_empty()
    }
}

/// Debug context for one search-form probe attempt.
///
/// Always carries enough detail to reconstruct why the attempt succeeded
/// or failed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchProbeInfo {
    /// Keyword submitted on this attempt
    pub keyword: String,

    /// Submission URL actually navigated to, or empty when the attempt
    /// failed before navigation
    pub submitted_url: String,

    /// Result page text contained the product name or submitted keyword
    pub name_hit: bool,

    /// Result page text contained a price-looking amount
    pub price_hit: bool,

    /// Machine-readable outcome reason
    pub reason: String,
}

/// Outcome of probing a site's search form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchFormProbeResult {
    /// Whether the site search returned results naming the product.
    /// Driven by `name_hit` only; `price_hit` is a secondary signal.
    pub available: bool,

    /// The attempt that decided the outcome (last attempt on failure)
    pub info: SearchProbeInfo,

    /// Every attempt made, in order
    pub history: Vec<SearchProbeInfo>,
}

/// One row of a search-result listing.
///
/// Invariant: never constructed unless `product_name` and at least one of
/// the price fields are non-empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchFormProductItem {
    pub url: String,
    pub product_name: String,
    pub list_price: String,
    pub sale_price: String,
    pub image_src: String,
    pub score: u32,

    /// Oracle-supplied reason this row was considered a match
    pub reason: String,

    /// Keyword of the attempt URL this row came from
    pub keyword_used: String,
}

/// Terminal record of one discovery request, handed to the report sink
/// whether the request completed or failed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductReport {
    /// Product keyword the request was made for
    pub keyword: String,

    /// Confirmed official homepage, or empty when verification failed
    pub homepage: String,

    /// Product-detail URL the facts were extracted from, if any
    pub product_url: String,

    pub product_name: String,
    pub list_price: String,
    pub sale_price: String,
    pub image_src: String,
    pub currency_hint: String,

    /// Whether an in-site search form was confirmed usable
    pub search_form_available: bool,

    /// Confirmed search-result URL, narrowed to the most specific probed
    /// attempt when the collected items allow it
    pub search_form_confirmed_url: String,

    /// Collected search-result rows, best first, at most ten
    pub search_items: Vec<SearchFormProductItem>,

    /// Sale price exceeded list price in the DOM signals and the oracle
    /// values were preferred
    pub price_corrected: bool,

    /// Human-readable failure message; empty on success
    pub failure: String,
}

impl ProductReport {
    pub fn failed(keyword: &str, message: String) -> Self {
        Self {
            keyword: keyword.to_string(),
            failure: message,
            ..Self::default()
        }
    }

    pub fn is_failure(&self) -> bool {
        !self.failure.is_empty()
    }
}
