//! Bounded breadth-first site crawl.
//!
//! Explores a storefront from its homepage under strict page and depth
//! caps, scoring same-site links as product-page candidates. When the
//! homepage exposes a usable GET search form the crawl short-circuits into
//! search-only mode: the remaining queue is discarded and only the
//! constructed search-result URL is visited.

use std::collections::{HashMap, HashSet, VecDeque};

use scraper::Html;
use url::Url;

use crate::browser::BrowserSession;
use crate::dom::{self, HarvestedLink};
use crate::results::{ScoredUrl, SearchFormDescriptor};
use crate::scoring;

/// Hard cap on distinct pages visited in one crawl invocation.
pub const MAX_CRAWL_PAGES: usize = 5;

/// Depth bound; links below this depth are scored but not followed.
pub const MAX_CRAWL_DEPTH: usize = 2;

/// Category-looking links seeded from the homepage regardless of score.
const CATEGORY_SEED_LIMIT: usize = 5;

/// Whether organic link-following is still allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CrawlMode {
    Exploring,
    SearchOnly,
}

#[derive(Debug, Clone)]
struct QueueEntry {
    url: Url,
    depth: usize,
}

/// Transient crawl state, owned by exactly one crawl invocation.
#[derive(Debug, Default)]
struct CrawlState {
    visited: HashSet<String>,
    visit_order: Vec<String>,
    queue: VecDeque<QueueEntry>,
    scores: HashMap<String, u32>,
}

impl CrawlState {
    /// Marks the URL visited; false when it was already seen.
    fn mark_visited(&mut self, url: &str) -> bool {
        if !self.visited.insert(url.to_string()) {
            return false;
        }
        self.visit_order.push(url.to_string());
        true
    }
}

/// What one crawl produced.
#[derive(Debug, Clone, Default)]
pub struct CrawlOutcome {
    /// Pages visited, in order
    pub visited: Vec<String>,

    /// Product-URL candidates, best score first
    pub candidates: Vec<ScoredUrl>,

    /// Constructed search-result URL when a search form was discovered
    pub search_url: Option<String>,

    /// Same-site URLs observed specifically on the search-result page
    pub search_page_links: Vec<String>,
}

/// Owned results of analyzing one snapshot; the parsed document never
/// crosses an await point.
struct PageAnalysis {
    links: Vec<HarvestedLink>,
    search_form: Option<SearchFormDescriptor>,
}

fn analyze_page(html: &str, page_url: &Url, scan_for_form: bool) -> PageAnalysis {
    let doc = Html::parse_document(html);
    let links = dom::collect_links(&doc, page_url);
    let search_form = if scan_for_form {
        dom::find_search_form(&doc, page_url).ok()
    } else {
        None
    };
    PageAnalysis { links, search_form }
}

/// Crawl a site breadth-first from `start_url`, scoring links against the
/// keyword. Individual page failures are swallowed and the crawl moves on;
/// a completely unreachable site yields an empty outcome, not an error.
pub async fn crawl(
    session: &mut dyn BrowserSession,
    start_url: &str,
    keyword: &str,
) -> CrawlOutcome {
    let mut outcome = CrawlOutcome::default();
    let Ok(mut root) = Url::parse(start_url) else {
        ::log::warn!("crawl start URL did not parse: {}", start_url);
        return outcome;
    };
    root.set_fragment(None);

    let mut state = CrawlState::default();
    let mut mode = CrawlMode::Exploring;
    state.queue.push_back(QueueEntry {
        url: root.clone(),
        depth: 0,
    });

    while state.visited.len() < MAX_CRAWL_PAGES {
        let Some(entry) = state.queue.pop_front() else {
            break;
        };
        let page_key = entry.url.to_string();
        if !state.mark_visited(&page_key) {
            continue;
        }

        ::log::debug!(
            "visiting page {} of {}: {}",
            state.visited.len(),
            MAX_CRAWL_PAGES,
            page_key
        );
        if let Err(e) = session.goto(&page_key).await {
            ::log::warn!("failed to load {}: {}", page_key, e);
            continue;
        }
        let html = match session.source().await {
            Ok(html) => html,
            Err(e) => {
                ::log::warn!("failed to read source of {}: {}", page_key, e);
                continue;
            }
        };

        let scan_for_form =
            mode == CrawlMode::Exploring && entry.depth == 0 && outcome.search_url.is_none();
        let analysis = analyze_page(&html, &entry.url, scan_for_form);

        // Search-form short-circuit: drop the queue, visit only the
        // constructed search-result URL, stop following organic links.
        if let Some(descriptor) = analysis.search_form {
            if let Some(submit) = dom::build_submission_url(&descriptor, keyword) {
                ::log::info!(
                    "search form found on {}; switching to search-only mode",
                    page_key
                );
                state.queue.clear();
                let depth = (entry.depth + 1).min(MAX_CRAWL_DEPTH);
                outcome.search_url = Some(submit.to_string());
                state.queue.push_back(QueueEntry { url: submit, depth });
                mode = CrawlMode::SearchOnly;
                continue;
            }
        }

        let on_search_page = mode == CrawlMode::SearchOnly;
        let mut category_seeded = 0;

        for link in analysis.links {
            if !dom::same_site(&link.url, &root) {
                continue;
            }
            let link_key = link.url.to_string();

            if on_search_page {
                outcome.search_page_links.push(link_key.clone());
            }

            // Seed category listings from the homepage even when they
            // score zero, so depth-1 discovery has somewhere to go.
            if mode == CrawlMode::Exploring
                && entry.depth == 0
                && category_seeded < CATEGORY_SEED_LIMIT
            {
                let lowered = link_key.to_lowercase();
                if lowered.contains("category") || lowered.contains("cate_no=") {
                    state.queue.push_back(QueueEntry {
                        url: link.url.clone(),
                        depth: entry.depth + 1,
                    });
                    category_seeded += 1;
                }
            }

            let score = scoring::score_candidate(&link_key, &link.text, keyword);
            if score == 0 {
                continue;
            }
            let best = state.scores.entry(link_key.clone()).or_insert(0);
            if score > *best {
                *best = score;
            }

            if mode == CrawlMode::Exploring
                && entry.depth < MAX_CRAWL_DEPTH
                && !state.visited.contains(&link_key)
            {
                state.queue.push_back(QueueEntry {
                    url: link.url,
                    depth: entry.depth + 1,
                });
            }
        }
    }

    let mut candidates: Vec<ScoredUrl> = state
        .scores
        .into_iter()
        .map(|(url, score)| ScoredUrl { url, score })
        .collect();
    candidates.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.url.cmp(&b.url)));

    let mut seen = HashSet::new();
    outcome
        .search_page_links
        .retain(|url| seen.insert(url.clone()));

    outcome.visited = state.visit_order;
    outcome.candidates = candidates;
    ::log::info!(
        "crawl finished: {} pages, {} candidates, search form: {}",
        outcome.visited.len(),
        outcome.candidates.len(),
        outcome.search_url.is_some()
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::mock::MockSession;

    const KEYWORD: &str = "fan prime";

    fn page(links: &[(&str, &str)]) -> String {
        let body: String = links
            .iter()
            .map(|(href, text)| format!("<a href=\"{href}\">{text}</a>"))
            .collect();
        format!("<html><body>{body}</body></html>")
    }

    #[tokio::test]
    async fn test_page_cap_holds_on_cyclic_graphs() {
        // Ten pages all linking to each other and back to the start
        let mut session = MockSession::new();
        for i in 0..10 {
            let links: Vec<(String, String)> = (0..10)
                .map(|j| (format!("/product/{j}"), format!("fan prime {j}")))
                .collect();
            let refs: Vec<(&str, &str)> = links
                .iter()
                .map(|(h, t)| (h.as_str(), t.as_str()))
                .collect();
            let url = if i == 0 {
                "https://brand.example.com/".to_string()
            } else {
                format!("https://brand.example.com/product/{i}")
            };
            session = session.with_page(&url, &page(&refs));
        }

        let outcome = crawl(&mut session, "https://brand.example.com/", KEYWORD).await;
        assert_eq!(outcome.visited.len(), MAX_CRAWL_PAGES);
        assert_eq!(session.visited.len(), MAX_CRAWL_PAGES);
        assert!(!outcome.candidates.is_empty());
    }

    #[tokio::test]
    async fn test_search_form_short_circuits_the_queue() {
        let homepage = r#"<html><body>
            <form method="get" action="/search"><input type="search" name="q" /></form>
            <a href="/product/1">fan prime one</a>
            <a href="/product/2">fan prime two</a>
        </body></html>"#;
        let search_page = page(&[
            ("/product/9", "fan prime 9"),
            ("https://other.example.org/x", "elsewhere"),
        ]);

        let mut session = MockSession::new()
            .with_page("https://brand.example.com/", homepage)
            .with_page("https://brand.example.com/search?q=fan+prime", &search_page);

        let outcome = crawl(&mut session, "https://brand.example.com/", KEYWORD).await;
        assert_eq!(
            outcome.search_url.as_deref(),
            Some("https://brand.example.com/search?q=fan+prime")
        );
        // Only the homepage and the search-result page were visited
        assert_eq!(outcome.visited.len(), 2);
        // Off-site links never make it into the search-page observations
        assert_eq!(
            outcome.search_page_links,
            vec!["https://brand.example.com/product/9".to_string()]
        );
    }

    #[tokio::test]
    async fn test_candidate_score_is_maximum_observed() {
        let homepage = page(&[
            ("/product/77", ""),
            ("/category/fans", "카테고리"),
        ]);
        let category = page(&[("/product/77", "fan prime special")]);

        let mut session = MockSession::new()
            .with_page("https://brand.example.com/", &homepage)
            .with_page("https://brand.example.com/category/fans", &category);

        let outcome = crawl(&mut session, "https://brand.example.com/", KEYWORD).await;
        let candidate = outcome
            .candidates
            .iter()
            .find(|c| c.url == "https://brand.example.com/product/77")
            .expect("candidate retained");

        let weak = scoring::score_candidate("https://brand.example.com/product/77", "", KEYWORD);
        let strong = scoring::score_candidate(
            "https://brand.example.com/product/77",
            "fan prime special",
            KEYWORD,
        );
        assert!(strong > weak);
        assert_eq!(candidate.score, strong);
    }

    #[tokio::test]
    async fn test_unreachable_site_yields_empty_outcome() {
        let mut session = MockSession::new();
        let outcome = crawl(&mut session, "https://down.example.com/", KEYWORD).await;
        assert_eq!(outcome.visited.len(), 1);
        assert!(outcome.candidates.is_empty());
        assert!(outcome.search_url.is_none());
    }

    #[tokio::test]
    async fn test_zero_score_links_are_not_candidates() {
        let homepage = page(&[("/about-us", "회사소개")]);
        let mut session =
            MockSession::new().with_page("https://brand.example.com/", &homepage);
        let outcome = crawl(&mut session, "https://brand.example.com/", KEYWORD).await;
        assert!(outcome.candidates.is_empty());
    }
}
