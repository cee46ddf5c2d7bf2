//! Search-result collection.
//!
//! Probes a confirmed search endpoint with a small set of query variants,
//! gathers raw evidence (rendered text, raw response-body excerpts, and
//! structurally detected product cards), hands the evidence to the
//! search-listing oracle, and validates what comes back. At most ten items
//! survive, best first.

use std::collections::HashMap;

use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::browser::BrowserSession;
use crate::dom;
use crate::error::ScoutError;
use crate::price::{Currency, PriceNormalizer};
use crate::providers::oracle::{self, ChatOracle, RawListItem};
use crate::providers::search_api::RawFetcher;
use crate::results::SearchFormProductItem;
use crate::scoring;
use crate::signals::acceptable_product_name;
use crate::utils::truncate_to;

/// Most items kept after validation.
const MAX_ITEMS: usize = 10;

/// Query variants tried per keyword, the confirmed URL included.
const ATTEMPTS_PER_KEYWORD: usize = 3;

/// Query-parameter names tried when rewriting the confirmed URL.
const QUERY_PARAM_NAMES: [&str; 4] = ["q", "keyword", "search", "kwrd"];

const PAGE_TEXT_CAP: usize = 8 * 1024;
const NETWORK_CAP: usize = 10 * 1024;
const CARD_TEXT_CAP: usize = 400;
const CARD_THUMBNAIL_CAP: usize = 5;
const CARDS_PER_ATTEMPT: usize = 12;

/// Items naming a priority keyword outrank the rest by this margin.
const PRIORITY_SCORE: u32 = 10;

/// A DOM region heuristically identified as one product in a listing.
#[derive(Debug, Clone)]
pub struct CandidateCard {
    pub detail_url: String,
    pub thumbnails: Vec<String>,
    pub text: String,
}

/// What one attempt URL yielded, for the debug trace.
#[derive(Debug, Clone)]
pub struct AttemptTrace {
    pub url: String,
    pub keyword: String,
    pub text_len: usize,
    pub network_len: usize,
    pub card_count: usize,
    pub kept: bool,
}

/// Validated collection outcome.
#[derive(Debug, Clone, Default)]
pub struct CollectOutcome {
    /// Validated items, best first, at most [`MAX_ITEMS`]
    pub items: Vec<SearchFormProductItem>,

    /// Confirmed search URL, narrowed to the attempt URL whose keyword the
    /// first resolved item reports
    pub confirmed_url: String,

    /// Per-attempt trace for diagnosing empty collections
    pub attempts: Vec<AttemptTrace>,
}

struct AttemptEvidence {
    url: String,
    keyword: String,
    page_text: String,
    network_excerpt: String,
    cards: Vec<CandidateCard>,
}

/// Collect and validate product rows from the confirmed search endpoint.
///
/// Only the oracle HTTP exchange can fail; every per-attempt failure
/// (navigation, fetch, empty page) just drops that attempt.
pub async fn collect(
    session: &mut dyn BrowserSession,
    fetcher: &dyn RawFetcher,
    oracle: &dyn ChatOracle,
    confirmed_url: &str,
    keywords: &[String],
    priority_keywords: &[String],
) -> Result<CollectOutcome, ScoutError> {
    let mut outcome = CollectOutcome {
        confirmed_url: confirmed_url.to_string(),
        ..Default::default()
    };
    let Ok(confirmed) = Url::parse(confirmed_url) else {
        ::log::warn!("confirmed search URL did not parse: {}", confirmed_url);
        return Ok(outcome);
    };

    let mut evidence: Vec<AttemptEvidence> = Vec::new();
    for keyword in keywords {
        for url in attempt_urls(&confirmed, keyword) {
            let attempt = gather_attempt(session, fetcher, url, keyword).await;
            let kept = !attempt.page_text.is_empty() || !attempt.network_excerpt.is_empty();
            outcome.attempts.push(AttemptTrace {
                url: attempt.url.clone(),
                keyword: keyword.clone(),
                text_len: attempt.page_text.len(),
                network_len: attempt.network_excerpt.len(),
                card_count: attempt.cards.len(),
                kept,
            });
            if kept {
                evidence.push(attempt);
            }
        }
    }

    if evidence.is_empty() {
        ::log::info!("no search-result evidence gathered; skipping listing oracle");
        return Ok(outcome);
    }

    let blocks: Vec<String> = evidence.iter().map(evidence_block).collect();
    let raw_items = oracle::extract_search_listing(oracle, keywords, &blocks).await?;

    let price = PriceNormalizer::new();
    outcome.items = validate_items(raw_items, &confirmed, priority_keywords, &price);

    // Narrow provenance: when the first URL-bearing item reports the
    // keyword of a probed attempt, that attempt URL becomes the confirmed
    // one persisted with the request. A rewritten variant outranks the
    // base URL, which every keyword shares.
    if let Some(first) = outcome.items.iter().find(|item| !item.url.is_empty()) {
        if !first.keyword_used.is_empty() {
            let base = confirmed.to_string();
            let narrowed = evidence
                .iter()
                .find(|e| e.keyword == first.keyword_used && e.url != base)
                .or_else(|| evidence.iter().find(|e| e.keyword == first.keyword_used));
            if let Some(attempt) = narrowed {
                outcome.confirmed_url = attempt.url.clone();
            }
        }
    }

    ::log::info!(
        "collected {} validated items from {} attempts",
        outcome.items.len(),
        outcome.attempts.len()
    );
    Ok(outcome)
}

/// The confirmed URL itself plus each query-parameter rewrite, deduplicated
/// and capped to [`ATTEMPTS_PER_KEYWORD`].
fn attempt_urls(confirmed: &Url, keyword: &str) -> Vec<Url> {
    let mut urls = vec![confirmed.clone()];
    for name in QUERY_PARAM_NAMES {
        let mut variant = confirmed.clone();
        dom::set_query_param(&mut variant, name, keyword);
        urls.push(variant);
    }
    let mut seen = std::collections::HashSet::new();
    urls.retain(|u| seen.insert(u.to_string()));
    urls.truncate(ATTEMPTS_PER_KEYWORD);
    urls
}

async fn gather_attempt(
    session: &mut dyn BrowserSession,
    fetcher: &dyn RawFetcher,
    url: Url,
    keyword: &str,
) -> AttemptEvidence {
    let mut attempt = AttemptEvidence {
        url: url.to_string(),
        keyword: keyword.to_string(),
        page_text: String::new(),
        network_excerpt: String::new(),
        cards: Vec::new(),
    };

    match session.goto(attempt.url.as_str()).await {
        Ok(()) => {
            if let Ok(html) = session.source().await {
                attempt.page_text = truncate_to(&dom::snapshot_text(&html), PAGE_TEXT_CAP);
                attempt.cards = extract_candidate_cards(&html, &url);
            }
        }
        Err(e) => {
            ::log::debug!("attempt navigation to {} failed: {}", attempt.url, e);
        }
    }

    let fetched = fetcher.fetch_text(attempt.url.as_str()).await;
    if !fetched.is_empty() && texty_content_type(&fetched.content_type) {
        attempt.network_excerpt = truncate_to(&fetched.body, NETWORK_CAP);
    }

    attempt
}

fn texty_content_type(content_type: &str) -> bool {
    let lowered = content_type.to_lowercase();
    lowered.is_empty()
        || lowered.contains("json")
        || lowered.contains("html")
        || lowered.contains("text")
}

/// Anchor-based card detection: a detail-looking href paired with the
/// nearest ancestor that carries a thumbnail, deduplicated by detail URL
/// with thumbnail accumulation.
pub fn extract_candidate_cards(html: &str, base: &Url) -> Vec<CandidateCard> {
    let doc = Html::parse_document(html);
    let anchors = Selector::parse("a[href]").expect("valid selector");
    let images = Selector::parse("img[src]").expect("valid selector");

    let mut cards: Vec<CandidateCard> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for anchor in doc.select(&anchors) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Some(detail) = dom::normalize_url(base, href) else {
            continue;
        };
        if scoring::score_product_url(detail.as_str()) == 0 {
            continue;
        }

        let container = card_container(anchor, &images);
        let thumbnails: Vec<String> = container
            .select(&images)
            .filter_map(|img| img.value().attr("src"))
            .filter_map(|src| dom::normalize_url(base, src))
            .map(|u| u.to_string())
            .take(CARD_THUMBNAIL_CAP)
            .collect();
        let text = truncate_to(
            &container
                .text()
                .collect::<Vec<_>>()
                .join(" ")
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" "),
            CARD_TEXT_CAP,
        );

        let key = detail.to_string();
        match index.get(&key).copied() {
            Some(at) => {
                // Same detail URL seen again: accumulate new thumbnails
                let card = &mut cards[at];
                for thumb in thumbnails {
                    if card.thumbnails.len() >= CARD_THUMBNAIL_CAP {
                        break;
                    }
                    if !card.thumbnails.contains(&thumb) {
                        card.thumbnails.push(thumb);
                    }
                }
                if card.text.is_empty() {
                    card.text = text;
                }
            }
            None => {
                index.insert(key.clone(), cards.len());
                cards.push(CandidateCard {
                    detail_url: key,
                    thumbnails,
                    text,
                });
            }
        }
    }

    cards
}

/// Nearest ancestor (the anchor itself included) containing an image.
fn card_container<'a>(anchor: ElementRef<'a>, images: &Selector) -> ElementRef<'a> {
    if anchor.select(images).next().is_some() {
        return anchor;
    }
    for node in anchor.ancestors() {
        if let Some(element) = ElementRef::wrap(node) {
            if element.select(images).next().is_some() {
                return element;
            }
        }
    }
    anchor
}

fn evidence_block(attempt: &AttemptEvidence) -> String {
    let cards: String = attempt
        .cards
        .iter()
        .take(CARDS_PER_ATTEMPT)
        .map(|card| {
            format!(
                "- url: {} | thumbnail: {} | text: {}\n",
                card.detail_url,
                card.thumbnails.first().map(String::as_str).unwrap_or(""),
                card.text
            )
        })
        .collect();
    format!(
        "[attempt keyword={} url={}]\npage text:\n{}\nnetwork excerpt:\n{}\ncards:\n{}",
        attempt.keyword, attempt.url, attempt.page_text, attempt.network_excerpt, cards
    )
}

/// Keep only items with an acceptable product name and at least one price,
/// resolve their URLs, score by priority keywords, sort, truncate.
fn validate_items(
    raw_items: Vec<RawListItem>,
    confirmed: &Url,
    priority_keywords: &[String],
    price: &PriceNormalizer,
) -> Vec<SearchFormProductItem> {
    let mut items = Vec::new();
    for raw in raw_items {
        let name = raw
            .product_name
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        if !acceptable_product_name(&name) {
            continue;
        }
        let list_price = normalize_item_price(&raw.list_price, price);
        let sale_price = normalize_item_price(&raw.sale_price, price);
        if list_price.is_empty() && sale_price.is_empty() {
            continue;
        }

        let url = if raw.url.trim().is_empty() {
            String::new()
        } else {
            dom::normalize_url(confirmed, raw.url.trim())
                .map(|u| u.to_string())
                .unwrap_or_default()
        };

        let haystack = format!("{} {} {}", name, url, raw.reason).to_lowercase();
        let score = if priority_keywords
            .iter()
            .filter(|k| !k.trim().is_empty())
            .any(|k| haystack.contains(&k.to_lowercase()))
        {
            PRIORITY_SCORE
        } else {
            0
        };

        items.push(SearchFormProductItem {
            url,
            product_name: name,
            list_price,
            sale_price,
            image_src: raw.image_src.trim().to_string(),
            score,
            reason: raw.reason,
            keyword_used: raw.keyword_used,
        });
    }

    // Stable sort keeps the oracle's own ordering within a score band
    items.sort_by(|a, b| b.score.cmp(&a.score));
    items.truncate(MAX_ITEMS);
    items
}

/// Canonicalize an oracle-reported price: KRW amounts get the grouped-won
/// rendering, other currencies keep their original format, and a field
/// without digits is treated as empty.
fn normalize_item_price(raw: &str, price: &PriceNormalizer) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() || !trimmed.chars().any(|c| c.is_ascii_digit()) {
        return String::new();
    }
    match price.detect_currency(trimmed, "", "") {
        Currency::Krw => price.normalize(trimmed, Currency::Krw).unwrap_or_default(),
        _ => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::mock::MockSession;
    use crate::providers::oracle::mock::MockOracle;
    use crate::providers::search_api::mock::MockFetcher;

    const CONFIRMED: &str = "https://brand.example.com/search?q=fan+prime";

    fn keywords(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    const LISTING: &str = r#"<html><body>
        <a href="/">SHOP</a>
        <a href="/">Home</a>
        <div class="card">
            <a href="/product/77"><img src="/img/t77.jpg" />무선선풍기 FAN PRIME 3 — 57,900원</a>
        </div>
    </body></html>"#;

    #[tokio::test]
    async fn test_denylisted_rows_are_excluded() {
        let mut session = MockSession::new().with_page(CONFIRMED, LISTING);
        let fetcher = MockFetcher::new();
        let oracle = MockOracle::new(&[r#"{"items": [
            {"product_name": "SHOP", "sale_price": "1,000원", "keyword_used": "fan prime"},
            {"product_name": "Home", "sale_price": "2,000원", "keyword_used": "fan prime"},
            {"url": "/product/77", "product_name": "무선선풍기 FAN PRIME 3",
             "sale_price": "57,900원", "keyword_used": "fan prime"}
        ]}"#]);

        let outcome = collect(
            &mut session,
            &fetcher,
            &oracle,
            CONFIRMED,
            &keywords(&["fan prime"]),
            &keywords(&["무선선풍기"]),
        )
        .await
        .unwrap();

        assert_eq!(outcome.items.len(), 1);
        let item = &outcome.items[0];
        assert_eq!(item.product_name, "무선선풍기 FAN PRIME 3");
        assert_eq!(item.sale_price, "57,900원");
        assert!(item.list_price.is_empty());
        assert_eq!(item.url, "https://brand.example.com/product/77");
        assert_eq!(item.score, PRIORITY_SCORE);
    }

    #[tokio::test]
    async fn test_confirmed_url_narrows_to_matching_attempt() {
        let variant = "https://brand.example.com/search?q=%EB%AC%B4%EC%84%A0%EC%84%A0%ED%92%8D%EA%B8%B0";
        let mut session = MockSession::new()
            .with_page(CONFIRMED, LISTING)
            .with_page(variant, LISTING);
        let fetcher = MockFetcher::new();
        let oracle = MockOracle::new(&[r#"{"items": [
            {"url": "/product/77", "product_name": "무선선풍기 FAN PRIME 3",
             "sale_price": "57,900원", "keyword_used": "무선선풍기"}
        ]}"#]);

        let outcome = collect(
            &mut session,
            &fetcher,
            &oracle,
            CONFIRMED,
            &keywords(&["fan prime", "무선선풍기"]),
            &[],
        )
        .await
        .unwrap();

        assert_eq!(outcome.items.len(), 1);
        assert_eq!(outcome.confirmed_url, variant);
    }

    #[tokio::test]
    async fn test_attempts_without_evidence_skip_the_oracle() {
        // No pages load and the fetcher has nothing: the oracle must not
        // be consulted at all.
        let mut session = MockSession::new();
        let fetcher = MockFetcher::new();
        let oracle = MockOracle::new(&[r#"{"items": []}"#]);

        let outcome = collect(
            &mut session,
            &fetcher,
            &oracle,
            CONFIRMED,
            &keywords(&["fan prime"]),
            &[],
        )
        .await
        .unwrap();

        assert!(outcome.items.is_empty());
        assert_eq!(outcome.confirmed_url, CONFIRMED);
        assert_eq!(oracle.call_count(), 0);
        assert!(outcome.attempts.iter().all(|a| !a.kept));
    }

    #[tokio::test]
    async fn test_network_evidence_alone_keeps_an_attempt() {
        let mut session = MockSession::new();
        let fetcher = MockFetcher::new().with_body(
            CONFIRMED,
            r#"{"results": [{"name": "FAN PRIME 3", "price": 57900}]}"#,
            "application/json",
        );
        let oracle = MockOracle::new(&[r#"{"items": [
            {"product_name": "무선선풍기 FAN PRIME 3", "sale_price": "57,900원",
             "keyword_used": "fan prime"}
        ]}"#]);

        let outcome = collect(
            &mut session,
            &fetcher,
            &oracle,
            CONFIRMED,
            &keywords(&["fan prime"]),
            &[],
        )
        .await
        .unwrap();

        assert_eq!(oracle.call_count(), 1);
        assert_eq!(outcome.items.len(), 1);
        // The item carried no URL, so the confirmed URL stays as probed
        assert_eq!(outcome.confirmed_url, CONFIRMED);
    }

    #[test]
    fn test_extract_candidate_cards_dedupes_and_accumulates() {
        let html = r#"<html><body>
            <div class="card">
                <a href="/product/77"><img src="/img/a.jpg" /></a>
                <a href="/product/77">무선선풍기 FAN PRIME 3 57,900원</a>
            </div>
            <div class="card">
                <a href="/product/78"><img src="/img/b.jpg" />다른 상품 12,000원</a>
            </div>
            <a href="/notice/1">공지사항</a>
        </body></html>"#;
        let base = Url::parse("https://brand.example.com/search").unwrap();
        let cards = extract_candidate_cards(html, &base);

        assert_eq!(cards.len(), 2);
        let first = &cards[0];
        assert_eq!(first.detail_url, "https://brand.example.com/product/77");
        assert_eq!(
            first.thumbnails,
            vec!["https://brand.example.com/img/a.jpg".to_string()]
        );
        assert!(first.text.contains("FAN PRIME 3"));
    }

    #[test]
    fn test_attempt_urls_dedupe_and_cap() {
        let confirmed = Url::parse(CONFIRMED).unwrap();
        let urls = attempt_urls(&confirmed, "fan prime");
        assert_eq!(urls.len(), ATTEMPTS_PER_KEYWORD);
        // The q-variant equals the confirmed URL and must not repeat
        assert_eq!(urls[0].as_str(), CONFIRMED);
        assert!(urls[1].as_str().contains("keyword=fan+prime"));
    }

    #[test]
    fn test_validate_items_caps_at_ten() {
        let confirmed = Url::parse(CONFIRMED).unwrap();
        let price = PriceNormalizer::new();
        let raw: Vec<RawListItem> = (0..15)
            .map(|i| RawListItem {
                product_name: format!("무선선풍기 FAN PRIME {i}"),
                sale_price: "57,900원".to_string(),
                ..Default::default()
            })
            .collect();
        let items = validate_items(raw, &confirmed, &[], &price);
        assert_eq!(items.len(), MAX_ITEMS);
    }
}
