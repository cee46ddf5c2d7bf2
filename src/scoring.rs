//! Relevance scoring for candidate links.
//!
//! Pure functions over a URL / anchor-text pair and a target keyword; no
//! external state. Higher scores mean "more likely a product-detail page".

/// Path and query markers that suggest a product-detail or listing URL.
/// Each marker present in the lowercased URL adds one point; markers may
/// overlap and there is no upper cap.
const PRODUCT_URL_MARKERS: [&str; 14] = [
    "/product",
    "/products",
    "/item",
    "/goods",
    "/detail",
    "/shop/",
    "product_no=",
    "goods_id=",
    "goods_no=",
    "item_id=",
    "itemid=",
    "category=",
    "cate_no=",
    "pid=",
];

/// Score a URL by its product-detail markers.
pub fn score_product_url(url: &str) -> u32 {
    let url = url.to_lowercase();
    PRODUCT_URL_MARKERS
        .iter()
        .filter(|marker| url.contains(*marker))
        .count() as u32
}

/// Score how strongly the keyword appears in the URL itself.
///
/// An exact whitespace-stripped keyword substring scores 3; otherwise one
/// point per keyword token (length >= 2) found as a substring.
pub fn score_keyword_match(url: &str, keyword: &str) -> u32 {
    let url = url.to_lowercase();
    let compact: String = keyword.split_whitespace().collect::<String>().to_lowercase();
    if !compact.is_empty() && url.contains(&compact) {
        return 3;
    }
    token_hits(&url, keyword)
}

/// Score how strongly the keyword appears in the anchor text.
///
/// Same token logic as [`score_keyword_match`] but an exact match scores 4:
/// visible text is a stronger relevance signal than a URL substring.
pub fn score_keyword_text(text: &str, keyword: &str) -> u32 {
    let text = text.to_lowercase();
    let compact: String = keyword.split_whitespace().collect::<String>().to_lowercase();
    if !compact.is_empty() && text.contains(&compact) {
        return 4;
    }
    token_hits(&text, keyword)
}

/// Combined candidate score: URL markers + keyword-in-URL + keyword-in-text.
/// A candidate scoring 0 is never added to the crawl candidate set.
pub fn score_candidate(url: &str, anchor_text: &str, keyword: &str) -> u32 {
    score_product_url(url)
        + score_keyword_match(url, keyword)
        + score_keyword_text(anchor_text, keyword)
}

fn token_hits(haystack: &str, keyword: &str) -> u32 {
    keyword
        .split_whitespace()
        .map(|token| token.to_lowercase())
        .filter(|token| token.chars().count() >= 2 && haystack.contains(token.as_str()))
        .count() as u32
}
