//! Single-page signal extraction.
//!
//! Turns one fully loaded page snapshot into a [`ProductSignals`] record.
//! Extraction never fails: when nothing usable is found the record comes
//! back with empty fields and the original URL, so downstream steps degrade
//! instead of aborting.

use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::dom;
use crate::price::{Currency, PriceNormalizer};
use crate::results::ProductSignals;
use crate::utils::truncate_to;

/// Ordered title sources; the first candidate surviving rejection wins.
const TITLE_SELECTORS: [&str; 10] = [
    "h1",
    "h2.product_name",
    ".product-name",
    ".product_name",
    ".prd_name",
    ".item_name",
    ".goods_name",
    ".infoArea .name",
    r#"meta[property="og:title"]"#,
    "title",
];

/// Phrases that mark a candidate as site chrome rather than a product name.
const DENY_PHRASES: [&str; 13] = [
    "배송",
    "공지",
    "로그인",
    "장바구니",
    "품절",
    "회원가입",
    "고객센터",
    "sold out",
    "shipping",
    "notice",
    "login",
    "cart",
    "검색결과",
];

/// Bare navigation words rejected on exact match only, so real product
/// names containing them still pass.
const NAV_WORDS: [&str; 7] = ["shop", "home", "menu", "search", "more", "new", "best"];

const LIST_PRICE_LABELS: [&str; 4] = ["소비자가", "정가", "시중가", "권장소비자가"];
const SALE_PRICE_LABELS: [&str; 4] = ["판매가", "할인가", "회원가", "특가"];

const LIST_PRICE_SELECTORS: [&str; 5] = [
    "#span_product_price_custom",
    ".price_consumer",
    ".list_price",
    ".origin_price",
    "del",
];
const SALE_PRICE_SELECTORS: [&str; 6] = [
    "#span_product_price_text",
    ".price_sale",
    ".sale_price",
    ".selling_price",
    ".product-price",
    ".price",
];

const TEXT_HEAD_CAP: usize = 1000;
const PRICE_BLOCK_CAP: usize = 800;
const TITLE_BLOCK_CAP: usize = 300;
const PRICE_LINES_CAP: usize = 20;
/// Label-bearing price rows are short; anything longer is a content block.
const LABEL_NODE_MAX_CHARS: usize = 80;

/// Reject candidates that cannot be a product name: empty, at most three
/// characters, purely numeric, a denylisted phrase, or a bare nav word.
pub fn acceptable_product_name(candidate: &str) -> bool {
    let trimmed = candidate
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if trimmed.is_empty() || trimmed.chars().count() <= 3 {
        return false;
    }
    let compact: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    let lower = trimmed.to_lowercase();
    if DENY_PHRASES.iter().any(|phrase| lower.contains(phrase)) {
        return false;
    }
    if NAV_WORDS.iter().any(|word| lower == *word) {
        return false;
    }
    true
}

/// Extractor over parsed page snapshots.
#[derive(Debug, Default)]
pub struct SignalExtractor {
    price: PriceNormalizer,
}

#[derive(Debug, Default)]
struct PriceScan {
    list_raw: String,
    sale_raw: String,
    block: String,
}

impl SignalExtractor {
    pub fn new() -> Self {
        Self {
            price: PriceNormalizer::new(),
        }
    }

    /// Extract a [`ProductSignals`] record from one page snapshot.
    pub fn extract(&self, url: &str, html: &str) -> ProductSignals {
        let doc = Html::parse_document(html);
        let page_url = Url::parse(url).ok();

        let (product_name, title_block_text) = self.resolve_title(&doc);
        let mut scan = self.label_scan(&doc);
        if scan.list_raw.is_empty() && scan.sale_raw.is_empty() {
            self.selector_scan(&doc, &mut scan);
        }
        if scan.sale_raw.is_empty() {
            scan.sale_raw = meta_content(&doc, r#"meta[property="product:price:amount"]"#);
        }

        let text_full = dom::body_text(&doc);
        let price_lines: Vec<String> = dom::text_lines(&doc)
            .into_iter()
            .filter(|line| self.price.looks_like_price(line))
            .take(PRICE_LINES_CAP)
            .collect();

        let currency = self
            .price
            .detect_currency(&scan.list_raw, &scan.sale_raw, &text_full);

        let list_price = self.format_price(&scan.list_raw, currency, &price_lines);
        let sale_price = self.format_price(&scan.sale_raw, currency, &price_lines);
        let image_src = resolve_image(&doc, page_url.as_ref());

        ProductSignals {
            url: url.to_string(),
            text: truncate_to(&text_full, TEXT_HEAD_CAP),
            title_block_text,
            price_block_text: scan.block,
            price_lines,
            currency_hint: currency.hint().to_string(),
            image_src,
            product_name,
            list_price,
            sale_price,
            score: 0,
        }
    }

    fn resolve_title(&self, doc: &Html) -> (String, String) {
        for selector_str in TITLE_SELECTORS {
            let Ok(selector) = Selector::parse(selector_str) else {
                continue;
            };
            for element in doc.select(&selector) {
                let candidate = if element.value().name() == "meta" {
                    element.value().attr("content").unwrap_or("").to_string()
                } else {
                    element_text(element)
                };
                if acceptable_product_name(&candidate) {
                    let block = if element.value().name() == "meta" {
                        String::new()
                    } else {
                        parent_text(element, TITLE_BLOCK_CAP)
                    };
                    let name = candidate
                        .split_whitespace()
                        .collect::<Vec<_>>()
                        .join(" ");
                    return (name, block);
                }
            }
        }
        (String::new(), String::new())
    }

    /// Scan short text nodes for Korean list/sale price labels with an
    /// adjacent won amount, keeping the enclosing block for oracle context.
    fn label_scan(&self, doc: &Html) -> PriceScan {
        let mut scan = PriceScan::default();
        let Ok(selector) = Selector::parse("span, p, li, dt, dd, td, th, strong, em, b") else {
            return scan;
        };

        for element in doc.select(&selector) {
            let text = element_text(element);
            if text.is_empty() || text.chars().count() > LABEL_NODE_MAX_CHARS {
                continue;
            }
            let has_amount = self.price.has_won_amount(&text);
            if !has_amount {
                continue;
            }
            if scan.list_raw.is_empty()
                && LIST_PRICE_LABELS.iter().any(|label| text.contains(label))
            {
                scan.list_raw = text.clone();
                if scan.block.is_empty() {
                    scan.block = parent_text(element, PRICE_BLOCK_CAP);
                }
            } else if scan.sale_raw.is_empty()
                && SALE_PRICE_LABELS.iter().any(|label| text.contains(label))
            {
                scan.sale_raw = text.clone();
                if scan.block.is_empty() {
                    scan.block = parent_text(element, PRICE_BLOCK_CAP);
                }
            }
            if !scan.list_raw.is_empty() && !scan.sale_raw.is_empty() {
                break;
            }
        }
        scan
    }

    /// Fixed-selector fallback for sites without label-adjacent markup.
    fn selector_scan(&self, doc: &Html, scan: &mut PriceScan) {
        for selector_str in LIST_PRICE_SELECTORS {
            if !scan.list_raw.is_empty() {
                break;
            }
            scan.list_raw = first_priced_text(doc, selector_str, &self.price);
        }
        for selector_str in SALE_PRICE_SELECTORS {
            if !scan.sale_raw.is_empty() {
                break;
            }
            scan.sale_raw = first_priced_text(doc, selector_str, &self.price);
        }
    }

    fn format_price(&self, raw: &str, currency: Currency, price_lines: &[String]) -> String {
        if raw.trim().is_empty() {
            return String::new();
        }
        match currency {
            Currency::Krw | Currency::Unknown => self
                .price
                .normalize(raw, currency)
                .unwrap_or_default(),
            _ => self
                .price
                .first_currency_quote(price_lines)
                .unwrap_or_else(|| truncate_to(raw.trim(), 120)),
        }
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn parent_text(element: ElementRef<'_>, cap: usize) -> String {
    element
        .parent()
        .and_then(ElementRef::wrap)
        .map(|parent| truncate_to(&element_text(parent), cap))
        .unwrap_or_default()
}

fn meta_content(doc: &Html, selector_str: &str) -> String {
    let Ok(selector) = Selector::parse(selector_str) else {
        return String::new();
    };
    doc.select(&selector)
        .next()
        .and_then(|el| el.value().attr("content"))
        .unwrap_or("")
        .trim()
        .to_string()
}

fn first_priced_text(doc: &Html, selector_str: &str, price: &PriceNormalizer) -> String {
    let Ok(selector) = Selector::parse(selector_str) else {
        return String::new();
    };
    doc.select(&selector)
        .map(element_text)
        .find(|text| price.looks_like_price(text))
        .unwrap_or_default()
}

fn resolve_image(doc: &Html, page_url: Option<&Url>) -> String {
    let og = meta_content(doc, r#"meta[property="og:image"]"#);
    let raw = if !og.is_empty() {
        og
    } else {
        let Ok(selector) = Selector::parse("img[src]") else {
            return String::new();
        };
        doc.select(&selector)
            .next()
            .and_then(|el| el.value().attr("src"))
            .unwrap_or("")
            .to_string()
    };
    if raw.is_empty() {
        return raw;
    }
    match page_url {
        Some(base) => dom::normalize_url(base, &raw)
            .map(|u| u.to_string())
            .unwrap_or(raw),
        None => raw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRODUCT_PAGE: &str = r#"<html>
    <head>
        <title>브랜드몰</title>
        <meta property="og:image" content="/img/fan_prime.jpg" />
    </head>
    <body>
        <h1>12</h1>
        <h1>배송안내</h1>
        <h1>무선선풍기 FAN PRIME 3</h1>
        <div class="price_area">
            <p>소비자가 79,900원</p>
            <p>판매가 57,900원</p>
        </div>
    </body></html>"#;

    #[test]
    fn test_title_rejection_order() {
        let extractor = SignalExtractor::new();
        let signals = extractor.extract("https://brand.example.com/product/1", PRODUCT_PAGE);
        assert_eq!(signals.product_name, "무선선풍기 FAN PRIME 3");
    }

    #[test]
    fn test_acceptable_product_name_rules() {
        assert!(!acceptable_product_name(""));
        assert!(!acceptable_product_name("12"));
        assert!(!acceptable_product_name("2025"));
        assert!(!acceptable_product_name("배송안내"));
        assert!(!acceptable_product_name("SHOP"));
        assert!(!acceptable_product_name("Home"));
        assert!(acceptable_product_name("무선선풍기 FAN PRIME 3"));
        // A nav word inside a longer name does not reject it
        assert!(acceptable_product_name("Best Home Fan Prime"));
    }

    #[test]
    fn test_label_scan_extracts_both_prices() {
        let extractor = SignalExtractor::new();
        let signals = extractor.extract("https://brand.example.com/product/1", PRODUCT_PAGE);
        assert_eq!(signals.list_price, "79,900원");
        assert_eq!(signals.sale_price, "57,900원");
        assert_eq!(signals.currency_hint, "KRW");
        assert!(signals.price_block_text.contains("판매가"));
        assert!(signals.price_block_text.len() <= 800);
    }

    #[test]
    fn test_image_resolved_against_page() {
        let extractor = SignalExtractor::new();
        let signals = extractor.extract("https://brand.example.com/product/1", PRODUCT_PAGE);
        assert_eq!(signals.image_src, "https://brand.example.com/img/fan_prime.jpg");
    }

    #[test]
    fn test_selector_fallback_when_no_labels() {
        let html = r#"<html><body>
            <h1>무선선풍기 FAN PRIME 3</h1>
            <span class="price">57,900원</span>
        </body></html>"#;
        let extractor = SignalExtractor::new();
        let signals = extractor.extract("https://brand.example.com/p/2", html);
        assert_eq!(signals.sale_price, "57,900원");
        assert!(signals.list_price.is_empty());
    }

    #[test]
    fn test_meta_price_fallback() {
        let html = r#"<html><head>
            <meta property="product:price:amount" content="45000" />
        </head><body><h1>무선선풍기 FAN PRIME 3</h1><p>45,000원에 만나보세요</p></body></html>"#;
        let extractor = SignalExtractor::new();
        let signals = extractor.extract("https://brand.example.com/p/3", html);
        assert_eq!(signals.sale_price, "45,000원");
    }

    #[test]
    fn test_failure_degrades_to_empty_record() {
        let extractor = SignalExtractor::new();
        let signals = extractor.extract("not a url at all", "");
        assert_eq!(signals.url, "not a url at all");
        assert!(signals.product_name.is_empty());
        assert!(!signals.has_price());
    }

    #[test]
    fn test_non_krw_price_uses_currency_quote() {
        let html = r#"<html><body>
            <h1>Fan Prime 3 Cordless Fan</h1>
            <div><span class="price">now $59.99</span></div>
        </body></html>"#;
        let extractor = SignalExtractor::new();
        let signals = extractor.extract("https://brand.example.com/en/p/4", html);
        assert_eq!(signals.currency_hint, "USD");
        assert_eq!(signals.sale_price, "$59.99");
    }

    #[test]
    fn test_price_lines_are_bounded() {
        let mut rows = String::new();
        for i in 0..40 {
            rows.push_str(&format!("<p>{},000원</p>\n", 10 + i));
        }
        let html = format!("<html><body><h1>무선선풍기 FAN PRIME 3</h1>{rows}</body></html>");
        let extractor = SignalExtractor::new();
        let signals = extractor.extract("https://brand.example.com/p/5", &html);
        assert_eq!(signals.price_lines.len(), 20);
    }
}
