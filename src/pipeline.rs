//! End-to-end discovery pipeline.
//!
//! One logical task per request, executed as a strictly sequential chain
//! of awaited steps: candidate acquisition, official-site verification,
//! bounded crawl, signal extraction, search probing and collection, oracle
//! reconciliation, and report assembly. There is no fan-out across pages
//! or candidates; one browser session exists at a time and is closed on
//! every exit path.

use std::time::Duration;

use url::Url;

use crate::browser::{BrowserSession, WebDriverSession};
use crate::config::DiscoveryConfig;
use crate::crawlers::site::{self, CrawlOutcome};
use crate::error::ScoutError;
use crate::price::PriceNormalizer;
use crate::providers::oracle::{self, ChatOracle, OracleProductFacts};
use crate::providers::search_api::{RawFetcher, WebSearchApi};
use crate::results::{ProductReport, ProductSignals, SearchFormProbeResult};
use crate::search::collect::{self, CollectOutcome};
use crate::search::probe::{self, ProbeOptions};
use crate::signals::SignalExtractor;
use crate::store::ReportSink;

/// Most keywords handed to the search probe.
const MAX_PROBE_KEYWORDS: usize = 4;

/// Everything gathered while the browser session was open.
struct BrowserPhase {
    crawl: CrawlOutcome,
    signals: Option<ProductSignals>,
    probe: Option<SearchFormProbeResult>,
    collected: Option<CollectOutcome>,
}

/// Run one discovery request end to end.
///
/// Fatal errors (missing credentials, upstream API failures, no reachable
/// WebDriver) abort with a [`ScoutError`]; everything else degrades into a
/// report with empty fields or a failure message.
pub async fn run_request(
    keyword: &str,
    brand: Option<&str>,
    config: &DiscoveryConfig,
    search_api: &dyn WebSearchApi,
    oracle: &dyn ChatOracle,
    fetcher: &dyn RawFetcher,
) -> Result<ProductReport, ScoutError> {
    config.require_credentials()?;

    let query = build_query(keyword, brand);
    ::log::info!("acquiring web-search candidates for \"{}\"", query);
    let candidates = search_api.search(&query).await?;
    if candidates.is_empty() {
        return Ok(ProductReport::failed(
            keyword,
            format!("no web-search results for \"{query}\""),
        ));
    }

    let verdict = oracle::verify_official_site(oracle, keyword, &candidates).await?;
    let (homepage_raw, priority_keywords) = match verdict {
        Some(verdict) => (verdict.homepage, verdict.priority_keywords),
        None => (candidates[0].link.clone(), Vec::new()),
    };
    let Some(homepage) =
        normalize_homepage(&homepage_raw).or_else(|| normalize_homepage(&candidates[0].link))
    else {
        return Ok(ProductReport::failed(
            keyword,
            format!("verified homepage is not a usable URL: {homepage_raw}"),
        ));
    };
    ::log::info!("confirmed homepage: {}", homepage);

    let mut session = WebDriverSession::connect(
        &config.webdriver_url,
        Duration::from_secs(config.nav_timeout_secs),
    )
    .await?;
    let phase = browser_phase(
        &mut session,
        fetcher,
        oracle,
        &homepage,
        keyword,
        &priority_keywords,
        config,
    )
    .await;
    if let Err(e) = session.close().await {
        ::log::warn!("failed to close browser session: {}", e);
    }
    let phase = phase?;

    assemble_report(oracle, keyword, &homepage, phase).await
}

/// Run a request and hand the report to the sink, failed requests
/// included. Only a sink failure surfaces as an error.
pub async fn run_and_record(
    keyword: &str,
    brand: Option<&str>,
    config: &DiscoveryConfig,
    search_api: &dyn WebSearchApi,
    oracle: &dyn ChatOracle,
    fetcher: &dyn RawFetcher,
    sink: &dyn ReportSink,
) -> Result<ProductReport, ScoutError> {
    let report = match run_request(keyword, brand, config, search_api, oracle, fetcher).await {
        Ok(report) => report,
        Err(error) => {
            ::log::error!("request for \"{}\" failed: {}", keyword, error);
            ProductReport::failed(keyword, error.to_string())
        }
    };
    sink.persist(&report).await?;
    Ok(report)
}

/// Crawl, extract, and (when needed) probe the site search, all within
/// one exclusively owned browser session.
async fn browser_phase(
    session: &mut dyn BrowserSession,
    fetcher: &dyn RawFetcher,
    oracle: &dyn ChatOracle,
    homepage: &str,
    keyword: &str,
    priority_keywords: &[String],
    config: &DiscoveryConfig,
) -> Result<BrowserPhase, ScoutError> {
    let crawl = site::crawl(session, homepage, keyword).await;

    let extractor = SignalExtractor::new();
    let mut signals: Option<ProductSignals> = None;
    for candidate in crawl.candidates.iter().take(config.max_extract_candidates) {
        if let Err(e) = session.goto(&candidate.url).await {
            ::log::warn!("extraction visit to {} failed: {}", candidate.url, e);
            continue;
        }
        let Ok(html) = session.source().await else {
            continue;
        };
        let mut extracted = extractor.extract(&candidate.url, &html);
        extracted.score = candidate.score;
        let resolved = extracted.is_resolved();
        if signals.is_none() || resolved {
            signals = Some(extracted);
        }
        if resolved {
            // First fully resolved page wins; remaining candidates are skipped
            break;
        }
    }

    let mut probe_result = None;
    let mut collected = None;
    let need_search = signals.as_ref().map(|s| !s.is_resolved()).unwrap_or(true);
    if need_search {
        let keywords = probe_keywords(keyword, priority_keywords);
        let options = ProbeOptions {
            retry_delay: Duration::from_secs(config.retry_delay_secs),
            ..ProbeOptions::default()
        };
        let result = probe::probe(session, homepage, &keywords, keyword, &options).await;
        if result.available {
            let confirmed = result.info.submitted_url.clone();
            collected = Some(
                collect::collect(
                    session,
                    fetcher,
                    oracle,
                    &confirmed,
                    &keywords,
                    priority_keywords,
                )
                .await?,
            );
        }
        probe_result = Some(result);
    }

    Ok(BrowserPhase {
        crawl,
        signals,
        probe: probe_result,
        collected,
    })
}

/// Merge DOM signals, oracle corrections, and collected search items into
/// the terminal report.
async fn assemble_report(
    oracle: &dyn ChatOracle,
    keyword: &str,
    homepage: &str,
    phase: BrowserPhase,
) -> Result<ProductReport, ScoutError> {
    let price = PriceNormalizer::new();
    let mut report = ProductReport {
        keyword: keyword.to_string(),
        homepage: homepage.to_string(),
        ..Default::default()
    };

    if let Some(probe) = &phase.probe {
        report.search_form_available = probe.available;
        if probe.available {
            report.search_form_confirmed_url = probe.info.submitted_url.clone();
        }
    }
    if let Some(collected) = &phase.collected {
        report.search_items = collected.items.clone();
        if !collected.confirmed_url.is_empty() {
            report.search_form_confirmed_url = collected.confirmed_url.clone();
        }
    }

    if let Some(signals) = &phase.signals {
        let anomalous = sale_exceeds_list(signals, &price);
        if anomalous {
            ::log::warn!(
                "sale price {} exceeds list price {} on {}; deferring to oracle",
                signals.sale_price,
                signals.list_price,
                signals.url
            );
        }
        let facts = if !signals.is_resolved() || anomalous {
            oracle::refine_product_signals(oracle, keyword, signals).await?
        } else {
            None
        };
        let merged = merge_signals(signals, facts.as_ref(), anomalous);
        report.product_url = signals.url.clone();
        report.currency_hint = signals.currency_hint.clone();
        report.product_name = merged.product_name;
        report.list_price = merged.list_price;
        report.sale_price = merged.sale_price;
        report.image_src = merged.image_src;
        report.price_corrected = merged.corrected;
    }

    // No resolved product page: fall back to the best collected item
    if report.product_name.is_empty() {
        if let Some(top) = report.search_items.first() {
            report.product_name = top.product_name.clone();
            report.list_price = top.list_price.clone();
            report.sale_price = top.sale_price.clone();
            if report.image_src.is_empty() {
                report.image_src = top.image_src.clone();
            }
            if !top.url.is_empty() {
                report.product_url = top.url.clone();
            }
        }
    }

    if report.product_name.is_empty() && !report.search_form_available {
        report.failure = format!(
            "no product page or usable in-site search was found \
             ({} pages visited, {} candidate links)",
            phase.crawl.visited.len(),
            phase.crawl.candidates.len()
        );
    }
    Ok(report)
}

fn build_query(keyword: &str, brand: Option<&str>) -> String {
    match brand {
        Some(brand) if !brand.trim().is_empty() => format!("{brand} {keyword} 공식 홈페이지"),
        _ => format!("{keyword} 공식 홈페이지"),
    }
}

/// Priority keywords first, then the product keyword itself, deduplicated
/// case-insensitively and capped.
fn probe_keywords(keyword: &str, priority_keywords: &[String]) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for candidate in priority_keywords
        .iter()
        .map(String::as_str)
        .chain(std::iter::once(keyword))
    {
        let trimmed = candidate.trim();
        if trimmed.is_empty() {
            continue;
        }
        if seen.insert(trimmed.to_lowercase()) {
            keywords.push(trimmed.to_string());
        }
        if keywords.len() >= MAX_PROBE_KEYWORDS {
            break;
        }
    }
    keywords
}

fn normalize_homepage(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw.trim()).ok()?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }
    url.set_fragment(None);
    Some(url.to_string())
}

struct MergedFacts {
    product_name: String,
    list_price: String,
    sale_price: String,
    image_src: String,
    corrected: bool,
}

/// DOM signals win wherever they are populated and consistent; oracle
/// facts fill the gaps. An anomalous markdown (sale above list) flags the
/// record and the oracle's prices replace both DOM values.
fn merge_signals(
    signals: &ProductSignals,
    facts: Option<&OracleProductFacts>,
    anomalous: bool,
) -> MergedFacts {
    let mut merged = MergedFacts {
        product_name: signals.product_name.clone(),
        list_price: signals.list_price.clone(),
        sale_price: signals.sale_price.clone(),
        image_src: signals.image_src.clone(),
        corrected: false,
    };
    let Some(facts) = facts else {
        return merged;
    };

    if merged.product_name.is_empty() && !facts.product_name.trim().is_empty() {
        merged.product_name = facts.product_name.trim().to_string();
    }
    if merged.image_src.is_empty() && !facts.image_src.trim().is_empty() {
        merged.image_src = facts.image_src.trim().to_string();
    }

    if anomalous && (!facts.list_price.is_empty() || !facts.sale_price.is_empty()) {
        merged.list_price = facts.list_price.trim().to_string();
        merged.sale_price = facts.sale_price.trim().to_string();
        merged.corrected = true;
    } else {
        if merged.list_price.is_empty() {
            merged.list_price = facts.list_price.trim().to_string();
        }
        if merged.sale_price.is_empty() {
            merged.sale_price = facts.sale_price.trim().to_string();
        }
    }
    merged
}

fn sale_exceeds_list(signals: &ProductSignals, price: &PriceNormalizer) -> bool {
    match (
        price.extract_amount(&signals.list_price),
        price.extract_amount(&signals.sale_price),
    ) {
        (Some(list), Some(sale)) => sale > list,
        _ => false,
    }
}
