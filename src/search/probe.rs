//! In-site search form probing.
//!
//! Determines whether a storefront's own search returns results naming the
//! product, by locating a GET search form, submitting each candidate
//! keyword, and checking the result page text. Every attempt leaves a
//! [`SearchProbeInfo`] trace so a failed probe can be diagnosed offline.

use std::time::Duration;

use scraper::Html;
use url::Url;

use crate::browser::BrowserSession;
use crate::dom::{self, FormScanError};
use crate::price::PriceNormalizer;
use crate::results::{SearchFormDescriptor, SearchFormProbeResult, SearchProbeInfo};
use crate::utils::normalize_for_match;

const REASON_NAME_MATCH: &str = "name_match";
const REASON_NO_NAME_MATCH: &str = "no_name_match";
const REASON_HOMEPAGE_UNREACHABLE: &str = "homepage_unreachable";
const REASON_NAVIGATION_FAILED: &str = "navigation_failed";

/// Probe pacing. Storefront search widgets often hydrate asynchronously,
/// so a second full pass after a settle delay meaningfully raises the hit
/// rate without unbounded retrying.
#[derive(Debug, Clone)]
pub struct ProbeOptions {
    /// Delay before the second full keyword pass
    pub retry_delay: Duration,

    /// Delay after clicking a search trigger before rescanning
    pub trigger_settle: Duration,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(2),
            trigger_settle: Duration::from_millis(700),
        }
    }
}

/// Probe the site search from its homepage.
///
/// Keywords are tried in order; the first one whose result page names the
/// product (or echoes the keyword) wins and preempts the rest. When the
/// whole list misses, the list is retried once after `retry_delay`, and
/// the final result carries the last attempt's info plus the full history.
pub async fn probe(
    session: &mut dyn BrowserSession,
    homepage: &str,
    keywords: &[String],
    product_name: &str,
    options: &ProbeOptions,
) -> SearchFormProbeResult {
    let price = PriceNormalizer::new();
    let mut history: Vec<SearchProbeInfo> = Vec::new();

    for pass in 0..2 {
        if pass == 1 {
            ::log::info!("search probe first pass missed; retrying after settle delay");
            tokio::time::sleep(options.retry_delay).await;
        }
        for keyword in keywords {
            let info = try_submit(session, homepage, keyword, product_name, &price, options).await;
            let hit = info.name_hit;
            history.push(info.clone());
            if hit {
                return SearchFormProbeResult {
                    available: true,
                    info,
                    history,
                };
            }
        }
    }

    let info = history.last().cloned().unwrap_or_default();
    SearchFormProbeResult {
        available: false,
        info,
        history,
    }
}

/// One submission attempt for one keyword. Failure to even build a
/// submission URL is reported with a typed reason and no navigation.
async fn try_submit(
    session: &mut dyn BrowserSession,
    homepage: &str,
    keyword: &str,
    product_name: &str,
    price: &PriceNormalizer,
    options: &ProbeOptions,
) -> SearchProbeInfo {
    let mut info = SearchProbeInfo {
        keyword: keyword.to_string(),
        ..Default::default()
    };

    if let Err(e) = session.goto(homepage).await {
        ::log::warn!("probe could not load homepage {}: {}", homepage, e);
        info.reason = REASON_HOMEPAGE_UNREACHABLE.to_string();
        return info;
    }
    let Ok(source) = session.source().await else {
        info.reason = REASON_HOMEPAGE_UNREACHABLE.to_string();
        return info;
    };
    let base = match session.current_url().await {
        Ok(current) => Url::parse(&current).ok(),
        Err(_) => None,
    }
    .or_else(|| Url::parse(homepage).ok());
    let Some(base) = base else {
        info.reason = FormScanError::InvalidActionUrl.reason().to_string();
        return info;
    };

    let descriptor = match scan_snapshot(&source, &base) {
        Ok(descriptor) => descriptor,
        Err(FormScanError::FormNotFound {
            trigger_id: Some(id),
        }) => {
            // JS-toggled search overlays: click the bare input's trigger
            // and rescan once after a short settle.
            ::log::debug!("search input #{} has no enclosing form; clicking it", id);
            match trigger_retry(session, &id, &base, options).await {
                Some(descriptor) => descriptor,
                None => {
                    info.reason = FormScanError::FormNotFound { trigger_id: None }
                        .reason()
                        .to_string();
                    return info;
                }
            }
        }
        Err(failure) => {
            info.reason = failure.reason().to_string();
            return info;
        }
    };

    let Some(submit_url) = dom::build_submission_url(&descriptor, keyword) else {
        info.reason = FormScanError::InvalidActionUrl.reason().to_string();
        return info;
    };
    info.submitted_url = submit_url.to_string();

    if let Err(e) = session.goto(submit_url.as_str()).await {
        ::log::warn!("probe navigation to {} failed: {}", submit_url, e);
        info.reason = REASON_NAVIGATION_FAILED.to_string();
        return info;
    }
    let text = session
        .source()
        .await
        .map(|html| dom::snapshot_text(&html))
        .unwrap_or_default();

    let haystack = normalize_for_match(&text);
    let name_hit = (!product_name.trim().is_empty()
        && haystack.contains(&normalize_for_match(product_name)))
        || haystack.contains(&normalize_for_match(keyword));
    info.name_hit = name_hit;
    info.price_hit = price.looks_like_price(&text);
    info.reason = if name_hit {
        REASON_NAME_MATCH.to_string()
    } else {
        REASON_NO_NAME_MATCH.to_string()
    };
    info
}

fn scan_snapshot(html: &str, base: &Url) -> Result<SearchFormDescriptor, FormScanError> {
    let doc = Html::parse_document(html);
    dom::find_search_form(&doc, base)
}

async fn trigger_retry(
    session: &mut dyn BrowserSession,
    id: &str,
    base: &Url,
    options: &ProbeOptions,
) -> Option<SearchFormDescriptor> {
    session.click_id(id).await.ok()?;
    tokio::time::sleep(options.trigger_settle).await;
    let source = session.source().await.ok()?;
    scan_snapshot(&source, base).ok()
}
