//! Helpers over a parsed page snapshot.
//!
//! All DOM work happens on a [`scraper::Html`] parsed from a source string;
//! the browser layer only supplies that string. Callers parse, extract owned
//! values, and drop the document before the next await point, since the
//! parsed tree is not `Send`.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::results::SearchFormDescriptor;

/// A link harvested from a page, with the anchor text when there was one.
#[derive(Debug, Clone)]
pub struct HarvestedLink {
    pub url: Url,
    pub text: String,
}

/// Extract the page body text with whitespace collapsed to single spaces.
pub fn body_text(doc: &Html) -> String {
    let body = Selector::parse("body").expect("valid selector");
    doc.select(&body)
        .flat_map(|n| n.text())
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse a source string and return its collapsed body text.
pub fn snapshot_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    body_text(&doc)
}

/// Extract trimmed, non-empty text lines from the page body.
pub fn text_lines(doc: &Html) -> Vec<String> {
    let body = Selector::parse("body").expect("valid selector");
    doc.select(&body)
        .flat_map(|n| n.text())
        .flat_map(|t| t.split('\n'))
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .map(|line| line.to_string())
        .collect()
}

/// Collect every navigable link on the page as an absolute, fragment-free
/// URL: anchors, `data-href`/`data-url`/`data-link` carriers, and `onclick`
/// handlers assigning `location.href`.
pub fn collect_links(doc: &Html, base: &Url) -> Vec<HarvestedLink> {
    let mut links = Vec::new();

    let anchors = Selector::parse("a[href]").expect("valid selector");
    for element in doc.select(&anchors) {
        if let Some(href) = element.value().attr("href") {
            if let Some(url) = normalize_url(base, href) {
                let text = element
                    .text()
                    .collect::<Vec<_>>()
                    .join(" ")
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" ");
                links.push(HarvestedLink { url, text });
            }
        }
    }

    let data_carriers =
        Selector::parse("[data-href], [data-url], [data-link]").expect("valid selector");
    for element in doc.select(&data_carriers) {
        for attr in ["data-href", "data-url", "data-link"] {
            if let Some(raw) = element.value().attr(attr) {
                if let Some(url) = normalize_url(base, raw) {
                    links.push(HarvestedLink {
                        url,
                        text: String::new(),
                    });
                }
            }
        }
    }

    let clickables = Selector::parse("[onclick]").expect("valid selector");
    if let Ok(href_assign) = Regex::new(r#"location\.href\s*=\s*['"]([^'"]+)['"]"#) {
        for element in doc.select(&clickables) {
            if let Some(handler) = element.value().attr("onclick") {
                if let Some(captures) = href_assign.captures(handler) {
                    if let Some(url) = normalize_url(base, &captures[1]) {
                        links.push(HarvestedLink {
                            url,
                            text: String::new(),
                        });
                    }
                }
            }
        }
    }

    links
}

/// Resolve a raw href against the base and strip the fragment.
///
/// Non-navigable schemes (javascript, mailto, tel) yield `None`.
pub fn normalize_url(base: &Url, raw: &str) -> Option<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let mut url = base.join(raw).ok()?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }
    url.set_fragment(None);
    Some(url)
}

/// Whether the URL is on the same origin as the root or on one of its
/// subdomains. A leading `www.` is ignored on both sides.
pub fn same_site(url: &Url, root: &Url) -> bool {
    let (Some(host), Some(root_host)) = (url.host_str(), root.host_str()) else {
        return false;
    };
    let host = host.strip_prefix("www.").unwrap_or(host);
    let root_host = root_host.strip_prefix("www.").unwrap_or(root_host);
    host == root_host || host.ends_with(&format!(".{root_host}"))
}

/// Replace (or set) a single query parameter, keeping the others.
pub fn set_query_param(url: &mut Url, name: &str, value: &str) {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != name)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    url.set_query(None);
    let mut pairs = url.query_pairs_mut();
    for (k, v) in &kept {
        pairs.append_pair(k, v);
    }
    pairs.append_pair(name, value);
}

/// Why a search-form scan came up empty, as a machine-readable reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormScanError {
    InputNotFound,
    /// No enclosing form; carries the candidate input's element id when it
    /// has one, so a click can be attempted on JS-toggled search overlays.
    FormNotFound {
        trigger_id: Option<String>,
    },
    MethodNotGet,
    InvalidActionUrl,
}

impl FormScanError {
    pub fn reason(&self) -> &'static str {
        match self {
            FormScanError::InputNotFound => "input_not_found",
            FormScanError::FormNotFound { .. } => "form_not_found",
            FormScanError::MethodNotGet => "method_not_get",
            FormScanError::InvalidActionUrl => "invalid_action_url",
        }
    }
}

/// Locate a usable GET search form on the page.
///
/// Inputs are ranked by attribute heuristics: `type=search` first, then a
/// `name` containing search/query/keyword or equal to `q`. The first input
/// that yields a valid descriptor wins; otherwise the failure of the
/// highest-priority candidate is reported.
pub fn find_search_form(doc: &Html, base: &Url) -> Result<SearchFormDescriptor, FormScanError> {
    let candidates = search_input_candidates(doc);
    if candidates.is_empty() {
        return Err(FormScanError::InputNotFound);
    }

    let mut first_failure = None;
    for input in &candidates {
        match descriptor_for(*input, base) {
            Ok(descriptor) => return Ok(descriptor),
            Err(failure) => {
                if first_failure.is_none() {
                    first_failure = Some(failure);
                }
            }
        }
    }
    Err(first_failure.unwrap_or(FormScanError::InputNotFound))
}

/// Build the submission URL by setting the input's name parameter on the
/// resolved form action. `None` when the descriptor is not a GET form or
/// its action no longer parses.
pub fn build_submission_url(descriptor: &SearchFormDescriptor, keyword: &str) -> Option<Url> {
    if !descriptor.is_valid() {
        return None;
    }
    let mut url = Url::parse(&descriptor.action).ok()?;
    set_query_param(&mut url, &descriptor.input_name, keyword);
    Some(url)
}

fn search_input_candidates<'a>(doc: &'a Html) -> Vec<ElementRef<'a>> {
    let inputs = Selector::parse("input").expect("valid selector");
    let mut by_type = Vec::new();
    let mut by_name = Vec::new();

    for input in doc.select(&inputs) {
        let input_type = input.value().attr("type").unwrap_or("").to_lowercase();
        let name = input.value().attr("name").unwrap_or("").to_lowercase();
        if input_type == "search" {
            by_type.push(input);
        } else if name == "q"
            || name.contains("search")
            || name.contains("query")
            || name.contains("keyword")
        {
            by_name.push(input);
        }
    }

    by_type.extend(by_name);
    by_type
}

fn descriptor_for(
    input: ElementRef<'_>,
    base: &Url,
) -> Result<SearchFormDescriptor, FormScanError> {
    let trigger_id = input.value().attr("id").map(|id| id.to_string());

    let Some(input_name) = input.value().attr("name").filter(|n| !n.is_empty()) else {
        // An unnamed input cannot carry the query parameter
        return Err(FormScanError::FormNotFound { trigger_id });
    };

    let form = input
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "form");
    let Some(form) = form else {
        return Err(FormScanError::FormNotFound { trigger_id });
    };

    // HTML defaults a form without a method attribute to GET
    let method = form.value().attr("method").unwrap_or("get").to_lowercase();
    if method != "get" {
        return Err(FormScanError::MethodNotGet);
    }

    let action = form.value().attr("action").unwrap_or("");
    let resolved = base.join(action).map_err(|_| FormScanError::InvalidActionUrl)?;
    if resolved.scheme() != "http" && resolved.scheme() != "https" {
        return Err(FormScanError::InvalidActionUrl);
    }

    Ok(SearchFormDescriptor {
        action: resolved.to_string(),
        method,
        input_name: input_name.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(html: &str) -> Html {
        Html::parse_document(html)
    }

    fn base() -> Url {
        Url::parse("https://brand.example.com/").unwrap()
    }

    #[test]
    fn test_collect_links_resolves_and_strips_fragments() {
        let d = doc(r##"<html><body>
            <a href="/product/1#reviews">FAN PRIME</a>
            <a href="https://brand.example.com/item/2">item</a>
            <a href="javascript:void(0)">noop</a>
        </body></html>"##);
        let links = collect_links(&d, &base());
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].url.as_str(), "https://brand.example.com/product/1");
        assert_eq!(links[0].text, "FAN PRIME");
    }

    #[test]
    fn test_collect_links_harvests_data_attrs_and_onclick() {
        let d = doc(r#"<html><body>
            <div data-href="/goods/3"></div>
            <button onclick="location.href='/detail/4'">보기</button>
        </body></html>"#);
        let links = collect_links(&d, &base());
        let urls: Vec<&str> = links.iter().map(|l| l.url.as_str()).collect();
        assert!(urls.contains(&"https://brand.example.com/goods/3"));
        assert!(urls.contains(&"https://brand.example.com/detail/4"));
    }

    #[test]
    fn test_same_site_allows_subdomains_only() {
        let root = Url::parse("https://www.brand.example.com/").unwrap();
        let shop = Url::parse("https://shop.brand.example.com/x").unwrap();
        let other = Url::parse("https://other.example.org/").unwrap();
        assert!(same_site(&shop, &root));
        assert!(same_site(&root, &root));
        assert!(!same_site(&other, &root));
    }

    #[test]
    fn test_set_query_param_replaces_existing() {
        let mut url = Url::parse("https://s.example.com/search?page=2&q=old").unwrap();
        set_query_param(&mut url, "q", "fan prime");
        assert_eq!(
            url.as_str(),
            "https://s.example.com/search?page=2&q=fan+prime"
        );
    }

    #[test]
    fn test_find_search_form_prefers_type_search() {
        let d = doc(r#"<html><body>
            <form method="get" action="/find"><input name="other_query" /></form>
            <form method="get" action="/search"><input type="search" name="kwrd" /></form>
        </body></html>"#);
        let descriptor = find_search_form(&d, &base()).unwrap();
        assert_eq!(descriptor.action, "https://brand.example.com/search");
        assert_eq!(descriptor.input_name, "kwrd");
    }

    #[test]
    fn test_find_search_form_reports_typed_failures() {
        let none = doc("<html><body><p>no inputs here</p></body></html>");
        assert_eq!(
            find_search_form(&none, &base()).unwrap_err(),
            FormScanError::InputNotFound
        );

        let post_only = doc(
            r#"<html><body><form method="post" action="/s">
            <input type="search" name="q" /></form></body></html>"#,
        );
        assert_eq!(
            find_search_form(&post_only, &base()).unwrap_err(),
            FormScanError::MethodNotGet
        );

        let formless = doc(r#"<html><body><input type="search" name="q" id="sbox" /></body></html>"#);
        assert_eq!(
            find_search_form(&formless, &base()).unwrap_err(),
            FormScanError::FormNotFound {
                trigger_id: Some("sbox".to_string())
            }
        );
    }

    #[test]
    fn test_build_submission_url() {
        let descriptor = SearchFormDescriptor {
            action: "https://brand.example.com/search?sort=new".to_string(),
            method: "get".to_string(),
            input_name: "keyword".to_string(),
        };
        let url = build_submission_url(&descriptor, "무선선풍기").unwrap();
        assert!(url.as_str().starts_with("https://brand.example.com/search?sort=new&keyword="));

        let invalid = SearchFormDescriptor {
            method: "post".to_string(),
            ..descriptor
        };
        assert!(build_submission_url(&invalid, "x").is_none());
    }
}
