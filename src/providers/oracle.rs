//! Generative-model oracles.
//!
//! One chat-completion boundary ([`ChatOracle`]) with three prompt/parse
//! wrappers on top: official-site verification, product-fact refinement,
//! and search-listing extraction. Replies are free text; JSON is pulled
//! out tolerantly (code fences stripped, first `{` to last `}`), and a
//! reply that does not parse yields an empty result rather than an error,
//! so the pipeline keeps working with DOM-derived signals alone. Only the
//! HTTP exchange itself can fail a request.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ScoutError;
use crate::results::{ProductSignals, SearchCandidate};

const ANTHROPIC_MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: usize = 1024;

/// Chat-completion boundary shared by the three oracles.
#[async_trait]
pub trait ChatOracle: Send + Sync {
    /// Send one prompt and return the model's reply text.
    async fn complete(&self, prompt: &str) -> Result<String, ScoutError>;
}

/// Anthropic messages API client.
pub struct AnthropicOracle {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl AnthropicOracle {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, ScoutError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            api_key: api_key.into(),
            model: model.into(),
            client,
        })
    }
}

#[derive(Serialize)]
struct OracleRequest<'a> {
    model: &'a str,
    max_tokens: usize,
    messages: Vec<OracleMessage<'a>>,
}

#[derive(Serialize)]
struct OracleMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct OracleResponse {
    #[serde(default)]
    content: Vec<OracleContentBlock>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OracleContentBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[async_trait]
impl ChatOracle for AnthropicOracle {
    async fn complete(&self, prompt: &str) -> Result<String, ScoutError> {
        let body = OracleRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            messages: vec![OracleMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(ANTHROPIC_MESSAGES_URL)
            .header("x-api-key", self.api_key.trim())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ScoutError::Oracle {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: OracleResponse = response.json().await?;
        let text = parsed
            .content
            .into_iter()
            .filter_map(|block| match block {
                OracleContentBlock::Text { text } => Some(text),
                OracleContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n");
        Ok(text)
    }
}

/// Pull a JSON object out of a free-text oracle reply.
///
/// Code fences are stripped and the substring from the first `{` to the
/// last `}` is parsed. `None` means "treat as an empty result".
pub fn extract_json(text: &str) -> Option<serde_json::Value> {
    let cleaned: String = text
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n");
    let start = cleaned.find('{')?;
    let end = cleaned.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&cleaned[start..=end]).ok()
}

/// Verdict of the official-site verification oracle.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SiteVerdict {
    /// Homepage URL of the site judged to be the brand's own storefront
    #[serde(default)]
    pub homepage: String,

    /// Keywords to prefer when selecting among product matches
    #[serde(default)]
    pub priority_keywords: Vec<String>,
}

/// Ask the oracle to pick the brand's official storefront from the
/// web-search candidates. `None` when the reply did not parse or named
/// no homepage.
pub async fn verify_official_site(
    oracle: &dyn ChatOracle,
    keyword: &str,
    candidates: &[SearchCandidate],
) -> Result<Option<SiteVerdict>, ScoutError> {
    if candidates.is_empty() {
        return Ok(None);
    }

    let mut prompt = format!(
        "You are verifying which web-search result is the official brand \
         storefront for the product \"{keyword}\".\n\nCandidates:\n"
    );
    for (i, candidate) in candidates.iter().enumerate() {
        prompt.push_str(&format!(
            "{}. title: {}\n   url: {}\n   snippet: {}\n",
            i + 1,
            candidate.title,
            candidate.link,
            candidate.snippet
        ));
    }
    prompt.push_str(
        "\nPick the single candidate most likely to be the brand's own retail \
         site (not a marketplace, mall aggregator, or review page). Reply with \
         JSON only, using this schema:\n\
         {\"homepage\": \"<url or empty if none qualifies>\", \
         \"priority_keywords\": [\"<short keywords that identify this exact product>\"]}",
    );

    let reply = oracle.complete(&prompt).await?;
    let verdict = extract_json(&reply)
        .and_then(|value| serde_json::from_value::<SiteVerdict>(value).ok())
        .filter(|verdict| !verdict.homepage.trim().is_empty());
    if verdict.is_none() {
        ::log::warn!("site verification reply did not parse; falling back to first candidate");
    }
    Ok(verdict)
}

/// Oracle-corrected product facts; empty fields mean "no correction".
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OracleProductFacts {
    #[serde(default)]
    pub product_name: String,
    #[serde(default)]
    pub list_price: String,
    #[serde(default)]
    pub sale_price: String,
    #[serde(default)]
    pub image_src: String,
}

/// Ask the oracle to fill or correct the extracted signals from the raw
/// page evidence. `None` when the reply did not parse.
pub async fn refine_product_signals(
    oracle: &dyn ChatOracle,
    keyword: &str,
    signals: &ProductSignals,
) -> Result<Option<OracleProductFacts>, ScoutError> {
    let price_lines = signals.price_lines.join("\n");
    let prompt = format!(
        "A product page was scraped while looking for \"{keyword}\". Extracted \
         signals may be incomplete or wrong; reconstruct the product facts \
         from the raw evidence below.\n\n\
         url: {}\ncurrency hint: {}\n\
         title block:\n{}\n\nprice block:\n{}\n\nprice-looking lines:\n{}\n\n\
         page text head:\n{}\n\n\
         current name: \"{}\"  list price: \"{}\"  sale price: \"{}\"\n\n\
         Reply with JSON only:\n\
         {{\"product_name\": \"\", \"list_price\": \"\", \"sale_price\": \"\", \
         \"image_src\": \"\"}}\n\
         Leave a field empty when the evidence does not support a value. The \
         sale price must not exceed the list price when both are present.",
        signals.url,
        signals.currency_hint,
        signals.title_block_text,
        signals.price_block_text,
        price_lines,
        signals.text,
        signals.product_name,
        signals.list_price,
        signals.sale_price,
    );

    let reply = oracle.complete(&prompt).await?;
    Ok(extract_json(&reply).and_then(|value| serde_json::from_value(value).ok()))
}

/// One row as reported by the search-listing oracle, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawListItem {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub product_name: String,
    #[serde(default)]
    pub list_price: String,
    #[serde(default)]
    pub sale_price: String,
    #[serde(default)]
    pub image_src: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub keyword_used: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawListReply {
    #[serde(default)]
    items: Vec<RawListItem>,
}

/// Ask the oracle to parse product rows out of collected search-result
/// evidence. A reply that does not parse yields an empty list.
pub async fn extract_search_listing(
    oracle: &dyn ChatOracle,
    keywords: &[String],
    evidence_blocks: &[String],
) -> Result<Vec<RawListItem>, ScoutError> {
    if evidence_blocks.is_empty() {
        return Ok(Vec::new());
    }

    let mut prompt = format!(
        "Below is evidence captured from a storefront's search-result pages \
         while searching for: {}.\nEach block lists the attempt keyword, the \
         attempt URL, rendered page text, network response excerpts, and \
         structurally detected product cards.\n\n",
        keywords.join(", ")
    );
    for block in evidence_blocks {
        prompt.push_str(block);
        prompt.push_str("\n---\n");
    }
    prompt.push_str(
        "\nList the products that appear in the results. Skip navigation \
         labels, notices, and anything without a price. Reply with JSON only:\n\
         {\"items\": [{\"url\": \"\", \"product_name\": \"\", \"list_price\": \"\", \
         \"sale_price\": \"\", \"image_src\": \"\", \"reason\": \"\", \
         \"keyword_used\": \"<the attempt keyword this row came from>\"}]}",
    );

    let reply = oracle.complete(&prompt).await?;
    let items = extract_json(&reply)
        .and_then(|value| serde_json::from_value::<RawListReply>(value).ok())
        .map(|parsed| parsed.items)
        .unwrap_or_default();
    if items.is_empty() {
        ::log::debug!("search-listing oracle returned no parseable items");
    }
    Ok(items)
}


#[cfg(test)]
mod tests {
    use super::mock::MockOracle;
    use super::*;

    #[test]
    fn test_extract_json_strips_fences_and_prose() {
        let reply = "Here is the result:\n```json\n{\"homepage\": \"https://a.com\"}\n```\nDone.";
        let value = extract_json(reply).unwrap();
        assert_eq!(value["homepage"], "https://a.com");
    }

    #[test]
    fn test_extract_json_handles_garbage() {
        assert!(extract_json("no json here").is_none());
        assert!(extract_json("{broken").is_none());
        assert!(extract_json("} {").is_none());
    }

    #[tokio::test]
    async fn test_verify_official_site_parses_verdict() {
        let oracle = MockOracle::new(&[
            r#"{"homepage": "https://brand.example.com/", "priority_keywords": ["fan prime"]}"#,
        ]);
        let candidates = vec![SearchCandidate::new(
            "브랜드 공식몰".to_string(),
            "https://brand.example.com/".to_string(),
            "공식 온라인 스토어".to_string(),
        )];
        let verdict = verify_official_site(&oracle, "fan prime", &candidates)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(verdict.homepage, "https://brand.example.com/");
        assert_eq!(verdict.priority_keywords, vec!["fan prime".to_string()]);
    }

    #[tokio::test]
    async fn test_unparseable_verdict_degrades_to_none() {
        let oracle = MockOracle::new(&["I could not decide."]);
        let candidates = vec![SearchCandidate::new(
            "t".to_string(),
            "https://x.com/".to_string(),
            "s".to_string(),
        )];
        let verdict = verify_official_site(&oracle, "kw", &candidates)
            .await
            .unwrap();
        assert!(verdict.is_none());
    }

    #[tokio::test]
    async fn test_listing_reply_parses_items() {
        let oracle = MockOracle::new(&[
            r#"{"items": [{"url": "/p/1", "product_name": "FAN PRIME 3", "sale_price": "57,900원", "keyword_used": "fan prime"}]}"#,
        ]);
        let items = extract_search_listing(
            &oracle,
            &["fan prime".to_string()],
            &["[attempt ...]".to_string()],
        )
        .await
        .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].product_name, "FAN PRIME 3");
        assert!(items[0].list_price.is_empty());
    }

    #[tokio::test]
    async fn test_no_evidence_skips_the_oracle() {
        let oracle = MockOracle::new(&["{}"]);
        let items = extract_search_listing(&oracle, &["kw".to_string()], &[])
            .await
            .unwrap();
        assert!(items.is_empty());
        assert_eq!(oracle.call_count(), 0);
    }
}
