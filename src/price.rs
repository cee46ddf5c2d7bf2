//! Price and currency normalization.
//!
//! Converts free-form price text scraped from arbitrary storefront markup
//! into a canonical amount, and detects the currency from surrounding text.

use regex::Regex;

/// Currency detected around a price, in detection-priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Currency {
    Krw,
    Usd,
    Eur,
    Gbp,
    Unknown,
}

impl Currency {
    /// Currency code for the signal record; empty when unknown.
    pub fn hint(&self) -> &'static str {
        match self {
            Currency::Krw => "KRW",
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
            Currency::Unknown => "",
        }
    }
}

/// Marker chain checked in priority order; the first category with a hit
/// in any of the supplied texts wins.
const CURRENCY_MARKERS: [(Currency, &[&str]); 4] = [
    (Currency::Krw, &["원", "₩", "krw"]),
    (Currency::Usd, &["$", "usd"]),
    (Currency::Eur, &["€", "eur"]),
    (Currency::Gbp, &["£", "gbp"]),
];

/// Price text normalizer with its regexes compiled once at construction.
#[derive(Debug)]
pub struct PriceNormalizer {
    number: Regex,
    currency_quote: Regex,
    won_amount: Regex,
}

impl Default for PriceNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl PriceNormalizer {
    pub fn new() -> Self {
        Self {
            // Grouped-thousands first so "12,000" is taken whole
            number: Regex::new(r"\d{1,3}(?:,\d{3})+|\d+").expect("valid number pattern"),
            currency_quote: Regex::new(r"(?i)(?:[₩$€£]|USD|EUR|GBP|KRW)\s*\d[\d,.]*")
                .expect("valid currency pattern"),
            won_amount: Regex::new(r"(?:\d{1,3}(?:,\d{3})+|\d+)\s*원").expect("valid won pattern"),
        }
    }

    /// Extract the most price-like amount from free-form text.
    ///
    /// All numeric substrings are parsed; the maximum value >= 1000 is
    /// preferred, which guards against picking a unit count, rating, or
    /// page index instead of a price. When nothing reaches 1000 the
    /// maximum of all parses is returned.
    pub fn extract_amount(&self, text: &str) -> Option<u64> {
        let amounts: Vec<u64> = self
            .number
            .find_iter(text)
            .filter_map(|m| m.as_str().replace(',', "").parse::<u64>().ok())
            .collect();

        amounts
            .iter()
            .filter(|a| **a >= 1000)
            .max()
            .or_else(|| amounts.iter().max())
            .copied()
    }

    /// Detect the currency from price-bearing and general page text.
    ///
    /// The marker chain is walked in priority order (KRW, USD, EUR, GBP);
    /// within each category the list-price text, the sale-price text, and
    /// the general page text are checked in that order, and the first
    /// category with any hit wins.
    pub fn detect_currency(&self, list_text: &str, sale_text: &str, page_text: &str) -> Currency {
        let texts = [
            list_text.to_lowercase(),
            sale_text.to_lowercase(),
            page_text.to_lowercase(),
        ];
        for (currency, markers) in CURRENCY_MARKERS {
            for text in &texts {
                if markers.iter().any(|m| text.contains(m)) {
                    return currency;
                }
            }
        }
        Currency::Unknown
    }

    /// Format an amount for the detected currency.
    ///
    /// KRW gets the canonical grouped-thousands + 원 rendering. Other
    /// currencies are not reformatted here (amount formatting is
    /// locale-specific); callers should prefer [`first_currency_quote`]
    /// for them and fall back to the bare grouped amount.
    ///
    /// [`first_currency_quote`]: PriceNormalizer::first_currency_quote
    pub fn format_amount(&self, amount: u64, currency: Currency) -> String {
        match currency {
            Currency::Krw => format!("{}원", group_thousands(amount)),
            _ => group_thousands(amount),
        }
    }

    /// Normalize price text to its canonical string, if an amount is found.
    pub fn normalize(&self, text: &str, currency: Currency) -> Option<String> {
        self.extract_amount(text)
            .map(|amount| self.format_amount(amount, currency))
    }

    /// First currency-qualified price substring found scanning the given
    /// lines, preserving the original symbol and format.
    pub fn first_currency_quote(&self, lines: &[String]) -> Option<String> {
        lines
            .iter()
            .find_map(|line| self.currency_quote.find(line))
            .map(|m| m.as_str().trim().to_string())
    }

    /// Whether the text contains a won amount or a symbol-qualified amount.
    pub fn looks_like_price(&self, text: &str) -> bool {
        self.won_amount.is_match(text) || self.currency_quote.is_match(text)
    }

    /// Whether the text contains a won-pattern amount specifically.
    pub fn has_won_amount(&self, text: &str) -> bool {
        self.won_amount.is_match(text)
    }
}

/// Render an amount with comma-grouped thousands.
pub fn group_thousands(amount: u64) -> String {
    let digits = amount.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
