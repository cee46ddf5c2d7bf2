use std::time::Duration;

/// Utility function to create a reasonable timeout for page navigation
pub fn calculate_timeout(base_ms: u64, url_length: usize) -> Duration {
    // Add additional time for longer URLs which might be more complex to process
    let additional_ms = (url_length / 20) as u64 * 100;
    Duration::from_millis(base_ms + additional_ms)
}

/// Truncate a string to at most `max` bytes on a char boundary.
///
/// Storefront text is routinely multi-byte (Korean product names, currency
/// symbols), so plain byte slicing would panic mid-character.
pub fn truncate_to(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

/// Collapse all whitespace runs to single spaces and lowercase, for
/// case-insensitive substring matching against rendered page text.
pub fn normalize_for_match(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_timeout_grows_with_url_length() {
        let short = calculate_timeout(15_000, 20);
        let long = calculate_timeout(15_000, 200);
        assert!(long > short);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let korean = "무선선풍기 FAN PRIME 3";
        // Byte 4 falls inside the second Hangul syllable
        let cut = truncate_to(korean, 4);
        assert_eq!(cut, "무");
        assert_eq!(truncate_to("short", 100), "short");
    }

    #[test]
    fn test_normalize_for_match() {
        assert_eq!(
            normalize_for_match("  FAN   Prime\n3 "),
            "fan prime 3"
        );
    }
}
