//! Shared helpers for provider implementations

/// Mask an API key for logging and Debug output.
///
/// Keeps the first and last four characters of long keys, hides short
/// keys entirely.
pub(crate) fn mask_api_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "***".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}***{tail}")
}

/// Truncate a string on a char boundary
pub(crate) fn truncate_safe(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
