//! Token estimation.
//!
//! Byte-based heuristic: 1 token ≈ 4 UTF-8 bytes, rounded up. A CJK
//! character is three bytes, so Chinese text counts close to one token per
//! character. The estimator is identified by the budget profile's
//! `tokenizer_id` / `tokenizer_version`.

/// Estimate the token count for a string.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.len().div_ceil(4)
}

/// Longest prefix of `text` that fits in `max_tokens`, cut on a char boundary.
pub fn truncate_to_tokens(text: &str, max_tokens: usize) -> &str {
    let max_bytes = max_tokens.saturating_mul(4);
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
