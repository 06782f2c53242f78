//! Token estimation utilities.
//!
//! Uses a character-based heuristic: ~4 bytes per token. This is accurate
//! within ~10% for BPE tokenizers on English text, and it is cheap and
//! deterministic, which is all budget enforcement needs.

/// Marker appended to head-truncated text.
pub const TRUNCATION_MARKER: &str = " ...";

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 bytes. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.len().div_ceil(4)
}

/// Keep the head of `text` so that the result estimates to at most
/// `max_tokens`. Text that already fits is returned unchanged; anything cut
/// ends with [`TRUNCATION_MARKER`]. Returns an empty string when not even the
/// marker fits.
pub fn truncate_to_tokens(text: &str, max_tokens: usize) -> String {
    if estimate_tokens(text) <= max_tokens {
        return text.to_string();
    }

    let max_bytes = max_tokens.saturating_mul(4);
    if max_bytes <= TRUNCATION_MARKER.len() {
        return String::new();
    }

    let mut cut = max_bytes - TRUNCATION_MARKER.len();
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}{}", text[..cut].trim_end(), TRUNCATION_MARKER)
}
