//! Token estimation.

/// Characters per token (rough estimate for English text).
const CHARS_PER_TOKEN: usize = 4;

/// Estimate token count for a string: `ceil(chars / 4)`.
///
/// Counts characters rather than bytes so multi-byte text is not overcharged.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Estimated cost of one packed item, including its fixed framing overhead.
pub fn item_cost(text: &str, overhead: usize) -> usize {
    estimate_tokens(text) + overhead
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn test_estimate_counts_chars() {
        // 4 chars, 8 bytes
        assert_eq!(estimate_tokens("éééé"), 1);
    }

    #[test]
    fn test_item_cost_adds_overhead() {
        assert_eq!(item_cost("abcdefgh", 4), 6);
        assert_eq!(item_cost("", 4), 4);
    }
}
