/// Heuristic token estimate: `ceil(chars / chars_per_token)`.
///
/// Counts Unicode scalar values, not bytes. A ratio of zero is treated as one.
pub fn estimate_tokens(text: &str, chars_per_token: usize) -> usize {
    let ratio = chars_per_token.max(1);
    let chars = text.chars().count();
    chars.div_ceil(ratio)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_up() {
        assert_eq!(estimate_tokens("", 4), 0);
        assert_eq!(estimate_tokens("a", 4), 1);
        assert_eq!(estimate_tokens("abcd", 4), 1);
        assert_eq!(estimate_tokens("abcde", 4), 2);
    }

    #[test]
    fn counts_chars_not_bytes() {
        assert_eq!(estimate_tokens("ééééé", 5), 1);
    }

    #[test]
    fn zero_ratio_is_one_char_per_token() {
        assert_eq!(estimate_tokens("abc", 0), 3);
    }
}
