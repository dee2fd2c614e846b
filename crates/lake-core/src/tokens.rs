//! Token cost estimation for budget enforcement.

/// Character-count token estimator.
///
/// ASCII text averages about 4 characters per token; non-ASCII text
/// (CJK in particular) runs closer to 1.5. Good enough for budget
/// enforcement; the serving layer never needs exact counts.
pub struct TokenEstimator;

impl TokenEstimator {
    /// Estimate the token count of a text, never less than 1.
    pub fn estimate(text: &str) -> usize {
        let mut ascii_chars = 0usize;
        let mut non_ascii_chars = 0usize;
        for c in text.chars() {
            if c.is_ascii() {
                ascii_chars += 1;
            } else {
                non_ascii_chars += 1;
            }
        }
        let tokens = ascii_chars / 4 + (non_ascii_chars as f64 / 1.5).ceil() as usize;
        tokens.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_ascii() {
        let text = "a plain ascii sentence for estimation";
        let tokens = TokenEstimator::estimate(text);
        assert!(tokens >= text.len() / 5);
        assert!(tokens <= text.len() / 3);
    }

    #[test]
    fn test_estimate_never_zero() {
        assert_eq!(TokenEstimator::estimate(""), 1);
        assert_eq!(TokenEstimator::estimate("ab"), 1);
    }

    #[test]
    fn test_estimate_non_ascii_heavier() {
        let ascii = TokenEstimator::estimate("hello world!");
        let cjk = TokenEstimator::estimate("你好世界再见了");
        assert!(cjk > ascii);
    }
}
