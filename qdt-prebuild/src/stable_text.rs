//! Stable-text classifier
//!
//! A text is "stable" when translating it would be pointless: option letters,
//! numeric values, formulas, speed limits. Stable texts are copied verbatim into
//! every language slot instead of being sent to a translator.
//!
//! Examples of stable texts: `0.08%`, `A`, `A, B, C, D`, `X=1; Y=2`, `60 km/h`.

use once_cell::sync::Lazy;
use regex::Regex;

static STABLE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [r"^\d+ km/h", r"^\d+ mph"]
        .iter()
        .map(|pattern| Regex::new(pattern).expect("stable text pattern is valid"))
        .collect()
});

/// Share of stable characters above which a text is stable
const STABLE_RATIO: f64 = 0.8;

fn is_stable_char(ch: char) -> bool {
    matches!(ch, '$' | '.' | '%' | '=') || ch.is_numeric()
}

/// Decide whether `content` should be copied instead of translated
pub fn is_stable_text(content: &str) -> bool {
    let content = content.trim();

    if STABLE_PATTERNS.iter().any(|re| re.is_match(content)) {
        return true;
    }

    let mut alpha_count = 0usize;
    let mut stable_count = 0usize;
    for ch in content.chars() {
        if is_stable_char(ch) {
            stable_count += 1;
        } else if ch.is_alphabetic() {
            alpha_count += 1;
        }
    }
    if alpha_count <= 1 {
        return true;
    }
    if stable_count as f64 / (stable_count + alpha_count) as f64 > STABLE_RATIO {
        return true;
    }

    // Lists of stable items ("A, B, C" or "X=1; Y=2")
    let mut parts: Vec<&str> = content.split(',').collect();
    if parts.len() == 1 {
        parts = content.split(';').collect();
    }
    parts.len() > 1 && parts.iter().all(|part| is_stable_text(part))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_stable_examples() {
        for content in ["0.08%", "A", "A, B, C, D", "X=1; Y=2", "100 km/h", "55 mph", "", "  $5 "] {
            assert!(is_stable_text(content), "expected stable: {:?}", content);
        }
    }

    #[test]
    fn test_unstable_examples() {
        for content in ["foo boo bar", "A, foo", "Stop the car", "Speed 60 km/h"] {
            assert!(!is_stable_text(content), "expected unstable: {:?}", content);
        }
    }

    #[test]
    fn test_ratio_threshold() {
        // 8 digits + 2 letters is exactly 0.8, not above
        assert!(!is_stable_text("12345678ab"));
        // 4 digits + 2 letters = 0.66
        assert!(!is_stable_text("1234ab"));
        // 9 digits + 2 letters = 0.82
        assert!(is_stable_text("123456789ab"));
    }

    proptest! {
        #[test]
        fn prop_surrounding_whitespace_is_ignored(content in "\\PC{0,40}", pad in "[ \t\n]{0,4}") {
            let padded = format!("{}{}{}", pad, content, pad);
            prop_assert_eq!(is_stable_text(&content), is_stable_text(&padded));
        }

        #[test]
        fn prop_digit_strings_are_stable(content in "[0-9.%$= ]{0,30}") {
            prop_assert!(is_stable_text(&content));
        }
    }
}
