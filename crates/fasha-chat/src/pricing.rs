//! Price recovery from catalog document text.

use regex::Regex;
use std::sync::LazyLock;

/// A price marker followed by an amount. Groups after a separator must be
/// exactly three digits, so a trailing ",00" is not part of the amount.
static PRICE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:harga|price|rp)[^\d\n]{0,12}?(\d{1,3}(?:[.,]\d{3})+|\d+)")
        .expect("Invalid price regex")
});

const MIN_PRICE_DIGITS: usize = 3;

/// Parse the first amount of at least three digits that follows a price
/// marker (`Harga`, `Price` or `Rp`).
///
/// Thousands separators (`.` or `,`) are stripped. Returns `None` when no
/// positive amount can be found.
pub fn parse_price(text: &str) -> Option<u64> {
    PRICE_PATTERN.captures_iter(text).find_map(|caps| {
        let digits: String = caps
            .get(1)?
            .as_str()
            .chars()
            .filter(char::is_ascii_digit)
            .collect();
        if digits.len() < MIN_PRICE_DIGITS {
            return None;
        }
        digits.parse::<u64>().ok().filter(|v| *v > 0)
    })
}
