//! Text normalization for Japanese receipt content.

/// Convert full-width digits and number punctuation to their ASCII
/// equivalents. Receipts frequently use full-width characters for amounts
/// and dates (e.g. `１，０００円`, `２０２４年`).
pub fn normalize_fullwidth(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '０'..='９' => char::from_u32(c as u32 - '０' as u32 + '0' as u32).unwrap_or(c),
            '，' => ',',
            '．' => '.',
            '－' => '-',
            '／' => '/',
            '￥' => '¥',
            '　' => ' ',
            _ => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fullwidth_digits() {
        assert_eq!(normalize_fullwidth("１，０００"), "1,000");
        assert_eq!(normalize_fullwidth("２０２４／１／１５"), "2024/1/15");
    }

    #[test]
    fn test_mixed_text_untouched() {
        assert_eq!(normalize_fullwidth("テスト商店 1,000円"), "テスト商店 1,000円");
    }
}
