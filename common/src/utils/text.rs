//! Small text helpers shared by ingestion and retrieval: statute numerals,
//! whitespace handling and content hashing.

use sha2::{Digest, Sha256};

const DIGITS: [char; 10] = ['零', '一', '二', '三', '四', '五', '六', '七', '八', '九'];

/// Parses the numeral inside `第…条` / `第…章`, in either ASCII digits or
/// Chinese numerals (`六十`, `一百零五`, `十二`).
pub fn parse_chinese_numeral(raw: &str) -> Option<u32> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if raw.chars().all(|c| c.is_ascii_digit()) {
        return raw.parse().ok();
    }

    let mut total: u32 = 0;
    let mut current: u32 = 0;
    for c in raw.chars() {
        match c {
            '零' | '〇' => current = 0,
            '两' => current = 2,
            '十' | '百' | '千' => {
                let unit = match c {
                    '十' => 10,
                    '百' => 100,
                    _ => 1000,
                };
                total = total.checked_add(current.max(1).checked_mul(unit)?)?;
                current = 0;
            }
            other => {
                let value = DIGITS.iter().position(|d| *d == other)?;
                current = u32::try_from(value).ok()?;
            }
        }
    }
    total.checked_add(current)
}

/// Renders `n` the way statutes number their articles: 60 -> `六十`, 105 -> `一百零五`.
pub fn to_chinese_numeral(n: u32) -> String {
    if n == 0 {
        return DIGITS[0].to_string();
    }
    if n >= 10_000 {
        return n.to_string();
    }

    let mut rest = n;
    let mut out = String::new();
    let mut started = false;
    let mut zero_pending = false;
    for (unit, name) in [(1000, Some('千')), (100, Some('百')), (10, Some('十')), (1, None)] {
        let digit = rest / unit;
        rest %= unit;
        if digit == 0 {
            zero_pending = started;
            continue;
        }
        if zero_pending {
            out.push(DIGITS[0]);
            zero_pending = false;
        }
        // "十二", not "一十二", when the tens digit leads.
        if !(unit == 10 && digit == 1 && !started) {
            if let Some(d) = usize::try_from(digit).ok().and_then(|i| DIGITS.get(i)) {
                out.push(*d);
            }
        }
        if let Some(name) = name {
            out.push(name);
        }
        started = true;
    }
    out
}

/// `第六十条` for article 60.
pub fn article_label(number: u32) -> String {
    format!("第{}条", to_chinese_numeral(number))
}

/// Collapses every whitespace run (newlines included) to a single space.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Keeps at most `max_chars` characters, appending `...` when text was cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", text.get(..byte_idx).unwrap_or(text)),
        None => text.to_string(),
    }
}

pub fn sha256_hex(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_chinese_and_ascii_numerals() {
        assert_eq!(parse_chinese_numeral("六十"), Some(60));
        assert_eq!(parse_chinese_numeral("十二"), Some(12));
        assert_eq!(parse_chinese_numeral("一百零五"), Some(105));
        assert_eq!(parse_chinese_numeral("一百一十"), Some(110));
        assert_eq!(parse_chinese_numeral("三"), Some(3));
        assert_eq!(parse_chinese_numeral("60"), Some(60));
        assert_eq!(parse_chinese_numeral(""), None);
        assert_eq!(parse_chinese_numeral("abc"), None);
    }

    #[test]
    fn renders_numerals_like_statutes() {
        assert_eq!(to_chinese_numeral(1), "一");
        assert_eq!(to_chinese_numeral(10), "十");
        assert_eq!(to_chinese_numeral(12), "十二");
        assert_eq!(to_chinese_numeral(60), "六十");
        assert_eq!(to_chinese_numeral(105), "一百零五");
        assert_eq!(to_chinese_numeral(110), "一百一十");
        assert_eq!(to_chinese_numeral(1000), "一千");
        assert_eq!(article_label(107), "第一百零七条");
    }

    #[test]
    fn numerals_round_trip_over_statute_range() {
        for n in 1..=300 {
            assert_eq!(parse_chinese_numeral(&to_chinese_numeral(n)), Some(n));
        }
    }

    #[test]
    fn collapses_and_truncates() {
        assert_eq!(collapse_whitespace("  第一条\n 为了\t保护  "), "第一条 为了 保护");
        assert_eq!(truncate_chars("劳动者享有权利", 3), "劳动者...");
        assert_eq!(truncate_chars("短", 3), "短");
    }

    #[test]
    fn hashes_are_stable_hex() {
        let digest = sha256_hex(b"abc");
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
