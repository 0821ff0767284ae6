use std::fmt::Write as _;

use chrono::{DateTime, NaiveDateTime, Utc};
use lazy_static::lazy_static;
use log::debug;
use rand::{Rng, RngCore};
use regex::Regex;

lazy_static! {
    static ref RELATIVE_TIME: Regex =
        Regex::new(r"^\s*(?:[+-]?\s*\d+\s*[a-z]+\s*)+$").unwrap();
    static ref RELATIVE_PART: Regex = Regex::new(r"([+-]?)\s*(\d+)\s*([a-z]+)").unwrap();
}

/// 当前 Unix 时间戳（秒）
pub fn now_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// 把 Unix 时间戳格式化为 HTTP 日期，例如 `Sun, 06 Nov 1994 08:49:37 GMT`。
pub fn http_date(timestamp: i64) -> String {
    match DateTime::<Utc>::from_timestamp(timestamp, 0) {
        Some(date) => date.format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
        None => {
            debug!("时间戳{}超出可表示范围，使用纪元时间", timestamp);
            "Thu, 01 Jan 1970 00:00:00 GMT".to_string()
        }
    }
}

/// 解析 `If-Modified-Since` 等标头中的 HTTP 日期。
///
/// 依次尝试 RFC 1123 / RFC 2822、RFC 850 与 asctime 三种格式，无法解析时返回 `None`。
pub fn parse_http_date(value: &str) -> Option<i64> {
    let value = value.trim();
    if let Ok(date) = DateTime::parse_from_rfc2822(value) {
        return Some(date.timestamp());
    }
    if let Ok(date) = DateTime::parse_from_rfc3339(value) {
        return Some(date.timestamp());
    }
    for format in ["%A, %d-%b-%y %H:%M:%S GMT", "%a %b %e %H:%M:%S %Y"] {
        if let Ok(date) = NaiveDateTime::parse_from_str(value, format) {
            return Some(date.and_utc().timestamp());
        }
    }
    None
}

/// 把 `+2 hours`、`1 day 30 min` 这类相对时间表达式换算为秒数。
///
/// 月按 30 天、年按 365 天折算；出现无法识别的单位时返回 `None`。
pub fn parse_relative_seconds(expression: &str) -> Option<i64> {
    let expression = expression.trim().to_lowercase();
    if !RELATIVE_TIME.is_match(&expression) {
        return None;
    }
    let mut total: i64 = 0;
    for part in RELATIVE_PART.captures_iter(&expression) {
        let amount: i64 = part[2].parse().ok()?;
        let unit = match part[3].trim_end_matches('s') {
            "sec" | "second" => 1,
            "min" | "minute" => 60,
            "hour" => 3600,
            "day" => 86400,
            "week" => 604800,
            "fortnight" => 1209600,
            "month" => 2592000,
            "year" => 31536000,
            _ => return None,
        };
        let signed = if &part[1] == "-" { -amount } else { amount };
        total = total.checked_add(signed.checked_mul(unit)?)?;
    }
    Some(total)
}

/// HTML 特殊字符转义：`&`、`<`、`>` 被编码，引号保持原样。
pub fn escape_special_chars(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '\0' => {}
            _ => escaped.push(c),
        }
    }
    escaped
}

/// 生成 `len` 个随机字节并以小写十六进制编码。
pub fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::rng().fill_bytes(&mut bytes);
    to_hex(&bytes)
}

pub fn to_hex(bytes: &[u8]) -> String {
    let mut hex = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(hex, "{:02x}", b);
    }
    hex
}

/// 生成会话标识符，字符表取决于每个字符承载的比特数（4、5 或 6）。
pub fn random_session_id(length: usize, bits_per_character: u8) -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ,-";
    let size = match bits_per_character {
        4 => 16,
        6 => 64,
        _ => 32,
    };
    let mut rng = rand::rng();
    (0..length)
        .map(|_| ALPHABET[rng.random_range(0..size)] as char)
        .collect()
}

/// 定长比较，耗时与第一个不同字节的位置无关。
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_date() {
        assert_eq!(http_date(784111777), "Sun, 06 Nov 1994 08:49:37 GMT");
        assert_eq!(http_date(0), "Thu, 01 Jan 1970 00:00:00 GMT");
    }

    #[test]
    fn test_parse_http_date_formats() {
        assert_eq!(parse_http_date("Sun, 06 Nov 1994 08:49:37 GMT"), Some(784111777));
        assert_eq!(parse_http_date("Sunday, 06-Nov-94 08:49:37 GMT"), Some(784111777));
        assert_eq!(parse_http_date("Sun Nov  6 08:49:37 1994"), Some(784111777));
        assert_eq!(parse_http_date("not a date"), None);
    }

    #[test]
    fn test_http_date_round_trip() {
        let ts = 1700000000;
        assert_eq!(parse_http_date(&http_date(ts)), Some(ts));
    }

    #[test]
    fn test_relative_seconds() {
        assert_eq!(parse_relative_seconds("+2 hours"), Some(7200));
        assert_eq!(parse_relative_seconds("1 day 30 min"), Some(88200));
        assert_eq!(parse_relative_seconds("+1 week"), Some(604800));
        assert_eq!(parse_relative_seconds("-1 hour"), Some(-3600));
        assert_eq!(parse_relative_seconds("2 Hours"), Some(7200));
    }

    #[test]
    fn test_relative_seconds_rejects_garbage() {
        assert_eq!(parse_relative_seconds("soon"), None);
        assert_eq!(parse_relative_seconds("3 parsecs"), None);
        assert_eq!(parse_relative_seconds(""), None);
    }

    #[test]
    fn test_escape_special_chars() {
        assert_eq!(escape_special_chars("<b>a & b</b>"), "&lt;b&gt;a &amp; b&lt;/b&gt;");
        assert_eq!(escape_special_chars("say \"hi\" 'x'"), "say \"hi\" 'x'");
    }

    #[test]
    fn test_random_hex() {
        let token = random_hex(32);
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, random_hex(32));
    }

    #[test]
    fn test_random_session_id_alphabet() {
        let id = random_session_id(48, 5);
        assert_eq!(id.len(), 48);
        assert!(id.chars().all(|c| c.is_ascii_digit() || ('a'..='v').contains(&c)));

        let id = random_session_id(32, 4);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
        assert!(constant_time_eq(b"", b""));
    }
}
