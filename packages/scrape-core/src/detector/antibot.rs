//! Anti-Bot Detector (C7): classifies responses as blocked/challenged/empty
//! based on status, headers, URL, and body signals (spec §4.7). Pure
//! functions; all regex matching is case-insensitive and first-match-wins
//! in the order given below.

use lazy_static::lazy_static;
use regex::RegexSet;
use scraper::{Html, Selector};
use std::collections::BTreeMap;

lazy_static! {
    static ref URL_PATTERNS: RegexSet =
        RegexSet::new(["captcha", "challenge", "verify", "blocked", "denied", "unusual-traffic", "access-denied"]).unwrap();
    static ref TITLE_PATTERNS: RegexSet = RegexSet::new([
        "access denied",
        "attention required",
        "just a moment",
        "verify you are human",
        "are you human",
        "robot check",
        "unusual traffic",
        "request blocked",
        "temporarily unavailable",
        "service unavailable",
        "forbidden",
    ])
    .unwrap();
    static ref CAPTCHA_PATTERNS: RegexSet = RegexSet::new(["g-recaptcha", "hcaptcha", "recaptcha", "turnstile", "captcha"]).unwrap();
    static ref SCRIPT_PATTERNS: RegexSet =
        RegexSet::new(["cf-chl", "challenge-platform", "datadome", "perimeterx", "distil", "incapsula"]).unwrap();
    static ref HEADER_VALUE_PATTERNS: RegexSet = RegexSet::new(["captcha", "challenge", "blocked", "bot", "verify"]).unwrap();
    static ref TITLE_SELECTOR: Selector = Selector::parse("title").unwrap();
}

const SUSPICIOUS_HEADER_KEYS: [&str; 6] =
    ["cf-mitigated", "cf-chl-bypass", "cf-chl-out", "x-sucuri-block", "x-distil-cs", "x-datadome"];

fn matches_any(set: &RegexSet, text: &str) -> bool {
    set.is_match(&text.to_lowercase())
}

fn extract_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let node = document.select(&TITLE_SELECTOR).next()?;
    let text: String = node.text().collect::<Vec<_>>().join("").trim().to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn headers_suspicious(headers: &BTreeMap<String, String>) -> bool {
    for (key, value) in headers {
        let key = key.to_lowercase();
        if SUSPICIOUS_HEADER_KEYS.contains(&key.as_str()) {
            return true;
        }
        if matches_any(&HEADER_VALUE_PATTERNS, value) {
            return true;
        }
    }
    false
}

/// `detect_blocked_response(status, headers, url, body)` (spec §4.7).
/// First match in the documented order wins.
pub fn detect_blocked_response(status: Option<u16>, headers: &BTreeMap<String, String>, url: &str, html: &str) -> Option<&'static str> {
    if status == Some(403) {
        return Some("http_403");
    }
    if status == Some(429) {
        return Some("http_429");
    }
    if matches_any(&URL_PATTERNS, url) {
        return Some("blocked_url");
    }
    if let Some(title) = extract_title(html) {
        if matches_any(&TITLE_PATTERNS, &title) {
            return Some("blocked_title");
        }
    }
    if matches_any(&CAPTCHA_PATTERNS, html) {
        return Some("captcha_detected");
    }
    if matches_any(&SCRIPT_PATTERNS, html) {
        return Some("challenge_script");
    }
    if headers_suspicious(headers) {
        return Some("blocked_header");
    }
    None
}

fn data_has_value(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(_) | serde_json::Value::Number(_) => true,
        serde_json::Value::String(s) => !s.trim().is_empty(),
        serde_json::Value::Object(map) => map.values().any(data_has_value),
        serde_json::Value::Array(items) => items.iter().any(data_has_value),
    }
}

/// `detect_empty_parse(status, data, selectors, errors)` (spec §4.7).
pub fn detect_empty_parse(status: Option<u16>, data: Option<&serde_json::Value>, has_required: bool, errors: &[String]) -> Option<&'static str> {
    if !matches!(status, None | Some(200)) {
        return None;
    }
    if !has_required {
        return None;
    }
    if errors.iter().any(|e| e == "parsel_unavailable") {
        return None;
    }
    match data {
        Some(value) if data_has_value(value) => None,
        _ => Some("empty_parse"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_code_wins_first() {
        assert_eq!(detect_blocked_response(Some(403), &BTreeMap::new(), "", ""), Some("http_403"));
        assert_eq!(detect_blocked_response(Some(429), &BTreeMap::new(), "", ""), Some("http_429"));
    }

    #[test]
    fn url_pattern_before_body_checks() {
        let html = "<html><body>ok</body></html>";
        assert_eq!(detect_blocked_response(Some(200), &BTreeMap::new(), "https://x.example/verify-human", html), Some("blocked_url"));
    }

    #[test]
    fn blocked_title_detected() {
        let html = "<html><head><title>Access Denied</title></head><body></body></html>";
        assert_eq!(detect_blocked_response(Some(200), &BTreeMap::new(), "https://x.example/", html), Some("blocked_title"));
    }

    #[test]
    fn captcha_body_marker() {
        let html = "<html><body><div class='g-recaptcha'></div></body></html>";
        assert_eq!(detect_blocked_response(Some(200), &BTreeMap::new(), "https://x.example/", html), Some("captcha_detected"));
    }

    #[test]
    fn challenge_script_marker() {
        let html = "<html><body><script>datadome.init()</script></body></html>";
        assert_eq!(detect_blocked_response(Some(200), &BTreeMap::new(), "https://x.example/", html), Some("challenge_script"));
    }

    #[test]
    fn suspicious_header_key() {
        let mut headers = BTreeMap::new();
        headers.insert("x-datadome".to_string(), "1".to_string());
        assert_eq!(detect_blocked_response(Some(200), &headers, "https://x.example/", ""), Some("blocked_header"));
    }

    #[test]
    fn clean_response_is_none() {
        let html = "<html><head><title>Widget Shop</title></head><body>Hello</body></html>";
        assert_eq!(detect_blocked_response(Some(200), &BTreeMap::new(), "https://shop.example/p/1", html), None);
    }

    #[test]
    fn empty_parse_requires_required_field_and_missing_data() {
        assert_eq!(detect_empty_parse(Some(200), None, true, &[]), Some("empty_parse"));
        assert_eq!(detect_empty_parse(Some(200), None, false, &[]), None);
        assert_eq!(detect_empty_parse(Some(200), Some(&json!({"title": "x"})), true, &[]), None);
        assert_eq!(detect_empty_parse(Some(200), None, true, &["parsel_unavailable".to_string()]), None);
        assert_eq!(detect_empty_parse(Some(500), None, true, &[]), None);
    }
}
