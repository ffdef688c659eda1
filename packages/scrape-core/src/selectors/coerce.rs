//! Value coercion and attribute URL normalization shared between the live
//! HTML extractor and `normalize_data` (spec §4.8).

use serde_json::Value;

use crate::types::schema::DataType;

const URL_ATTRIBUTES: [&str; 5] = ["href", "src", "data-href", "data-url", "data-src"];

fn looks_like_url(raw: &str) -> bool {
    raw.starts_with('/') || raw.starts_with("http://") || raw.starts_with("https://") || raw.starts_with("//")
}

fn is_preserved_scheme(raw: &str) -> bool {
    raw.starts_with('#') || raw.starts_with("javascript:") || raw.starts_with("mailto:") || raw.starts_with("tel:")
}

/// Resolves a selector-extracted attribute value against `base_url` when the
/// attribute name or the value's shape indicates it is a URL. Fragment,
/// `javascript:`, `mailto:`, and `tel:` values pass through untouched.
pub fn resolve_attribute_url(attribute: Option<&str>, raw: &str, base_url: Option<&str>) -> String {
    if is_preserved_scheme(raw) {
        return raw.to_string();
    }
    let is_url_attr = attribute.map(|a| URL_ATTRIBUTES.contains(&a)).unwrap_or(false);
    if !is_url_attr && !looks_like_url(raw) {
        return raw.to_string();
    }
    let Some(base) = base_url else { return raw.to_string() };
    match url::Url::parse(base).and_then(|b| b.join(raw)) {
        Ok(resolved) => resolved.to_string(),
        Err(_) => raw.to_string(),
    }
}

/// Coerces a raw string into `data_type`, per spec §4.8: strings pass
/// through; int/float strip thousands separators; bool recognizes
/// {1, true, yes, y} case-insensitively. Returns `None` on coercion failure.
pub fn coerce_str(data_type: DataType, raw: &str) -> Option<Value> {
    match data_type {
        DataType::String => Some(Value::String(raw.to_string())),
        DataType::Int => {
            let cleaned: String = raw.chars().filter(|c| *c != ',').collect();
            cleaned.trim().parse::<i64>().ok().map(|n| Value::Number(n.into()))
        }
        DataType::Float => {
            let cleaned: String = raw.chars().filter(|c| *c != ',').collect();
            cleaned.trim().parse::<f64>().ok().and_then(serde_json::Number::from_f64).map(Value::Number)
        }
        DataType::Bool => {
            let lowered = raw.trim().to_lowercase();
            Some(Value::Bool(matches!(lowered.as_str(), "1" | "true" | "yes" | "y")))
        }
    }
}

/// Coerces an already-structured JSON scalar (as returned by the oracle)
/// into `data_type`, producing the same outcome as `coerce_str` would for
/// its string form. Numbers and bools pass through when they already match.
pub fn coerce_value(data_type: DataType, value: &Value) -> Option<Value> {
    match (data_type, value) {
        (DataType::String, Value::String(s)) => Some(Value::String(s.clone())),
        (DataType::String, other) => Some(Value::String(other.to_string())),
        (DataType::Int, Value::Number(n)) if n.is_i64() || n.is_u64() => Some(Value::Number(n.clone())),
        (DataType::Int, Value::String(s)) => coerce_str(DataType::Int, s),
        (DataType::Float, Value::Number(n)) => Some(Value::Number(n.clone())),
        (DataType::Float, Value::String(s)) => coerce_str(DataType::Float, s),
        (DataType::Bool, Value::Bool(b)) => Some(Value::Bool(*b)),
        (DataType::Bool, Value::String(s)) => coerce_str(DataType::Bool, s),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_and_float_strip_commas() {
        assert_eq!(coerce_str(DataType::Int, "1,234"), Some(Value::Number(1234.into())));
        assert_eq!(coerce_str(DataType::Float, "2,345.50"), Some(Value::Number(serde_json::Number::from_f64(2345.50).unwrap())));
    }

    #[test]
    fn bool_recognizes_truthy_tokens() {
        for truthy in ["1", "true", "TRUE", "yes", "Y"] {
            assert_eq!(coerce_str(DataType::Bool, truthy), Some(Value::Bool(true)));
        }
        assert_eq!(coerce_str(DataType::Bool, "no"), Some(Value::Bool(false)));
    }

    #[test]
    fn url_attribute_resolves_against_base() {
        let resolved = resolve_attribute_url(Some("href"), "/checkout", Some("https://shop.example/p/1"));
        assert_eq!(resolved, "https://shop.example/checkout");
    }

    #[test]
    fn preserved_schemes_pass_through() {
        assert_eq!(resolve_attribute_url(Some("href"), "mailto:a@b.com", Some("https://shop.example/")), "mailto:a@b.com");
        assert_eq!(resolve_attribute_url(Some("href"), "#section", Some("https://shop.example/")), "#section");
    }

    #[test]
    fn non_url_attribute_value_passes_through() {
        assert_eq!(resolve_attribute_url(None, "Widget", Some("https://shop.example/")), "Widget");
    }
}
