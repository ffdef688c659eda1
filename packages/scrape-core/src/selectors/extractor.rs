//! Selector Extractor (C8): parses HTML into structured records per schema,
//! supporting flat fields and grouped (list) item schemas (spec §4.8).

use scraper::{ElementRef, Html, Selector as CssSelector};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::ExtractError;
use crate::types::schema::{parse_dialect, Selector, SelectorDialect};

use super::coerce::{coerce_str, coerce_value, resolve_attribute_url};

/// Result of a selector-driven parse: structured data plus any non-fatal
/// per-field error codes (`missing:<field>`, `type:<field>`, …).
#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    pub data: Value,
    pub errors: Vec<String>,
}

fn node_attribute_or_text(el: ElementRef, attribute: Option<&str>) -> Option<String> {
    match attribute {
        Some(attr) => el.value().attr(attr).map(str::to_string),
        None => {
            let text: String = el.text().collect::<Vec<_>>().join("").trim().to_string();
            if text.is_empty() {
                None
            } else {
                Some(text)
            }
        }
    }
}

fn css_selector(raw: &str) -> Option<CssSelector> {
    CssSelector::parse(raw).ok()
}

/// Splits selectors into flat (no `group_name`) and grouped buckets. A group
/// is valid only if every member selector agrees on `item_selector`;
/// otherwise it is dropped and its required members emit
/// `missing_group_selector:<group>`.
fn partition<'a>(selectors: &'a [Selector]) -> (Vec<&'a Selector>, BTreeMap<String, Vec<&'a Selector>>) {
    let mut flat = Vec::new();
    let mut groups: BTreeMap<String, Vec<&Selector>> = BTreeMap::new();
    for sel in selectors {
        match &sel.group_name {
            None => flat.push(sel),
            Some(group) => groups.entry(group.clone()).or_default().push(sel),
        }
    }
    (flat, groups)
}

fn group_item_selector(members: &[&Selector]) -> Option<String> {
    let first = members.first()?.item_selector.clone();
    if members.iter().all(|s| s.item_selector == first) {
        first
    } else {
        None
    }
}

/// `extract(html, selectors, base_url)` (spec §4.8). Fails fast with
/// `ExtractError::ParselUnavailable` if any selector requests the `xpath:`
/// dialect — this build only evaluates CSS selectors.
pub fn extract(html: &str, selectors: &[Selector], base_url: Option<&str>) -> Result<ExtractionOutcome, ExtractError> {
    let active: Vec<&Selector> = selectors.iter().filter(|s| s.active).collect();
    for sel in &active {
        if parse_dialect(&sel.selector).0 == SelectorDialect::Xpath {
            return Err(ExtractError::ParselUnavailable);
        }
    }

    let document = Html::parse_document(html);
    let mut errors = Vec::new();
    let mut data = Map::new();

    let (flat, groups) = partition(&active.into_iter().cloned().collect::<Vec<_>>());

    for sel in &flat {
        let nodes: Vec<ElementRef> = match css_selector(&sel.selector) {
            Some(parsed) => document.select(&parsed).collect(),
            None => Vec::new(),
        };
        let raw = nodes.first().and_then(|el| node_attribute_or_text(*el, sel.attribute.as_deref()));
        let Some(raw) = raw else {
            if sel.required {
                errors.push(format!("missing:{}", sel.field));
            }
            continue;
        };
        let normalized = resolve_attribute_url(sel.attribute.as_deref(), &raw, base_url);
        match coerce_str(sel.data_type, &normalized) {
            Some(value) => {
                data.insert(sel.field.clone(), value);
            }
            None => errors.push(format!("type:{}", sel.field)),
        }
    }

    for (group_name, members) in &groups {
        let Some(item_selector) = group_item_selector(members) else {
            for sel in members.iter().filter(|s| s.required) {
                errors.push(format!("missing_group_selector:{group_name}"));
                let _ = sel;
            }
            continue;
        };
        let Some(item_css) = item_selector.as_deref().and_then(css_selector) else {
            errors.push(format!("missing_group_selector:{group_name}"));
            continue;
        };

        let mut items = Vec::new();
        for (index, item_node) in document.select(&item_css).enumerate() {
            let mut item_map = Map::new();
            for sel in members {
                let nodes: Vec<ElementRef> = match css_selector(&sel.selector) {
                    Some(parsed) => item_node.select(&parsed).collect(),
                    None => Vec::new(),
                };
                let raw = nodes.first().and_then(|el| node_attribute_or_text(*el, sel.attribute.as_deref()));
                let Some(raw) = raw else {
                    if sel.required {
                        errors.push(format!("missing:{group_name}.{}:{index}", sel.field));
                    }
                    continue;
                };
                let normalized = resolve_attribute_url(sel.attribute.as_deref(), &raw, base_url);
                match coerce_str(sel.data_type, &normalized) {
                    Some(value) => {
                        item_map.insert(sel.field.clone(), value);
                    }
                    None => errors.push(format!("type:{group_name}.{}:{index}", sel.field)),
                }
            }
            items.push(Value::Object(item_map));
        }
        data.insert(group_name.clone(), Value::Array(items));
    }

    Ok(ExtractionOutcome { data: Value::Object(data), errors })
}

/// Applies the same coercions `extract` applies to live HTML nodes, but to
/// already-structured data (e.g. an oracle response), per spec §4.8.
pub fn normalize_data(data: &Value, selectors: &[Selector]) -> ExtractionOutcome {
    let active: Vec<&Selector> = selectors.iter().filter(|s| s.active).collect();
    let (flat, groups) = partition(&active);
    let mut errors = Vec::new();
    let mut out = Map::new();

    let Value::Object(input) = data else {
        return ExtractionOutcome { data: Value::Object(out), errors };
    };

    for sel in &flat {
        match input.get(&sel.field) {
            Some(value) if !value.is_null() => match coerce_value(sel.data_type, value) {
                Some(coerced) => {
                    out.insert(sel.field.clone(), coerced);
                }
                None => errors.push(format!("type:{}", sel.field)),
            },
            _ => {
                if sel.required {
                    errors.push(format!("missing:{}", sel.field));
                }
            }
        }
    }

    for (group_name, members) in &groups {
        let Some(raw_items) = input.get(group_name).and_then(Value::as_array) else {
            if members.iter().any(|s| s.required) {
                errors.push(format!("missing:{group_name}"));
            }
            continue;
        };
        let mut items = Vec::new();
        for (index, raw_item) in raw_items.iter().enumerate() {
            let mut item_map = Map::new();
            let Some(raw_obj) = raw_item.as_object() else { continue };
            for sel in members {
                match raw_obj.get(&sel.field) {
                    Some(value) if !value.is_null() => match coerce_value(sel.data_type, value) {
                        Some(coerced) => {
                            item_map.insert(sel.field.clone(), coerced);
                        }
                        None => errors.push(format!("type:{group_name}.{}:{index}", sel.field)),
                    },
                    _ => {
                        if sel.required {
                            errors.push(format!("missing:{group_name}.{}:{index}", sel.field));
                        }
                    }
                }
            }
            items.push(Value::Object(item_map));
        }
        out.insert(group_name.clone(), Value::Array(items));
    }

    ExtractionOutcome { data: Value::Object(out), errors }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::schema::DataType;
    use uuid::Uuid;

    fn sel(field: &str, selector: &str, data_type: DataType, required: bool, attribute: Option<&str>) -> Selector {
        Selector {
            id: Uuid::new_v4(),
            schema_id: Uuid::new_v4(),
            group_name: None,
            field: field.to_string(),
            selector: selector.to_string(),
            item_selector: None,
            attribute: attribute.map(str::to_string),
            data_type,
            required,
            active: true,
        }
    }

    fn grouped_sel(group: &str, item_selector: &str, field: &str, selector: &str, data_type: DataType, required: bool, attribute: Option<&str>) -> Selector {
        let mut s = sel(field, selector, data_type, required, attribute);
        s.group_name = Some(group.to_string());
        s.item_selector = Some(item_selector.to_string());
        s
    }

    #[test]
    fn s1_simple_product_page() {
        let html = r#"<html><body><h1 class="title">Widget</h1><span class="price">19.99</span><a class="buy" href="/checkout">Buy</a><span class="sku" data-sku="W-1">SKU</span></body></html>"#;
        let selectors = vec![
            sel("title", "h1.title", DataType::String, true, None),
            sel("price", ".price", DataType::Float, true, None),
            sel("buy_url", "a.buy", DataType::String, true, Some("href")),
            sel("sku", ".sku", DataType::String, false, Some("data-sku")),
        ];
        let outcome = extract(html, &selectors, Some("https://shop.example/p/1")).unwrap();
        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.data["title"], "Widget");
        assert_eq!(outcome.data["price"], 19.99);
        assert_eq!(outcome.data["buy_url"], "https://shop.example/checkout");
        assert_eq!(outcome.data["sku"], "W-1");
    }

    #[test]
    fn s2_grouped_list() {
        let html = r#"<html><body>
            <article class="item"><a class="title" href="/item-1">Item One</a><span class="price">1,234</span></article>
            <article class="item"><a class="title" href="https://example.com/item-2">Item Two</a><span class="price">2,345</span></article>
        </body></html>"#;
        let selectors = vec![
            grouped_sel("items", "article.item", "name", "a.title", DataType::String, true, None),
            grouped_sel("items", "article.item", "url", "a.title", DataType::String, true, Some("href")),
            grouped_sel("items", "article.item", "price", ".price", DataType::Int, true, None),
        ];
        let outcome = extract(html, &selectors, Some("https://example.com/listing")).unwrap();
        assert!(outcome.errors.is_empty());
        let items = outcome.data["items"].as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["name"], "Item One");
        assert_eq!(items[0]["url"], "https://example.com/item-1");
        assert_eq!(items[0]["price"], 1234);
        assert_eq!(items[1]["url"], "https://example.com/item-2");
        assert_eq!(items[1]["price"], 2345);
    }

    #[test]
    fn missing_required_field_is_reported() {
        let html = "<html><body></body></html>";
        let selectors = vec![sel("title", "h1.title", DataType::String, true, None)];
        let outcome = extract(html, &selectors, None).unwrap();
        assert_eq!(outcome.errors, vec!["missing:title".to_string()]);
    }

    #[test]
    fn type_mismatch_is_reported() {
        let html = r#"<html><body><span class="price">not-a-number</span></body></html>"#;
        let selectors = vec![sel("price", ".price", DataType::Float, true, None)];
        let outcome = extract(html, &selectors, None).unwrap();
        assert_eq!(outcome.errors, vec!["type:price".to_string()]);
    }

    #[test]
    fn xpath_selector_fails_parsel_unavailable() {
        let selectors = vec![sel("title", "xpath://h1", DataType::String, true, None)];
        let err = extract("<html></html>", &selectors, None).unwrap_err();
        assert_eq!(err, ExtractError::ParselUnavailable);
    }

    #[test]
    fn mismatched_group_item_selector_emits_missing_group_error() {
        let mut a = grouped_sel("items", "article.item", "name", "a.title", DataType::String, true, None);
        let b = grouped_sel("items", "div.item", "price", ".price", DataType::Int, true, None);
        a.item_selector = Some("article.item".to_string());
        let selectors = vec![a, b];
        let outcome = extract("<html><body></body></html>", &selectors, None).unwrap();
        assert!(outcome.errors.iter().any(|e| e == "missing_group_selector:items"));
    }

    #[test]
    fn normalize_data_is_idempotent_for_all_string_schema() {
        let selectors = vec![sel("title", "h1.title", DataType::String, true, None)];
        let input = serde_json::json!({"title": "Widget"});
        let once = normalize_data(&input, &selectors);
        let twice = normalize_data(&once.data, &selectors);
        assert_eq!(once.data, twice.data);
    }

    #[test]
    fn normalize_data_matches_html_extraction_for_string_schema() {
        let html = r#"<html><body><h1 class="title">Widget</h1></body></html>"#;
        let selectors = vec![sel("title", "h1.title", DataType::String, true, None)];
        let from_html = extract(html, &selectors, None).unwrap();
        let oracle_shaped = serde_json::json!({"title": "Widget"});
        let from_oracle = normalize_data(&oracle_shaped, &selectors);
        assert_eq!(from_html.data, from_oracle.data);
    }
}
