//! Extraction Oracle Client (C10): calls an external structured-extraction
//! service with a schema-shaped response contract, enforcing per-job/tenant
//! budgets and falling back to local selector inference (spec §4.10).

use async_trait::async_trait;
use scraper::{ElementRef, Html};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::OracleError;
use crate::governance::BudgetGuard;
use crate::selectors::{normalize_data, SelectorHint};
use crate::types::config::OracleConfig;
use crate::types::schema::Selector;

/// Lowered schema description sent to the oracle: one entry per flat field,
/// one entry per group (with its own per-field shape).
#[derive(Debug, Clone, serde::Serialize)]
pub struct FieldDescription {
    pub key: String,
    pub data_type: String,
    pub required: bool,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SchemaDescription {
    pub flat: Vec<FieldDescription>,
    pub groups: BTreeMap<String, Vec<FieldDescription>>,
}

pub fn lower_schema(selectors: &[Selector]) -> SchemaDescription {
    let mut flat = Vec::new();
    let mut groups: BTreeMap<String, Vec<FieldDescription>> = BTreeMap::new();
    for sel in selectors.iter().filter(|s| s.active) {
        let desc = FieldDescription { key: sel.field.clone(), data_type: format!("{:?}", sel.data_type).to_lowercase(), required: sel.required };
        match &sel.group_name {
            Some(group) => groups.entry(group.clone()).or_default().push(desc),
            None => flat.push(desc),
        }
    }
    SchemaDescription { flat, groups }
}

/// Truncates HTML to `max_chars` by keeping the head half and tail half with
/// a marker in between, so the oracle still sees page furniture at both ends.
pub fn truncate_html(html: &str, max_chars: usize) -> String {
    if html.chars().count() <= max_chars {
        return html.to_string();
    }
    let half = max_chars / 2;
    let chars: Vec<char> = html.chars().collect();
    let head: String = chars[..half].iter().collect();
    let tail: String = chars[chars.len().saturating_sub(half)..].iter().collect();
    format!("{head}\n<!-- truncated -->\n{tail}")
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct OracleRawResponse {
    pub success: bool,
    pub data: Option<Value>,
    #[serde(default)]
    pub selectors: BTreeMap<String, String>,
    pub error: Option<String>,
}

#[async_trait]
pub trait OracleTransport: Send + Sync {
    async fn call(&self, html: &str, schema: &SchemaDescription) -> Result<OracleRawResponse, OracleError>;
}

pub struct OracleOutcome {
    pub data: Value,
    pub hints: Vec<SelectorHint>,
}

pub struct OracleClient {
    transport: Arc<dyn OracleTransport>,
    budget: Arc<BudgetGuard>,
    config: OracleConfig,
}

impl OracleClient {
    pub fn new(transport: Arc<dyn OracleTransport>, budget: Arc<BudgetGuard>, config: OracleConfig) -> Self {
        Self { transport, budget, config }
    }

    /// `recover(job_id, tenant, html, selectors, base_url)` (spec §4.10).
    pub async fn recover(&self, job_id: Uuid, tenant: &str, html: &str, selectors: &[Selector], now_ms: i64) -> Result<OracleOutcome, OracleError> {
        self.budget.check_llm(job_id, tenant, now_ms).await.map_err(|_| OracleError::Unavailable)?;

        let truncated = truncate_html(html, self.config.max_html_chars);
        let schema = lower_schema(selectors);
        let raw = self.transport.call(&truncated, &schema).await?;

        if !raw.success {
            return Err(OracleError::Failed(raw.error.unwrap_or_else(|| "oracle call unsuccessful".to_string())));
        }
        let data = raw.data.ok_or(OracleError::ValidationFailed)?;

        let allowed_keys: std::collections::BTreeSet<String> = selectors.iter().filter(|s| s.active).map(|s| s.map_key()).collect();
        let mut filtered: BTreeMap<String, String> = raw.selectors.into_iter().filter(|(k, _)| allowed_keys.contains(k)).collect();

        if filtered.is_empty() {
            filtered = infer_selectors_locally(html, &data, selectors);
        }

        let normalized = normalize_data(&data, selectors);
        if !normalized.errors.is_empty() {
            return Err(OracleError::ValidationFailed);
        }

        let hints = filtered
            .into_iter()
            .map(|(map_key, selector)| SelectorHint { map_key, selector, item_selector: None, attribute: None })
            .collect();

        Ok(OracleOutcome { data: normalized.data, hints })
    }
}

fn build_selector_for_element(el: ElementRef) -> Option<String> {
    let value = el.value();
    if let Some(id) = value.attr("id") {
        if !id.trim().is_empty() {
            return Some(format!("#{id}"));
        }
    }
    if let Some(class_attr) = value.attr("class") {
        if let Some(first_class) = class_attr.split_whitespace().next() {
            return Some(format!("{}.{first_class}", value.name()));
        }
    }
    None
}

fn find_text_match(document: &Html, target: &str) -> Option<(String, Option<String>)> {
    let target = target.trim();
    if target.is_empty() {
        return None;
    }
    for el in document.root_element().descendants().filter_map(ElementRef::wrap) {
        let text: String = el.text().collect::<Vec<_>>().join("").trim().to_string();
        if text == target {
            if let Some(selector) = build_selector_for_element(el) {
                return Some((selector, None));
            }
        }
        for (attr_name, attr_value) in el.value().attrs() {
            if attr_value == target {
                if let Some(selector) = build_selector_for_element(el) {
                    return Some((selector, Some(attr_name.to_string())));
                }
            }
        }
    }
    None
}

/// Best-effort local re-derivation when the oracle returns data without
/// selector hints: walk all body descendants and match each flat value
/// against node text or an attribute value (spec §4.10).
///
/// Group fields are skipped: without an existing `item_selector` anchor for
/// the group there is no reliable way to locate the item nodes, so no
/// candidate is recorded for them (promotion is conditional on finding a
/// selector at all).
fn infer_selectors_locally(html: &str, data: &Value, selectors: &[Selector]) -> BTreeMap<String, String> {
    let document = Html::parse_document(html);
    let mut found = BTreeMap::new();

    let Value::Object(map) = data else { return found };
    for sel in selectors.iter().filter(|s| s.active && s.group_name.is_none()) {
        let Some(Value::String(value)) = map.get(&sel.field) else { continue };
        if let Some((selector, _attribute)) = find_text_match(&document, value) {
            found.insert(sel.field.clone(), selector);
        }
    }
    found
}
