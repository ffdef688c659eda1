//! Schema, Selector and SelectorCandidate: the extraction contract and the
//! directives that implement it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub plugins: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    String,
    Int,
    Float,
    Bool,
}

/// Which parser a selector string should be evaluated with. A bare
/// selector with no prefix is CSS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectorDialect {
    Css,
    Xpath,
}

/// Split a raw selector string into its dialect and the remaining
/// selector text, per the `xpath:`/`css:` prefix convention.
pub fn parse_dialect(raw: &str) -> (SelectorDialect, &str) {
    if let Some(rest) = raw.strip_prefix("xpath:") {
        (SelectorDialect::Xpath, rest)
    } else if let Some(rest) = raw.strip_prefix("css:") {
        (SelectorDialect::Css, rest)
    } else {
        (SelectorDialect::Css, raw)
    }
}

/// An active extraction directive. `group_name` presence means this
/// selector is a field of a list-of-items group; all selectors sharing a
/// group must agree on `item_selector`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Selector {
    pub id: Uuid,
    pub schema_id: Uuid,
    pub group_name: Option<String>,
    pub field: String,
    pub selector: String,
    pub item_selector: Option<String>,
    pub attribute: Option<String>,
    pub data_type: DataType,
    pub required: bool,
    pub active: bool,
}

impl Selector {
    /// The key this selector is addressed by in an oracle selector map:
    /// `field` for flat, `group.field` for grouped.
    pub fn map_key(&self) -> String {
        match &self.group_name {
            Some(group) => format!("{group}.{}", self.field),
            None => self.field.clone(),
        }
    }
}

/// A proposed selector awaiting promotion. Mirrors `Selector`'s identifying
/// fields plus a confirmation counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorCandidate {
    pub id: Uuid,
    pub schema_id: Uuid,
    pub group_name: Option<String>,
    pub field: String,
    pub selector: String,
    pub item_selector: Option<String>,
    pub attribute: Option<String>,
    pub data_type: DataType,
    pub required: bool,
    pub success_count: u32,
    pub promoted_at: Option<DateTime<Utc>>,
}

impl SelectorCandidate {
    pub fn new(
        schema_id: Uuid,
        group_name: Option<String>,
        field: impl Into<String>,
        selector: impl Into<String>,
        item_selector: Option<String>,
        attribute: Option<String>,
        data_type: DataType,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            schema_id,
            group_name,
            field: field.into(),
            selector: selector.into(),
            item_selector,
            attribute,
            data_type,
            required: false,
            success_count: 1,
            promoted_at: None,
        }
    }

    /// Identity key used for dedup when a new oracle hint arrives (spec §4.9).
    pub fn dedup_key(&self) -> (Uuid, Option<String>, String, String, Option<String>, Option<String>) {
        (
            self.schema_id,
            self.group_name.clone(),
            self.field.clone(),
            self.selector.clone(),
            self.item_selector.clone(),
            self.attribute.clone(),
        )
    }

    pub fn matches_selector(&self, s: &Selector) -> bool {
        self.schema_id == s.schema_id
            && self.group_name == s.group_name
            && self.field == s.field
            && self.selector == s.selector
            && self.item_selector == s.item_selector
            && self.attribute == s.attribute
    }

    pub fn into_selector(self) -> Selector {
        Selector {
            id: Uuid::new_v4(),
            schema_id: self.schema_id,
            group_name: self.group_name,
            field: self.field,
            selector: self.selector,
            item_selector: self.item_selector,
            attribute: self.attribute,
            data_type: self.data_type,
            required: self.required,
            active: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_selects_dialect() {
        assert_eq!(parse_dialect("xpath://div").0, SelectorDialect::Xpath);
        assert_eq!(parse_dialect("css:.title").0, SelectorDialect::Css);
        assert_eq!(parse_dialect(".title").0, SelectorDialect::Css);
        assert_eq!(parse_dialect(".title").1, ".title");
    }

    #[test]
    fn map_key_includes_group() {
        let sel = Selector {
            id: Uuid::new_v4(),
            schema_id: Uuid::new_v4(),
            group_name: Some("items".into()),
            field: "price".into(),
            selector: ".price".into(),
            item_selector: Some(".item".into()),
            attribute: None,
            data_type: DataType::Float,
            required: true,
            active: true,
        };
        assert_eq!(sel.map_key(), "items.price");
    }
}
