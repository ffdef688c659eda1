//! Plugin contexts and tenant plugin configuration. Typed product types
//! standing in for the duck-typed contexts of the original implementation
//! (spec §9 design note).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TenantPluginConfig {
    pub tenant: String,
    #[serde(default)]
    pub plugins: Vec<String>,
}

/// The request about to be sent. Plugins may rewrite headers/cookies/body,
/// or the URL itself — provided the host does not change (spec §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestContext {
    pub job_id: Uuid,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub cookies: BTreeMap<String, String>,
}

impl RequestContext {
    pub fn host(&self) -> Option<String> {
        url::Url::parse(&self.url).ok().and_then(|u| u.host_str().map(str::to_string))
    }
}

/// The response as received, before detection/extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseContext {
    pub job_id: Uuid,
    pub url: String,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub html: String,
}

/// The parsed result, before it is finalized onto the Job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseContext {
    pub job_id: Uuid,
    pub data: serde_json::Value,
    pub errors: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_parses_from_request_url() {
        let ctx = RequestContext {
            job_id: Uuid::new_v4(),
            url: "https://shop.example/p/1".into(),
            headers: BTreeMap::new(),
            cookies: BTreeMap::new(),
        };
        assert_eq!(ctx.host().as_deref(), Some("shop.example"));
    }
}
