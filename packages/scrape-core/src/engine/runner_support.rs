//! Helpers shared by every engine tier: identity cookie (de)cryption and the
//! oracle-recovery tail (spec §4.10, reused verbatim by `fast`/`stealth` via
//! `runner` and by `browser`).

use std::collections::BTreeMap;

use uuid::Uuid;

use crate::identity::IdentityCipher;
use crate::selectors::SelectorHint;
use crate::types::identity::{Cookie, Fingerprint, Identity};
use crate::types::schema::Selector;

use super::context::RunnerDeps;
use super::outcome::{EngineOutcome, EngineSuccess};

pub fn stored_cookies(identity: &Identity, cipher: &IdentityCipher) -> Vec<Cookie> {
    identity.cookies_encrypted.as_ref().and_then(|sealed| cipher.decrypt_json(sealed).ok()).unwrap_or_default()
}

pub fn set_stored_cookies(identity: &mut Identity, cookies: &[Cookie], cipher: &IdentityCipher) {
    identity.cookies_encrypted = cipher.encrypt_json(&cookies.to_vec()).ok();
}

/// Step 6's "identity-derived headers" (spec §4.12), shared by every tier
/// that holds an identity (`fast`/`stealth` via `runner.rs`, `browser`).
pub fn identity_headers(fingerprint: &Fingerprint) -> BTreeMap<String, String> {
    let mut headers = fingerprint.headers.clone();
    headers.insert("user-agent".to_string(), fingerprint.user_agent.clone());
    headers.insert("accept-language".to_string(), fingerprint.locale.clone());
    headers
}

pub fn filter_cookies_for_domain(cookies: &[Cookie], domain: &str) -> Vec<Cookie> {
    cookies.iter().filter(|c| c.domain == domain || domain.ends_with(&format!(".{}", c.domain))).cloned().collect()
}

pub async fn recover_via_oracle(deps: &RunnerDeps, job_id: Uuid, tenant: &str, html: &str, selectors: &[Selector], now_ms: i64) -> EngineOutcome {
    let outcome = deps.oracle.recover(job_id, tenant, html, selectors, now_ms).await?;
    if let Some(schema_id) = selectors.first().map(|s| s.schema_id) {
        let hints: Vec<SelectorHint> = outcome.hints;
        deps.candidates.record_hints(schema_id, selectors, &hints).await;
    }
    Ok(EngineSuccess { data: outcome.data, html: Some(html.to_string()), screenshot: None, har: None })
}
