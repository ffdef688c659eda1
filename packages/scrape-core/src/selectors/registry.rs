//! Selector Candidate Registry (C9): records oracle-suggested selectors and
//! promotes them to active after N successful confirmations (spec §4.9).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::types::schema::{Selector, SelectorCandidate};

#[async_trait]
pub trait CandidateRepository: Send + Sync {
    async fn find_unpromoted(&self, schema_id: Uuid, group_name: Option<&str>, field: &str, selector: &str, item_selector: Option<&str>, attribute: Option<&str>) -> Option<SelectorCandidate>;
    async fn save_candidate(&self, candidate: &SelectorCandidate);
    async fn active_selector_exists(&self, candidate: &SelectorCandidate) -> bool;
    async fn activate(&self, selector: &Selector);
}

/// One entry from an oracle's `selectors` map: `"<field>"` or
/// `"<group>.<field>"` keyed, per spec §4.9/§4.10.
pub struct SelectorHint {
    pub map_key: String,
    pub selector: String,
    pub item_selector: Option<String>,
    pub attribute: Option<String>,
}

fn split_map_key(map_key: &str) -> (Option<String>, String) {
    match map_key.split_once('.') {
        Some((group, field)) => (Some(group.to_string()), field.to_string()),
        None => (None, map_key.to_string()),
    }
}

pub struct CandidateRegistry {
    repo: std::sync::Arc<dyn CandidateRepository>,
    threshold: u32,
}

impl CandidateRegistry {
    pub fn new(repo: std::sync::Arc<dyn CandidateRepository>, threshold: u32) -> Self {
        Self { repo, threshold }
    }

    /// Records each oracle hint whose key corresponds to an active selector
    /// in `schema_selectors` (filtering happens by the caller via the
    /// allowed key set in `selectors_by_key`), bumping `success_count` on a
    /// matching un-promoted candidate or inserting a new one.
    pub async fn record_hints(&self, schema_id: Uuid, schema_selectors: &[Selector], hints: &[SelectorHint]) {
        let allowed: BTreeMap<String, &Selector> = schema_selectors.iter().map(|s| (s.map_key(), s)).collect();

        for hint in hints {
            let Some(schema_selector) = allowed.get(&hint.map_key) else { continue };
            let (group_name, field) = split_map_key(&hint.map_key);

            match self
                .repo
                .find_unpromoted(schema_id, group_name.as_deref(), &field, &hint.selector, hint.item_selector.as_deref(), hint.attribute.as_deref())
                .await
            {
                Some(mut existing) => {
                    existing.success_count += 1;
                    self.repo.save_candidate(&existing).await;
                }
                None => {
                    let mut candidate = SelectorCandidate::new(
                        schema_id,
                        group_name,
                        field,
                        hint.selector.clone(),
                        hint.item_selector.clone(),
                        hint.attribute.clone(),
                        schema_selector.data_type,
                    );
                    candidate.required = schema_selector.required;
                    self.repo.save_candidate(&candidate).await;
                }
            }
        }
    }

    /// Promotes any un-promoted candidate with `success_count >= threshold`
    /// and no matching active selector into a new active `Selector`.
    pub async fn promote_ready(&self, candidates: &[SelectorCandidate], promoted_at: DateTime<Utc>) -> Vec<SelectorCandidate> {
        let mut promoted = Vec::new();
        for candidate in candidates {
            if candidate.promoted_at.is_some() || candidate.success_count < self.threshold {
                continue;
            }
            if self.repo.active_selector_exists(candidate).await {
                continue;
            }
            let selector = candidate.clone().into_selector();
            self.repo.activate(&selector).await;
            let mut done = candidate.clone();
            done.promoted_at = Some(promoted_at);
            promoted.push(done);
        }
        promoted
    }
}
