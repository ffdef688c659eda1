//! Identity Manager (C4): selection, binding, rotation, decay, and
//! mutation of browsing identities (spec §4.4).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::coordination::CoordinationStore;
use crate::proxy::ProxyResolver;
use crate::types::config::IdentityConfig;
use crate::types::identity::{Cookie, Identity, IdentityBinding};

#[async_trait]
pub trait IdentityRepository: Send + Sync {
    async fn list_active(&self, tenant: &str) -> Vec<Identity>;
    async fn get(&self, id: Uuid) -> Option<Identity>;
    async fn save(&self, identity: &Identity);
}

/// Ban-indicating error codes (spec §4.4.4): HTTP 403/429, any `blocked_*`
/// detector result, captcha/challenge signals, and any `vision_*` reason.
pub fn is_ban_indicating(code: &str) -> bool {
    matches!(code, "http_403" | "http_429" | "captcha_detected" | "challenge_script")
        || code.starts_with("blocked_")
        || code.starts_with("vision_")
}

pub struct AcquiredIdentity {
    pub identity: Identity,
    pub proxy_url: Option<String>,
    pub domain: Option<String>,
}

pub struct IdentityManager {
    store: Arc<dyn CoordinationStore>,
    repo: Arc<dyn IdentityRepository>,
    config: IdentityConfig,
}

impl IdentityManager {
    pub fn new(store: Arc<dyn CoordinationStore>, repo: Arc<dyn IdentityRepository>, config: IdentityConfig) -> Self {
        Self { store, repo, config }
    }

    /// `acquire(tenant)` (spec §4.4.1): pick the identity minimizing the
    /// ordering tuple, bump use_count/last_used_at.
    pub async fn acquire(&self, tenant: &str, now: DateTime<Utc>) -> Option<Identity> {
        let mut candidates = self.repo.list_active(tenant).await;
        candidates.retain(|i| i.is_usable());
        let chosen = candidates
            .into_iter()
            .min_by_key(|i| i.ordering_key(self.config.decay_per_hour, now))?;

        let mut chosen = chosen;
        chosen.use_count += 1;
        chosen.last_used_at = Some(now);
        self.repo.save(&chosen).await;
        Some(chosen)
    }

    fn domain_of(url: &str) -> Option<String> {
        url::Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_string))
    }

    /// `acquire_for_url(url, tenant)` (spec §4.4.2), the canonical entry
    /// point that layers session stickiness on top of `acquire`.
    pub async fn acquire_for_url(
        &self,
        url: &str,
        tenant: &str,
        proxy: &ProxyResolver,
        now: DateTime<Utc>,
    ) -> Option<AcquiredIdentity> {
        let domain = Self::domain_of(url);

        let Some(domain) = domain.filter(|_| self.config.binding_ttl_sec > 0) else {
            let identity = self.acquire(tenant, now).await?;
            return Some(AcquiredIdentity { identity, proxy_url: None, domain: Self::domain_of(url) });
        };

        let now_ms = now.timestamp_millis();
        if let Some((identity_id, proxy_url)) = self.store.binding_get(tenant, &domain, now_ms).await {
            if let Some(identity) = self.repo.get(identity_id).await {
                if identity.is_usable() {
                    self.store.binding_set(tenant, &domain, identity_id, proxy_url.clone(), self.config.binding_ttl_sec, now_ms).await;
                    return Some(AcquiredIdentity { identity, proxy_url, domain: Some(domain) });
                }
            }
            self.store.binding_clear(tenant, &domain).await;
        }

        let identity = self.acquire(tenant, now).await?;
        let decision = proxy.resolve(&domain).await;
        self.store
            .binding_set(tenant, &domain, identity.id, decision.proxy_url.clone(), self.config.binding_ttl_sec, now_ms)
            .await;
        Some(AcquiredIdentity { identity, proxy_url: decision.proxy_url, domain: Some(domain) })
    }

    /// Cookie reconciliation (spec §4.4.3): merge returned cookies with the
    /// stored set by `(name, domain, path)`, fresh values win. Returns the
    /// merged set; the caller encrypts it with `identity::crypto` and
    /// assigns `identity.cookies_encrypted` before persisting.
    pub fn merge_cookies(existing: Vec<Cookie>, fresh: Vec<Cookie>) -> Vec<Cookie> {
        let mut merged: BTreeMap<(String, String, String), Cookie> =
            existing.into_iter().map(|c| ((c.name.clone(), c.domain.clone(), c.path.clone()), c)).collect();
        for cookie in fresh {
            merged.insert((cookie.name.clone(), cookie.domain.clone(), cookie.path.clone()), cookie);
        }
        merged.into_values().collect()
    }

    pub async fn persist(&self, identity: &Identity) {
        self.repo.save(identity).await;
    }

    /// Failure handling (spec §4.4.4). Releases the (tenant, domain)
    /// binding so the next attempt rotates identities.
    pub async fn record_failure(&self, identity: &mut Identity, tenant: &str, domain: Option<&str>, code: &str, now: DateTime<Utc>) {
        if !is_ban_indicating(code) {
            return;
        }
        identity.failure_count += 1;
        identity.last_failed_at = Some(now);
        if identity.failure_count >= self.config.failure_threshold {
            identity.active = false;
        }
        self.repo.save(identity).await;
        if let Some(domain) = domain {
            self.store.binding_clear(tenant, domain).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::InMemoryCoordinationStore;
    use crate::proxy::ProxyPolicyRepository;
    use crate::types::proxy::ProxyMode;
    use std::sync::Mutex;

    struct StubIdentityRepo(Mutex<Vec<Identity>>);

    #[async_trait]
    impl IdentityRepository for StubIdentityRepo {
        async fn list_active(&self, tenant: &str) -> Vec<Identity> {
            self.0.lock().unwrap().iter().filter(|i| i.tenant == tenant).cloned().collect()
        }
        async fn get(&self, id: Uuid) -> Option<Identity> {
            self.0.lock().unwrap().iter().find(|i| i.id == id).cloned()
        }
        async fn save(&self, identity: &Identity) {
            let mut guard = self.0.lock().unwrap();
            if let Some(existing) = guard.iter_mut().find(|i| i.id == identity.id) {
                *existing = identity.clone();
            } else {
                guard.push(identity.clone());
            }
        }
    }

    struct NoProxyRepo;
    #[async_trait]
    impl ProxyPolicyRepository for NoProxyRepo {
        async fn get_enabled(&self, _domain: &str) -> Option<crate::types::proxy::ProxyPolicy> {
            None
        }
    }

    fn setup(identities: Vec<Identity>) -> (IdentityManager, ProxyResolver) {
        let store: Arc<dyn CoordinationStore> = Arc::new(InMemoryCoordinationStore::new());
        let repo: Arc<dyn IdentityRepository> = Arc::new(StubIdentityRepo(Mutex::new(identities)));
        let manager = IdentityManager::new(store, repo, IdentityConfig { decay_per_hour: 0.0, failure_threshold: 2, binding_ttl_sec: 300 });
        let proxy = ProxyResolver::new(Arc::new(NoProxyRepo), ProxyMode::Direct, None);
        (manager, proxy)
    }

    #[tokio::test]
    async fn binding_reuses_identity_within_ttl() {
        let now = Utc::now();
        let id1 = Identity::new("t1", "a", now);
        let id2 = Identity::new("t1", "b", now);
        let (manager, proxy) = setup(vec![id1.clone(), id2.clone()]);

        let first = manager.acquire_for_url("https://d.example/page", "t1", &proxy, now).await.unwrap();
        let second = manager.acquire_for_url("https://d.example/other", "t1", &proxy, now + chrono::Duration::seconds(60)).await.unwrap();
        assert_eq!(first.identity.id, second.identity.id);
    }

    #[tokio::test]
    async fn deactivated_identity_forces_rotation() {
        let now = Utc::now();
        let id1 = Identity::new("t1", "a", now);
        let id2 = Identity::new("t1", "b", now);
        let (manager, proxy) = setup(vec![id1.clone(), id2.clone()]);

        let first = manager.acquire_for_url("https://d.example/page", "t1", &proxy, now).await.unwrap();
        let mut acquired = first.identity.clone();
        manager.record_failure(&mut acquired, "t1", Some("d.example"), "http_403", now).await;
        manager.record_failure(&mut acquired, "t1", Some("d.example"), "http_403", now).await;
        assert!(!acquired.active);

        let second = manager.acquire_for_url("https://d.example/page", "t1", &proxy, now).await.unwrap();
        assert_ne!(second.identity.id, acquired.id);
    }

    #[test]
    fn merge_cookies_prefers_fresh_values_by_name_domain_path() {
        let existing = vec![Cookie { name: "sid".into(), value: "old".into(), domain: "d.example".into(), path: "/".into(), secure: false, http_only: false }];
        let fresh = vec![
            Cookie { name: "sid".into(), value: "new".into(), domain: "d.example".into(), path: "/".into(), secure: true, http_only: true },
            Cookie { name: "extra".into(), value: "v".into(), domain: "d.example".into(), path: "/".into(), secure: false, http_only: false },
        ];
        let merged = IdentityManager::merge_cookies(existing, fresh);
        assert_eq!(merged.len(), 2);
        let sid = merged.iter().find(|c| c.name == "sid").unwrap();
        assert_eq!(sid.value, "new");
    }

    #[tokio::test]
    async fn zero_ttl_skips_binding() {
        let now = Utc::now();
        let id1 = Identity::new("t1", "a", now);
        let store: Arc<dyn CoordinationStore> = Arc::new(InMemoryCoordinationStore::new());
        let repo: Arc<dyn IdentityRepository> = Arc::new(StubIdentityRepo(Mutex::new(vec![id1])));
        let manager = IdentityManager::new(store, repo, IdentityConfig { decay_per_hour: 0.0, failure_threshold: 2, binding_ttl_sec: 0 });
        let proxy = ProxyResolver::new(Arc::new(NoProxyRepo), ProxyMode::Direct, None);

        let result = manager.acquire_for_url("https://d.example", "t1", &proxy, now).await;
        assert!(result.is_some());
        assert!(manager.store.binding_get("t1", "d.example", now.timestamp_millis()).await.is_none());
    }
}
