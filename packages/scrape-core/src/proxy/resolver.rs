//! Proxy Resolver (C5): per-domain proxy policy with fallback to a global
//! default (spec §4.5).

use async_trait::async_trait;

use crate::types::proxy::{ProxyDecision, ProxyMode, ProxyPolicy, ProxySource};

#[async_trait]
pub trait ProxyPolicyRepository: Send + Sync {
    async fn get_enabled(&self, domain: &str) -> Option<ProxyPolicy>;
}

pub struct ProxyResolver {
    repo: std::sync::Arc<dyn ProxyPolicyRepository>,
    default_mode: ProxyMode,
    gateway_url: Option<String>,
}

impl ProxyResolver {
    pub fn new(repo: std::sync::Arc<dyn ProxyPolicyRepository>, default_mode: ProxyMode, gateway_url: Option<String>) -> Self {
        Self { repo, default_mode, gateway_url }
    }

    pub async fn resolve(&self, domain: &str) -> ProxyDecision {
        if let Some(policy) = self.repo.get_enabled(domain).await {
            return self.decide(policy.mode, policy.proxy_url, ProxySource::Policy);
        }
        self.decide(self.default_mode, None, ProxySource::Default)
    }

    fn decide(&self, mode: ProxyMode, custom_url: Option<String>, source: ProxySource) -> ProxyDecision {
        let proxy_url = match mode {
            ProxyMode::Direct => None,
            ProxyMode::Custom => custom_url,
            ProxyMode::Gateway => self.gateway_url.clone(),
        };
        ProxyDecision { proxy_url, source }
    }
}
