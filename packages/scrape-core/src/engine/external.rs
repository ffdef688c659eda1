//! External engine (spec §4.12): calls a third-party scraping API, gated by
//! an allow-list, per-tenant call/cost budget, and its own circuit breaker.
//! Does not consume identities.

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::detector;
use crate::error::{ExternalError, PipelineError};
use crate::plugins::PluginChain;
use crate::security::ssrf::ensure_url_allowed;
use crate::selectors::extract;
use crate::types::job::Job;
use crate::types::plugin::{ParseContext, RequestContext, ResponseContext};
use crate::types::schema::Selector;

use super::context::RunnerDeps;
use super::outcome::{EngineOutcome, EngineSuccess};
use super::runner_support::recover_via_oracle;

pub struct ExternalFetchResult {
    pub html: String,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub cost: f64,
}

#[async_trait]
pub trait ExternalClient: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<ExternalFetchResult, ExternalError>;
}

/// `external` tier (spec §4.12): gate on allow-list + API key presence,
/// breaker (namespaced under `external:<domain>`), and tenant budget; then
/// fetch, detect, extract, run parse plugins, and (on extraction errors)
/// fall back to the oracle exactly like the HTTP tiers.
pub async fn run(deps: &RunnerDeps, job: &Job, selectors: &[Selector], plugins: &PluginChain, now_ms: i64) -> EngineOutcome {
    // 3. ensure_url_allowed(url)
    ensure_url_allowed(&job.url, &deps.config.ssrf, deps.dns_resolver.as_ref()).await?;

    let domain = url::Url::parse(&job.url).ok().and_then(|u| u.host_str().map(str::to_string)).unwrap_or_default();

    if !deps.config.engine.external_allow_list.contains(&domain) {
        return Err(PipelineError::from(ExternalError::NotAllowed));
    }
    if !deps.config.engine.external_api_key_present {
        return Err(PipelineError::terminal("external_api_key_missing"));
    }
    let Some(client) = &deps.external_client else {
        return Err(PipelineError::from(ExternalError::ProviderUnconfigured));
    };

    let breaker_domain = format!("external:{domain}");
    if deps.governance.guard(&breaker_domain, now_ms).await.is_err() {
        return Err(PipelineError::from(ExternalError::CircuitOpen));
    }

    // 6-7. No identity is held by this tier, so the RequestContext carries no
    // derived headers/cookies, but request plugins still get their hook and
    // any URL rewrite is still re-validated exactly like the HTTP tiers.
    let request_ctx = RequestContext { job_id: job.id, url: job.url.clone(), headers: BTreeMap::new(), cookies: BTreeMap::new() };
    let request_ctx = plugins.run_request(request_ctx).await?;
    if request_ctx.url != job.url {
        ensure_url_allowed(&request_ctx.url, &deps.config.ssrf, deps.dns_resolver.as_ref()).await?;
    }

    let tenant = job.tenant_or_default();
    let result = client.fetch(&request_ctx.url).await;
    let result = match result {
        Ok(r) => r,
        Err(e) => {
            deps.governance.record_response_status(&breaker_domain, 502, now_ms).await;
            return Err(PipelineError::from(e));
        }
    };

    deps.governance
        .budget()
        .check_external(tenant, result.cost, now_ms)
        .await
        .map_err(|_| PipelineError::from(ExternalError::BudgetExceeded))?;
    deps.governance.record_response_status(&breaker_domain, result.status, now_ms).await;

    if let Some(code) = detector::detect_blocked_response(Some(result.status), &result.headers, &request_ctx.url, &result.html) {
        return Err(PipelineError::from_code(code));
    }

    let response_ctx = ResponseContext { job_id: job.id, url: request_ctx.url.clone(), status: result.status, headers: result.headers, html: result.html.clone() };
    let response_ctx = plugins.run_response(response_ctx).await?;

    let extracted = extract(&response_ctx.html, selectors, Some(&request_ctx.url))?;
    let parse_ctx = ParseContext { job_id: job.id, data: extracted.data, errors: extracted.errors };
    let parse_ctx = plugins.run_parse(parse_ctx).await?;

    let has_required = selectors.iter().any(|s| s.required && s.active);
    if let Some(code) = detector::detect_empty_parse(Some(result.status), Some(&parse_ctx.data), has_required, &parse_ctx.errors) {
        return Err(PipelineError::from_code(code));
    }

    if !parse_ctx.errors.is_empty() {
        let tenant = tenant.to_string();
        return recover_via_oracle(deps, job.id, &tenant, &response_ctx.html, selectors, now_ms).await;
    }

    Ok(EngineSuccess { data: parse_ctx.data, html: Some(response_ctx.html), screenshot: None, har: None })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::IpAddr;
    use std::sync::Arc;

    use crate::error::SecurityError;
    use crate::governance::{BudgetGuard, GovernanceGuard};
    use crate::identity::{IdentityCipher, IdentityManager};
    use crate::oracle::OracleClient;
    use crate::plugins::{Plugin, PluginChain};
    use crate::proxy::ProxyResolver;
    use crate::security::credentials::SecretString;
    use crate::security::ssrf::DnsResolver;
    use crate::testing::MockExternalClient;
    use crate::types::config::PipelineConfig;
    use crate::types::job::Job;
    use crate::types::proxy::ProxyMode;

    struct PublicResolver;
    #[async_trait]
    impl DnsResolver for PublicResolver {
        async fn resolve(&self, _host: &str) -> Option<Vec<IpAddr>> {
            Some(vec!["93.184.216.34".parse().unwrap()])
        }
    }

    struct NoProxyPolicies;
    #[async_trait]
    impl crate::proxy::ProxyPolicyRepository for NoProxyPolicies {
        async fn get_enabled(&self, _domain: &str) -> Option<crate::types::proxy::ProxyPolicy> {
            None
        }
    }

    struct NoIdentities;
    #[async_trait]
    impl crate::identity::IdentityRepository for NoIdentities {
        async fn list_active(&self, _tenant: &str) -> Vec<crate::types::identity::Identity> {
            vec![]
        }
        async fn get(&self, _id: uuid::Uuid) -> Option<crate::types::identity::Identity> {
            None
        }
        async fn save(&self, _identity: &crate::types::identity::Identity) {}
    }

    struct NoCandidates;
    #[async_trait]
    impl crate::selectors::CandidateRepository for NoCandidates {
        async fn find_unpromoted(
            &self,
            _schema_id: uuid::Uuid,
            _group_name: Option<&str>,
            _field: &str,
            _selector: &str,
            _item_selector: Option<&str>,
            _attribute: Option<&str>,
        ) -> Option<crate::types::schema::SelectorCandidate> {
            None
        }
        async fn save_candidate(&self, _candidate: &crate::types::schema::SelectorCandidate) {}
        async fn active_selector_exists(&self, _candidate: &crate::types::schema::SelectorCandidate) -> bool {
            false
        }
        async fn activate(&self, _selector: &Selector) {}
    }

    struct UnreachableOracle;
    #[async_trait]
    impl crate::oracle::OracleTransport for UnreachableOracle {
        async fn call(&self, _html: &str, _schema: &crate::oracle::SchemaDescription) -> Result<crate::oracle::OracleRawResponse, crate::error::OracleError> {
            Err(crate::error::OracleError::Unavailable)
        }
    }

    /// Rewrites the request to an internal host — must be caught by the
    /// re-validation after `plugins.run_request`, same as the HTTP tiers.
    struct InternalRewriter;
    #[async_trait]
    impl Plugin for InternalRewriter {
        fn name(&self) -> &str {
            "internal_rewriter"
        }
        async fn on_request(&self, mut ctx: crate::types::plugin::RequestContext) -> Result<Option<crate::types::plugin::RequestContext>, String> {
            ctx.url = "http://127.0.0.1/admin".to_string();
            Ok(Some(ctx))
        }
    }

    fn deps(external_client: Arc<dyn ExternalClient>, allow_list: std::collections::BTreeSet<String>) -> RunnerDeps {
        let mut config = PipelineConfig::default();
        config.engine.external_allow_list = allow_list;
        config.engine.external_api_key_present = true;
        let store: Arc<dyn crate::coordination::CoordinationStore> = Arc::new(crate::coordination::InMemoryCoordinationStore::new());
        let budget = Arc::new(BudgetGuard::new(store.clone(), config.governance.llm_budget.clone(), config.governance.external_budget.clone()));
        RunnerDeps {
            governance: Arc::new(GovernanceGuard::new(store.clone(), config.governance.clone())),
            dns_resolver: Arc::new(PublicResolver),
            identity: Arc::new(IdentityManager::new(store.clone(), Arc::new(NoIdentities), config.identity.clone())),
            identity_cipher: Arc::new(IdentityCipher::new(&SecretString::new("0".repeat(32))).expect("32-byte test key")),
            proxy: Arc::new(ProxyResolver::new(Arc::new(NoProxyPolicies), ProxyMode::Direct, None)),
            plugins: Arc::new(crate::plugins::PluginRegistry::new(vec![], None)),
            fast_fetcher: Arc::new(crate::testing::MockFetcher::new()),
            stealth_fetcher: Arc::new(crate::testing::MockFetcher::new()),
            browser_renderer: None,
            external_client: Some(external_client),
            oracle: Arc::new(OracleClient::new(Arc::new(UnreachableOracle), budget, config.oracle.clone())),
            candidates: Arc::new(crate::selectors::CandidateRegistry::new(Arc::new(NoCandidates), config.engine.selector_promotion_threshold)),
            coordination: store,
            config,
        }
    }

    #[tokio::test]
    async fn rejects_job_url_disallowed_by_ssrf_before_touching_client() {
        let now = chrono::Utc::now();
        let job = Job::new("http://127.0.0.1/admin", now);
        let client = Arc::new(MockExternalClient::new());
        let deps = deps(client.clone(), std::collections::BTreeSet::from(["127.0.0.1".to_string()]));

        let chain = PluginChain::new(vec![]);
        let err = run(&deps, &job, &[], &chain, 0).await.unwrap_err();
        assert_eq!(err.code, SecurityError::SsrfBlocked.code());
    }

    #[tokio::test]
    async fn request_plugin_rewrite_to_internal_host_is_rejected() {
        let now = chrono::Utc::now();
        let job = Job::new("https://api.example/v1/item", now);
        let client = Arc::new(MockExternalClient::new().with_response("http://127.0.0.1/admin", 200, "<html></html>", 0.0));
        let deps = deps(client, std::collections::BTreeSet::from(["api.example".to_string()]));

        let chain = PluginChain::new(vec![Arc::new(InternalRewriter)]);
        let err = run(&deps, &job, &[], &chain, 0).await.unwrap_err();
        assert_eq!(err.code, SecurityError::SsrfBlocked.code());
    }

    #[tokio::test]
    async fn request_plugins_run_before_fetch() {
        let now = chrono::Utc::now();
        let job = Job::new("https://api.example/v1/item", now);
        let client = Arc::new(MockExternalClient::new().with_response("https://api.example/v1/item", 200, "<html><body>ok</body></html>", 0.0));
        let deps = deps(client, std::collections::BTreeSet::from(["api.example".to_string()]));

        let chain = PluginChain::new(vec![]);
        let outcome = run(&deps, &job, &[], &chain, 0).await;
        assert!(outcome.is_ok());
    }
}
