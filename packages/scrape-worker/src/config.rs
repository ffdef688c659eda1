//! Environment-sourced settings (spec SPEC_FULL §2.3): loaded once at
//! startup via `dotenvy` + manual `std::env::var` parsing with typed
//! defaults, then lowered into a `scrape_core::PipelineConfig`.

use std::collections::BTreeSet;

use scrape_core::types::config::{
    BreakerConfig, EngineConfig, ExternalBudgetConfig, FetchConfig, GovernanceConfig, IdentityConfig, LlmBudgetConfig,
    OracleConfig, PipelineConfig, RateLimiterConfig, SsrfConfig,
};

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub bind_addr: String,
    pub identity_cipher_key: String,
    pub worker_id: String,
    pub artifact_store_dir: String,

    pub rate_limit_capacity: f64,
    pub rate_limit_refill_per_sec: f64,

    pub breaker_failure_threshold: u64,
    pub breaker_window_sec: i64,
    pub breaker_cooldown_sec: i64,

    pub llm_max_per_job: u64,
    pub llm_max_per_tenant: u64,
    pub llm_job_window_sec: i64,
    pub llm_tenant_window_sec: i64,

    pub external_max_calls_per_tenant: u64,
    pub external_max_cost_per_tenant: f64,
    pub external_budget_window_sec: i64,
    pub external_api_key: Option<String>,
    pub external_allow_list: BTreeSet<String>,

    pub stealth_allow_list: BTreeSet<String>,
    pub router_max_depth: usize,
    pub selector_promotion_threshold: u32,

    pub identity_decay_per_hour: f64,
    pub identity_failure_threshold: u32,
    pub identity_binding_ttl_sec: i64,

    pub ssrf_allow_private_ips: bool,
    pub ssrf_deny_list: BTreeSet<String>,
    pub ssrf_allow_list: BTreeSet<String>,

    pub fetch_max_bytes: usize,
    pub fetch_timeout_ms: u64,
    pub fetch_retries: u32,
    pub fetch_backoff_ms: u64,
    pub fetch_backoff_max_ms: u64,

    pub oracle_endpoint: Option<String>,
    pub oracle_max_html_chars: usize,
    pub oracle_timeout_ms: u64,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_set(key: &str) -> BTreeSet<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect())
        .unwrap_or_default()
}

impl Settings {
    /// Loads settings from `.env` (if present) and the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL").map_err(|_| anyhow::anyhow!("DATABASE_URL is required"))?,
            bind_addr: env_or("BIND_ADDR", "0.0.0.0:8080"),
            identity_cipher_key: std::env::var("IDENTITY_CIPHER_KEY")
                .map_err(|_| anyhow::anyhow!("IDENTITY_CIPHER_KEY is required (32+ bytes)"))?,
            worker_id: env_or("WORKER_ID", "scrape-worker-1"),
            artifact_store_dir: env_or("ARTIFACT_STORE_DIR", "./data/artifacts"),

            rate_limit_capacity: env_parsed("RATE_LIMIT_CAPACITY", 5.0),
            rate_limit_refill_per_sec: env_parsed("RATE_LIMIT_REFILL_PER_SEC", 1.0),

            breaker_failure_threshold: env_parsed("BREAKER_FAILURE_THRESHOLD", 5),
            breaker_window_sec: env_parsed("BREAKER_WINDOW_SEC", 60),
            breaker_cooldown_sec: env_parsed("BREAKER_COOLDOWN_SEC", 120),

            llm_max_per_job: env_parsed("LLM_MAX_PER_JOB", 3),
            llm_max_per_tenant: env_parsed("LLM_MAX_PER_TENANT", 200),
            llm_job_window_sec: env_parsed("LLM_JOB_WINDOW_SEC", 3600),
            llm_tenant_window_sec: env_parsed("LLM_TENANT_WINDOW_SEC", 3600),

            external_max_calls_per_tenant: env_parsed("EXTERNAL_MAX_CALLS_PER_TENANT", 500),
            external_max_cost_per_tenant: env_parsed("EXTERNAL_MAX_COST_PER_TENANT", 50.0),
            external_budget_window_sec: env_parsed("EXTERNAL_BUDGET_WINDOW_SEC", 86_400),
            external_api_key: std::env::var("EXTERNAL_API_KEY").ok(),
            external_allow_list: env_set("EXTERNAL_ALLOW_LIST"),

            stealth_allow_list: env_set("STEALTH_ALLOW_LIST"),
            router_max_depth: env_parsed("ROUTER_MAX_DEPTH", 3),
            selector_promotion_threshold: env_parsed("SELECTOR_PROMOTION_THRESHOLD", 3),

            identity_decay_per_hour: env_parsed("IDENTITY_DECAY_PER_HOUR", 0.5),
            identity_failure_threshold: env_parsed("IDENTITY_FAILURE_THRESHOLD", 5),
            identity_binding_ttl_sec: env_parsed("IDENTITY_BINDING_TTL_SEC", 300),

            ssrf_allow_private_ips: env_parsed("SSRF_ALLOW_PRIVATE_IPS", false),
            ssrf_deny_list: env_set("SSRF_DENY_LIST"),
            ssrf_allow_list: env_set("SSRF_ALLOW_LIST"),

            fetch_max_bytes: env_parsed("FETCH_MAX_BYTES", 5_000_000),
            fetch_timeout_ms: env_parsed("FETCH_TIMEOUT_MS", 15_000),
            fetch_retries: env_parsed("FETCH_RETRIES", 2),
            fetch_backoff_ms: env_parsed("FETCH_BACKOFF_MS", 200),
            fetch_backoff_max_ms: env_parsed("FETCH_BACKOFF_MAX_MS", 5_000),

            oracle_endpoint: std::env::var("ORACLE_ENDPOINT").ok(),
            oracle_max_html_chars: env_parsed("ORACLE_MAX_HTML_CHARS", 20_000),
            oracle_timeout_ms: env_parsed("ORACLE_TIMEOUT_MS", 30_000),
        })
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            governance: GovernanceConfig {
                rate_limiter: RateLimiterConfig { capacity: self.rate_limit_capacity, refill_per_sec: self.rate_limit_refill_per_sec },
                breaker: BreakerConfig {
                    failure_threshold: self.breaker_failure_threshold,
                    window_sec: self.breaker_window_sec,
                    cooldown_sec: self.breaker_cooldown_sec,
                },
                llm_budget: LlmBudgetConfig {
                    max_per_job: self.llm_max_per_job,
                    max_per_tenant: self.llm_max_per_tenant,
                    job_window_sec: self.llm_job_window_sec,
                    tenant_window_sec: self.llm_tenant_window_sec,
                },
                external_budget: ExternalBudgetConfig {
                    max_calls_per_tenant: self.external_max_calls_per_tenant,
                    max_cost_per_tenant: self.external_max_cost_per_tenant,
                    window_sec: self.external_budget_window_sec,
                },
            },
            ssrf: SsrfConfig {
                allow_private_ips: self.ssrf_allow_private_ips,
                deny_list: self.ssrf_deny_list.clone(),
                allow_list: self.ssrf_allow_list.clone(),
            },
            identity: IdentityConfig {
                decay_per_hour: self.identity_decay_per_hour,
                failure_threshold: self.identity_failure_threshold,
                binding_ttl_sec: self.identity_binding_ttl_sec,
            },
            fetch: FetchConfig {
                max_bytes: self.fetch_max_bytes,
                timeout_ms: self.fetch_timeout_ms,
                retries: self.fetch_retries,
                backoff_ms: self.fetch_backoff_ms,
                backoff_max_ms: self.fetch_backoff_max_ms,
            },
            oracle: OracleConfig {
                max_html_chars: self.oracle_max_html_chars,
                endpoint: self.oracle_endpoint.clone(),
                timeout_ms: self.oracle_timeout_ms,
            },
            engine: EngineConfig {
                stealth_allow_list: self.stealth_allow_list.clone(),
                external_allow_list: self.external_allow_list.clone(),
                external_api_key_present: self.external_api_key.is_some(),
                router_max_depth: self.router_max_depth,
                selector_promotion_threshold: self.selector_promotion_threshold,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_set_splits_and_trims() {
        std::env::set_var("TEST_ALLOW_LIST", "a.example, b.example ,");
        assert_eq!(env_set("TEST_ALLOW_LIST"), BTreeSet::from(["a.example".to_string(), "b.example".to_string()]));
        std::env::remove_var("TEST_ALLOW_LIST");
    }

    #[test]
    fn env_parsed_falls_back_to_default() {
        std::env::remove_var("TEST_MISSING_INT");
        assert_eq!(env_parsed::<u64>("TEST_MISSING_INT", 42), 42);
    }
}
