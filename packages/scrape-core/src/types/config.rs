//! Tunable configuration for every pipeline subsystem. `scrape-worker`
//! builds a `PipelineConfig` from environment variables (see its
//! `config::Settings`) and passes it into the `Runtime`; nothing in this
//! crate reads the environment itself.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimiterConfig {
    /// Token bucket capacity `C`.
    pub capacity: f64,
    /// Refill rate `R`, tokens/second.
    pub refill_per_sec: f64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self { capacity: 5.0, refill_per_sec: 1.0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    pub failure_threshold: u64,
    pub window_sec: i64,
    pub cooldown_sec: i64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self { failure_threshold: 5, window_sec: 60, cooldown_sec: 120 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmBudgetConfig {
    pub max_per_job: u64,
    pub max_per_tenant: u64,
    pub job_window_sec: i64,
    pub tenant_window_sec: i64,
}

impl Default for LlmBudgetConfig {
    fn default() -> Self {
        Self { max_per_job: 3, max_per_tenant: 200, job_window_sec: 3600, tenant_window_sec: 3600 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalBudgetConfig {
    pub max_calls_per_tenant: u64,
    pub max_cost_per_tenant: f64,
    pub window_sec: i64,
}

impl Default for ExternalBudgetConfig {
    fn default() -> Self {
        Self { max_calls_per_tenant: 500, max_cost_per_tenant: 50.0, window_sec: 86_400 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernanceConfig {
    pub rate_limiter: RateLimiterConfig,
    pub breaker: BreakerConfig,
    pub llm_budget: LlmBudgetConfig,
    pub external_budget: ExternalBudgetConfig,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            rate_limiter: RateLimiterConfig::default(),
            breaker: BreakerConfig::default(),
            llm_budget: LlmBudgetConfig::default(),
            external_budget: ExternalBudgetConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SsrfConfig {
    pub allow_private_ips: bool,
    #[serde(default)]
    pub deny_list: BTreeSet<String>,
    #[serde(default)]
    pub allow_list: BTreeSet<String>,
}

impl Default for SsrfConfig {
    fn default() -> Self {
        Self { allow_private_ips: false, deny_list: BTreeSet::new(), allow_list: BTreeSet::new() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    pub decay_per_hour: f64,
    pub failure_threshold: u32,
    pub binding_ttl_sec: i64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self { decay_per_hour: 0.5, failure_threshold: 5, binding_ttl_sec: 300 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    pub max_bytes: usize,
    pub timeout_ms: u64,
    pub retries: u32,
    pub backoff_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self { max_bytes: 5_000_000, timeout_ms: 15_000, retries: 2, backoff_ms: 200, backoff_max_ms: 5_000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    pub max_html_chars: usize,
    pub endpoint: Option<String>,
    pub timeout_ms: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self { max_html_chars: 20_000, endpoint: None, timeout_ms: 30_000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub stealth_allow_list: BTreeSet<String>,
    #[serde(default)]
    pub external_allow_list: BTreeSet<String>,
    pub external_api_key_present: bool,
    pub router_max_depth: usize,
    pub selector_promotion_threshold: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stealth_allow_list: BTreeSet::new(),
            external_allow_list: BTreeSet::new(),
            external_api_key_present: false,
            router_max_depth: 3,
            selector_promotion_threshold: 3,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub governance: GovernanceConfig,
    pub ssrf: SsrfConfig,
    pub identity: IdentityConfig,
    pub fetch: FetchConfig,
    pub oracle: OracleConfig,
    pub engine: EngineConfig,
}
