//! Governance Guard (C2): token-bucket rate limiter + failure-window
//! circuit breaker per domain, plus LLM/external budgets (spec §4.2).

pub mod breaker;
pub mod budget;
pub mod rate_limiter;

use std::sync::Arc;
use std::time::Duration;

use crate::coordination::CoordinationStore;
use crate::error::GovernanceError;
use crate::types::config::GovernanceConfig;

pub use breaker::CircuitBreaker;
pub use budget::BudgetGuard;
pub use rate_limiter::RateLimiter;

/// The single entry point called before every outbound network attempt
/// (spec §4.2.4): `guard(url) -> null | circuit_open | rate_limited`.
pub struct GovernanceGuard {
    store: Arc<dyn CoordinationStore>,
    config: GovernanceConfig,
    rate_limiter: RateLimiter,
    breaker: CircuitBreaker,
    budget: BudgetGuard,
}

impl GovernanceGuard {
    pub fn new(store: Arc<dyn CoordinationStore>, config: GovernanceConfig) -> Self {
        Self {
            rate_limiter: RateLimiter::new(store.clone(), config.rate_limiter.clone()),
            breaker: CircuitBreaker::new(store.clone(), config.breaker.clone()),
            budget: BudgetGuard::new(store.clone(), config.llm_budget.clone(), config.external_budget.clone()),
            store,
            config,
        }
    }

    /// Non-blocking admission check for one domain.
    pub async fn guard(&self, domain: &str, now_ms: i64) -> Result<(), GovernanceError> {
        if self.breaker.is_open(domain, now_ms).await {
            return Err(GovernanceError::CircuitOpen);
        }
        let outcome = self.rate_limiter.try_consume(domain, now_ms).await;
        if !outcome.allowed {
            return Err(GovernanceError::RateLimited { retry_after_ms: outcome.retry_after_ms });
        }
        Ok(())
    }

    /// Blocking variant: waits up to `max_wait_ms`, sleeping
    /// `min(retry_after_ms, remaining)` on each deny (spec §4.2.1).
    /// `max_wait_ms == 0` is equivalent to the non-blocking `guard`.
    pub async fn guard_blocking(&self, domain: &str, max_wait_ms: u64, mut now_ms: i64) -> Result<(), GovernanceError> {
        if self.breaker.is_open(domain, now_ms).await {
            return Err(GovernanceError::CircuitOpen);
        }
        let mut waited_ms: u64 = 0;
        loop {
            let outcome = self.rate_limiter.try_consume(domain, now_ms).await;
            if outcome.allowed {
                return Ok(());
            }
            let remaining = max_wait_ms.saturating_sub(waited_ms);
            if remaining == 0 {
                return Err(GovernanceError::RateLimited { retry_after_ms: outcome.retry_after_ms });
            }
            let sleep_ms = outcome.retry_after_ms.min(remaining);
            tokio::time::sleep(Duration::from_millis(sleep_ms)).await;
            waited_ms += sleep_ms;
            now_ms += sleep_ms as i64;
        }
    }

    /// Record a response status for the breaker (spec §4.2.2).
    pub async fn record_response_status(&self, domain: &str, status: u16, now_ms: i64) {
        if matches!(status, 403 | 429) {
            self.breaker.record_failure(domain, now_ms).await;
        }
    }

    /// Breaker-only admission check, used by tiers that bypass the C2 token
    /// bucket (the `browser` tier) but must still honor the breaker.
    pub async fn breaker_open(&self, domain: &str, now_ms: i64) -> bool {
        self.breaker.is_open(domain, now_ms).await
    }

    pub fn budget(&self) -> &BudgetGuard {
        &self.budget
    }

    pub fn config(&self) -> &GovernanceConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn CoordinationStore> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::InMemoryCoordinationStore;

    #[tokio::test]
    async fn guard_allows_then_denies_then_opens() {
        let store: Arc<dyn CoordinationStore> = Arc::new(InMemoryCoordinationStore::new());
        let mut config = GovernanceConfig::default();
        config.rate_limiter.capacity = 2.0;
        config.rate_limiter.refill_per_sec = 1.0;
        config.breaker.failure_threshold = 1;
        let guard = GovernanceGuard::new(store, config);

        assert!(guard.guard("a.example", 0).await.is_ok());
        assert!(guard.guard("a.example", 0).await.is_ok());
        assert!(matches!(guard.guard("a.example", 0).await, Err(GovernanceError::RateLimited { .. })));

        guard.record_response_status("a.example", 403, 0).await;
        assert!(matches!(guard.guard("a.example", 10).await, Err(GovernanceError::CircuitOpen)));
    }
}
