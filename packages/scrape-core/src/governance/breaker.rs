//! Per-domain circuit breaker (spec §4.2.2). Opens after `threshold`
//! 403/429 responses within `window_sec`; stays open for `cooldown_sec`.

use std::sync::Arc;

use crate::coordination::CoordinationStore;
use crate::types::config::BreakerConfig;

pub struct CircuitBreaker {
    store: Arc<dyn CoordinationStore>,
    config: BreakerConfig,
}

impl CircuitBreaker {
    pub fn new(store: Arc<dyn CoordinationStore>, config: BreakerConfig) -> Self {
        Self { store, config }
    }

    /// Records a failure; returns true if this call just opened the breaker.
    pub async fn record_failure(&self, domain: &str, now_ms: i64) -> bool {
        self.store
            .breaker_record_failure(domain, self.config.window_sec, self.config.failure_threshold, self.config.cooldown_sec, now_ms)
            .await
    }

    pub async fn is_open(&self, domain: &str, now_ms: i64) -> bool {
        self.store.breaker_is_open(domain, now_ms).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::InMemoryCoordinationStore;

    #[tokio::test]
    async fn opens_exactly_once_at_threshold() {
        let store: Arc<dyn CoordinationStore> = Arc::new(InMemoryCoordinationStore::new());
        let breaker = CircuitBreaker::new(store, BreakerConfig { failure_threshold: 3, window_sec: 60, cooldown_sec: 30 });

        assert!(!breaker.record_failure("a.example", 0).await);
        assert!(!breaker.record_failure("a.example", 1).await);
        assert!(breaker.record_failure("a.example", 2).await);
        assert!(!breaker.record_failure("a.example", 3).await);
        assert!(breaker.is_open("a.example", 10).await);
        assert!(!breaker.is_open("a.example", 30_001).await);
    }
}
