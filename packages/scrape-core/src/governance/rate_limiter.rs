//! Per-domain token bucket (spec §4.2.1). The refill arithmetic and TTL
//! derivation live in `CoordinationStore::rate_limit_try_consume` so the
//! load-compute-persist cycle is one atomic operation; this type is a thin,
//! configured façade over it.

use std::sync::Arc;

use crate::coordination::{CoordinationStore, RateLimitOutcome};
use crate::types::config::RateLimiterConfig;

pub struct RateLimiter {
    store: Arc<dyn CoordinationStore>,
    config: RateLimiterConfig,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CoordinationStore>, config: RateLimiterConfig) -> Self {
        Self { store, config }
    }

    pub async fn try_consume(&self, domain: &str, now_ms: i64) -> RateLimitOutcome {
        self.store
            .rate_limit_try_consume(domain, self.config.capacity, self.config.refill_per_sec, now_ms)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::InMemoryCoordinationStore;
    use proptest::prelude::*;

    proptest! {
        /// Invariant #5: across any window longer than capacity/refill_rate,
        /// allowed requests per domain never exceed refill_rate*window + capacity.
        #[test]
        fn token_bucket_conserves_allowance(
            capacity in 1.0f64..20.0,
            refill in 0.1f64..10.0,
            window_s in 1i64..120,
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let allowed = rt.block_on(async {
                let store = Arc::new(InMemoryCoordinationStore::new());
                let limiter = RateLimiter::new(store, RateLimiterConfig { capacity, refill_per_sec: refill });
                let window_ms = window_s * 1000;
                let mut allowed = 0u64;
                let mut t = 0i64;
                while t <= window_ms {
                    let outcome = limiter.try_consume("x.example", t).await;
                    if outcome.allowed {
                        allowed += 1;
                    }
                    t += 50;
                }
                allowed
            });
            let bound = refill * window_s as f64 + capacity + 1.0;
            prop_assert!((allowed as f64) <= bound);
        }
    }
}
