//! In-memory `CoordinationStore`, used by `scrape-core`'s own tests and by
//! the `testing` module exposed to downstream crates. `scrape-worker`
//! backs the same trait with Postgres for multi-process deployments.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use uuid::Uuid;

use super::{CoordinationStore, RateLimitOutcome};

#[derive(Default)]
struct Inner {
    queues: HashMap<String, VecDeque<Uuid>>,
    rate_buckets: HashMap<String, (f64, i64)>,
    breaker_failures: HashMap<String, (u64, i64)>,
    breaker_open: HashMap<String, i64>,
    counters: HashMap<String, (u64, i64)>,
    cost_counters: HashMap<String, (f64, i64)>,
    bindings: HashMap<(String, String), (Uuid, Option<String>, i64)>,
}

pub struct InMemoryCoordinationStore {
    inner: Mutex<Inner>,
}

impl Default for InMemoryCoordinationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCoordinationStore {
    pub fn new() -> Self {
        Self { inner: Mutex::new(Inner::default()) }
    }
}

#[async_trait]
impl CoordinationStore for InMemoryCoordinationStore {
    async fn queue_push(&self, queue: &str, job_id: Uuid) {
        let mut inner = self.inner.lock().unwrap();
        inner.queues.entry(queue.to_string()).or_default().push_back(job_id);
    }

    async fn queue_pop(&self, queue: &str) -> Option<Uuid> {
        let mut inner = self.inner.lock().unwrap();
        inner.queues.get_mut(queue).and_then(|q| q.pop_front())
    }

    async fn queue_len(&self, queue: &str) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.queues.get(queue).map(|q| q.len()).unwrap_or(0)
    }

    async fn rate_limit_try_consume(
        &self,
        domain: &str,
        capacity: f64,
        refill_per_sec: f64,
        now_ms: i64,
    ) -> RateLimitOutcome {
        let mut inner = self.inner.lock().unwrap();
        let key = domain.to_string();
        let (tokens, last_ts) = inner.rate_buckets.get(&key).copied().unwrap_or((capacity, now_ms));
        let elapsed_ms = (now_ms - last_ts).max(0) as f64;
        let refill = elapsed_ms * refill_per_sec / 1000.0;
        let tokens = (tokens + refill).min(capacity);

        let outcome = if tokens >= 1.0 {
            inner.rate_buckets.insert(key, (tokens - 1.0, now_ms));
            RateLimitOutcome { allowed: true, retry_after_ms: 0 }
        } else {
            let retry_after_ms = ((1.0 - tokens) / refill_per_sec * 1000.0).ceil().max(0.0) as u64;
            inner.rate_buckets.insert(key, (tokens, now_ms));
            RateLimitOutcome { allowed: false, retry_after_ms }
        };
        outcome
    }

    async fn breaker_record_failure(
        &self,
        domain: &str,
        window_sec: i64,
        threshold: u64,
        cooldown_sec: i64,
        now_ms: i64,
    ) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let key = domain.to_string();
        let entry = inner.breaker_failures.get(&key).copied();
        let (count, expires_at) = match entry {
            Some((count, expires_at)) if expires_at > now_ms => (count + 1, expires_at),
            _ => (1, now_ms + window_sec * 1000),
        };
        inner.breaker_failures.insert(key.clone(), (count, expires_at));

        if count >= threshold {
            let was_open = inner.breaker_open.get(&key).is_some_and(|exp| *exp > now_ms);
            inner.breaker_open.insert(key, now_ms + cooldown_sec * 1000);
            !was_open
        } else {
            false
        }
    }

    async fn breaker_is_open(&self, domain: &str, now_ms: i64) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.breaker_open.get(domain).is_some_and(|exp| *exp > now_ms)
    }

    async fn budget_increment_and_check(&self, key: &str, window_sec: i64, max: u64, now_ms: i64) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let entry = inner.counters.get(key).copied();
        let (count, expires_at) = match entry {
            Some((count, expires_at)) if expires_at > now_ms => (count + 1, expires_at),
            _ => (1, now_ms + window_sec * 1000),
        };
        inner.counters.insert(key.to_string(), (count, expires_at));
        count <= max
    }

    async fn budget_increment_cost_and_check(&self, key: &str, window_sec: i64, by: f64, max: f64, now_ms: i64) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let entry = inner.cost_counters.get(key).copied();
        let (total, expires_at) = match entry {
            Some((total, expires_at)) if expires_at > now_ms => (total + by, expires_at),
            _ => (by, now_ms + window_sec * 1000),
        };
        inner.cost_counters.insert(key.to_string(), (total, expires_at));
        total <= max
    }

    async fn binding_get(&self, tenant: &str, domain: &str, now_ms: i64) -> Option<(Uuid, Option<String>)> {
        let inner = self.inner.lock().unwrap();
        inner
            .bindings
            .get(&(tenant.to_string(), domain.to_string()))
            .filter(|(_, _, expires_at)| *expires_at > now_ms)
            .map(|(id, proxy, _)| (*id, proxy.clone()))
    }

    async fn binding_set(&self, tenant: &str, domain: &str, identity_id: Uuid, proxy_url: Option<String>, ttl_sec: i64, now_ms: i64) {
        let mut inner = self.inner.lock().unwrap();
        inner.bindings.insert(
            (tenant.to_string(), domain.to_string()),
            (identity_id, proxy_url, now_ms + ttl_sec * 1000),
        );
    }

    async fn binding_clear(&self, tenant: &str, domain: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.bindings.remove(&(tenant.to_string(), domain.to_string()));
    }

    async fn ui_rate_increment_and_check(&self, scope: &str, actor: &str, window_sec: i64, max: u64, now_ms: i64) -> bool {
        let key = format!("ui:rate:{scope}:{actor}");
        self.budget_increment_and_check(&key, window_sec, max, now_ms).await
    }
}
