//! Coordination Store (C1): a durable key/value service supporting atomic
//! increments, list push/pop, expirations, and scripted compare-and-update
//! for multi-key mutations (spec §4.1, §6.2).
//!
//! The trait bakes each atomic script (token-bucket refill, breaker
//! increment+open, budget check+increment) directly into one method so
//! every implementation — this crate's in-memory one, or `scrape-worker`'s
//! Postgres-backed one — performs the mutation under a single lock/
//! transaction rather than leaving the race in the caller.

pub mod memory;

use async_trait::async_trait;
use uuid::Uuid;

pub use memory::InMemoryCoordinationStore;

/// Result of one token-bucket admission check (spec §4.2.1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitOutcome {
    pub allowed: bool,
    pub retry_after_ms: u64,
}

#[async_trait]
pub trait CoordinationStore: Send + Sync {
    // -- Priority / engine queues (§6.2 `priority:*`, `engine:*`) --
    async fn queue_push(&self, queue: &str, job_id: Uuid);
    async fn queue_pop(&self, queue: &str) -> Option<Uuid>;
    async fn queue_len(&self, queue: &str) -> usize;

    // -- Rate limiter (§4.2.1, key `rate:<domain>`) --
    async fn rate_limit_try_consume(
        &self,
        domain: &str,
        capacity: f64,
        refill_per_sec: f64,
        now_ms: i64,
    ) -> RateLimitOutcome;

    // -- Circuit breaker (§4.2.2, keys `breaker:<domain>:{failures,open}`) --
    /// Record a 403/429 response for `domain`; returns true if this call
    /// caused the breaker to open.
    async fn breaker_record_failure(
        &self,
        domain: &str,
        window_sec: i64,
        threshold: u64,
        cooldown_sec: i64,
        now_ms: i64,
    ) -> bool;
    async fn breaker_is_open(&self, domain: &str, now_ms: i64) -> bool;

    // -- Budgets (§4.2.3, keys `llm:job:<id>`, `llm:tenant:<t>`, `external:tenant:<t>:*`) --
    /// Increments the counter for `key` and returns whether the value
    /// (after increment) stays within `max` for the rolling `window_sec`.
    async fn budget_increment_and_check(&self, key: &str, window_sec: i64, max: u64, now_ms: i64) -> bool;
    async fn budget_increment_cost_and_check(&self, key: &str, window_sec: i64, by: f64, max: f64, now_ms: i64) -> bool;

    // -- Identity bindings (§6.2 `identity:binding:<tenant>:<domain>`) --
    async fn binding_get(&self, tenant: &str, domain: &str, now_ms: i64) -> Option<(Uuid, Option<String>)>;
    async fn binding_set(&self, tenant: &str, domain: &str, identity_id: Uuid, proxy_url: Option<String>, ttl_sec: i64, now_ms: i64);
    async fn binding_clear(&self, tenant: &str, domain: &str);

    // -- Generic UI/admin rate limit counters (§6.2 `ui:rate:<scope>:<actor>`) --
    async fn ui_rate_increment_and_check(&self, scope: &str, actor: &str, window_sec: i64, max: u64, now_ms: i64) -> bool;
}
