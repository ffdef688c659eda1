//! Postgres `CoordinationStore` (C1): every atomic script (token-bucket
//! refill, breaker increment+open, budget check+increment) runs inside one
//! transaction with a `FOR UPDATE` row lock, so concurrent workers across
//! processes see the same serialized mutation the in-memory store gives a
//! single process (spec §4.1, §6.2).

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use scrape_core::coordination::{CoordinationStore, RateLimitOutcome};

pub struct PostgresCoordinationStore {
    pool: PgPool,
}

impl PostgresCoordinationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CoordinationStore for PostgresCoordinationStore {
    async fn queue_push(&self, queue: &str, job_id: Uuid) {
        if let Err(e) = sqlx::query("INSERT INTO coordination_queue (queue, job_id) VALUES ($1, $2)")
            .bind(queue)
            .bind(job_id)
            .execute(&self.pool)
            .await
        {
            tracing::error!(error = %e, queue, "queue_push failed");
        }
    }

    async fn queue_pop(&self, queue: &str) -> Option<Uuid> {
        let mut tx = self.pool.begin().await.ok()?;
        let row = sqlx::query(
            "SELECT seq, job_id FROM coordination_queue WHERE queue = $1 ORDER BY seq ASC LIMIT 1 FOR UPDATE SKIP LOCKED",
        )
        .bind(queue)
        .fetch_optional(&mut *tx)
        .await
        .ok()??;
        let seq: i64 = row.get("seq");
        let job_id: Uuid = row.get("job_id");
        sqlx::query("DELETE FROM coordination_queue WHERE seq = $1").bind(seq).execute(&mut *tx).await.ok()?;
        tx.commit().await.ok()?;
        Some(job_id)
    }

    async fn queue_len(&self, queue: &str) -> usize {
        sqlx::query("SELECT COUNT(*) AS n FROM coordination_queue WHERE queue = $1")
            .bind(queue)
            .fetch_one(&self.pool)
            .await
            .map(|row| row.get::<i64, _>("n") as usize)
            .unwrap_or(0)
    }

    async fn rate_limit_try_consume(&self, domain: &str, capacity: f64, refill_per_sec: f64, now_ms: i64) -> RateLimitOutcome {
        let Ok(mut tx) = self.pool.begin().await else {
            return RateLimitOutcome { allowed: false, retry_after_ms: 1000 };
        };
        let row = sqlx::query("SELECT tokens, last_ts_ms FROM coordination_rate_bucket WHERE domain = $1 FOR UPDATE")
            .bind(domain)
            .fetch_optional(&mut *tx)
            .await
            .ok()
            .flatten();
        let (tokens, last_ts) = row.map(|r| (r.get::<f64, _>("tokens"), r.get::<i64, _>("last_ts_ms"))).unwrap_or((capacity, now_ms));

        let elapsed_ms = (now_ms - last_ts).max(0) as f64;
        let refilled = (tokens + elapsed_ms * refill_per_sec / 1000.0).min(capacity);

        let outcome = if refilled >= 1.0 {
            RateLimitOutcome { allowed: true, retry_after_ms: 0 }
        } else {
            let retry_after_ms = ((1.0 - refilled) / refill_per_sec * 1000.0).ceil().max(0.0) as u64;
            RateLimitOutcome { allowed: false, retry_after_ms }
        };
        let new_tokens = if outcome.allowed { refilled - 1.0 } else { refilled };

        let _ = sqlx::query(
            "INSERT INTO coordination_rate_bucket (domain, tokens, last_ts_ms) VALUES ($1, $2, $3)
             ON CONFLICT (domain) DO UPDATE SET tokens = EXCLUDED.tokens, last_ts_ms = EXCLUDED.last_ts_ms",
        )
        .bind(domain)
        .bind(new_tokens)
        .bind(now_ms)
        .execute(&mut *tx)
        .await;
        let _ = tx.commit().await;
        outcome
    }

    async fn breaker_record_failure(&self, domain: &str, window_sec: i64, threshold: u64, cooldown_sec: i64, now_ms: i64) -> bool {
        let Ok(mut tx) = self.pool.begin().await else { return false };
        let row = sqlx::query("SELECT count, expires_at_ms FROM coordination_breaker_failures WHERE domain = $1 FOR UPDATE")
            .bind(domain)
            .fetch_optional(&mut *tx)
            .await
            .ok()
            .flatten();
        let (count, expires_at) = match row {
            Some(r) if r.get::<i64, _>("expires_at_ms") > now_ms => (r.get::<i64, _>("count") + 1, r.get::<i64, _>("expires_at_ms")),
            _ => (1, now_ms + window_sec * 1000),
        };
        let _ = sqlx::query(
            "INSERT INTO coordination_breaker_failures (domain, count, expires_at_ms) VALUES ($1, $2, $3)
             ON CONFLICT (domain) DO UPDATE SET count = EXCLUDED.count, expires_at_ms = EXCLUDED.expires_at_ms",
        )
        .bind(domain)
        .bind(count)
        .bind(expires_at)
        .execute(&mut *tx)
        .await;

        let mut opened = false;
        if count as u64 >= threshold {
            let open_row = sqlx::query("SELECT expires_at_ms FROM coordination_breaker_open WHERE domain = $1 FOR UPDATE")
                .bind(domain)
                .fetch_optional(&mut *tx)
                .await
                .ok()
                .flatten();
            let was_open = open_row.is_some_and(|r| r.get::<i64, _>("expires_at_ms") > now_ms);
            opened = !was_open;
            let _ = sqlx::query(
                "INSERT INTO coordination_breaker_open (domain, expires_at_ms) VALUES ($1, $2)
                 ON CONFLICT (domain) DO UPDATE SET expires_at_ms = EXCLUDED.expires_at_ms",
            )
            .bind(domain)
            .bind(now_ms + cooldown_sec * 1000)
            .execute(&mut *tx)
            .await;
        }
        let _ = tx.commit().await;
        opened
    }

    async fn breaker_is_open(&self, domain: &str, now_ms: i64) -> bool {
        sqlx::query("SELECT expires_at_ms FROM coordination_breaker_open WHERE domain = $1")
            .bind(domain)
            .fetch_optional(&self.pool)
            .await
            .ok()
            .flatten()
            .is_some_and(|r| r.get::<i64, _>("expires_at_ms") > now_ms)
    }

    async fn budget_increment_and_check(&self, key: &str, window_sec: i64, max: u64, now_ms: i64) -> bool {
        let Ok(mut tx) = self.pool.begin().await else { return false };
        let row = sqlx::query("SELECT count, expires_at_ms FROM coordination_counter WHERE key = $1 FOR UPDATE")
            .bind(key)
            .fetch_optional(&mut *tx)
            .await
            .ok()
            .flatten();
        let (count, expires_at) = match row {
            Some(r) if r.get::<i64, _>("expires_at_ms") > now_ms => (r.get::<i64, _>("count") + 1, r.get::<i64, _>("expires_at_ms")),
            _ => (1, now_ms + window_sec * 1000),
        };
        let _ = sqlx::query(
            "INSERT INTO coordination_counter (key, count, expires_at_ms) VALUES ($1, $2, $3)
             ON CONFLICT (key) DO UPDATE SET count = EXCLUDED.count, expires_at_ms = EXCLUDED.expires_at_ms",
        )
        .bind(key)
        .bind(count)
        .bind(expires_at)
        .execute(&mut *tx)
        .await;
        let _ = tx.commit().await;
        count as u64 <= max
    }

    async fn budget_increment_cost_and_check(&self, key: &str, window_sec: i64, by: f64, max: f64, now_ms: i64) -> bool {
        let Ok(mut tx) = self.pool.begin().await else { return false };
        let row = sqlx::query("SELECT total, expires_at_ms FROM coordination_cost_counter WHERE key = $1 FOR UPDATE")
            .bind(key)
            .fetch_optional(&mut *tx)
            .await
            .ok()
            .flatten();
        let (total, expires_at) = match row {
            Some(r) if r.get::<i64, _>("expires_at_ms") > now_ms => (r.get::<f64, _>("total") + by, r.get::<i64, _>("expires_at_ms")),
            _ => (by, now_ms + window_sec * 1000),
        };
        let _ = sqlx::query(
            "INSERT INTO coordination_cost_counter (key, total, expires_at_ms) VALUES ($1, $2, $3)
             ON CONFLICT (key) DO UPDATE SET total = EXCLUDED.total, expires_at_ms = EXCLUDED.expires_at_ms",
        )
        .bind(key)
        .bind(total)
        .bind(expires_at)
        .execute(&mut *tx)
        .await;
        let _ = tx.commit().await;
        total <= max
    }

    async fn binding_get(&self, tenant: &str, domain: &str, now_ms: i64) -> Option<(Uuid, Option<String>)> {
        let row = sqlx::query("SELECT identity_id, proxy_url, expires_at_ms FROM coordination_binding WHERE tenant = $1 AND domain = $2")
            .bind(tenant)
            .bind(domain)
            .fetch_optional(&self.pool)
            .await
            .ok()
            .flatten()?;
        if row.get::<i64, _>("expires_at_ms") <= now_ms {
            return None;
        }
        Some((row.get("identity_id"), row.get("proxy_url")))
    }

    async fn binding_set(&self, tenant: &str, domain: &str, identity_id: Uuid, proxy_url: Option<String>, ttl_sec: i64, now_ms: i64) {
        let _ = sqlx::query(
            "INSERT INTO coordination_binding (tenant, domain, identity_id, proxy_url, expires_at_ms) VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (tenant, domain) DO UPDATE SET identity_id = EXCLUDED.identity_id, proxy_url = EXCLUDED.proxy_url, expires_at_ms = EXCLUDED.expires_at_ms",
        )
        .bind(tenant)
        .bind(domain)
        .bind(identity_id)
        .bind(proxy_url)
        .bind(now_ms + ttl_sec * 1000)
        .execute(&self.pool)
        .await;
    }

    async fn binding_clear(&self, tenant: &str, domain: &str) {
        let _ = sqlx::query("DELETE FROM coordination_binding WHERE tenant = $1 AND domain = $2")
            .bind(tenant)
            .bind(domain)
            .execute(&self.pool)
            .await;
    }

    async fn ui_rate_increment_and_check(&self, scope: &str, actor: &str, window_sec: i64, max: u64, now_ms: i64) -> bool {
        let key = format!("ui:rate:{scope}:{actor}");
        self.budget_increment_and_check(&key, window_sec, max, now_ms).await
    }
}
