//! Job and JobAttempt: the persistent unit of work and its append-only
//! attempt history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// One of the four tiers a job can be routed through, cheapest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Engine {
    Fast,
    Stealth,
    Browser,
    External,
}

impl Engine {
    /// Ordered tier list used by the dispatcher and the escalation step.
    pub const ORDER: [Engine; 4] = [Engine::Fast, Engine::Stealth, Engine::Browser, Engine::External];

    pub fn index(self) -> usize {
        Self::ORDER.iter().position(|e| *e == self).expect("Engine::ORDER is exhaustive")
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Engine::Fast => "fast",
            Engine::Stealth => "stealth",
            Engine::Browser => "browser",
            Engine::External => "external",
        }
    }
}

impl std::fmt::Display for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Ordered so `Priority::High < Priority::Standard < Priority::Low`
    /// sorts the strict-priority order directly.
    High,
    Standard,
    Low,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Standard => "standard",
            Priority::Low => "low",
        }
    }

    pub const ALL: [Priority; 3] = [Priority::High, Priority::Standard, Priority::Low];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Escalated,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub url: String,
    pub state: JobState,
    pub priority: Priority,
    pub schema_id: Option<Uuid>,
    pub tenant: Option<String>,
    pub engine: Option<Engine>,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(url: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            url: url.into(),
            state: JobState::Queued,
            priority: Priority::Standard,
            schema_id: None,
            tenant: None,
            engine: None,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn tenant_or_default(&self) -> &str {
        self.tenant.as_deref().unwrap_or("default")
    }

    /// Invariant (spec §8.1): a finished job's state/result/error triple is
    /// never ambiguous.
    pub fn invariant_holds(&self) -> bool {
        match self.state {
            JobState::Succeeded => self.result.is_some() && self.error.is_none(),
            JobState::Failed => self.error.is_some() && self.result.is_none(),
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Running,
    Succeeded,
    Failed,
    Escalated,
}

/// Append-only record of one engine attempt against a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobAttempt {
    pub id: Uuid,
    pub job_id: Uuid,
    pub engine: Engine,
    pub status: AttemptStatus,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl JobAttempt {
    pub fn start(job_id: Uuid, engine: Engine, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id,
            engine,
            status: AttemptStatus::Running,
            error: None,
            started_at: now,
            ended_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_order_matches_tier_progression() {
        assert_eq!(Engine::Fast.index(), 0);
        assert_eq!(Engine::External.index(), 3);
    }

    #[test]
    fn priority_orders_high_first() {
        let mut v = vec![Priority::Low, Priority::High, Priority::Standard];
        v.sort();
        assert_eq!(v, vec![Priority::High, Priority::Standard, Priority::Low]);
    }

    #[test]
    fn job_invariant_rejects_succeeded_without_result() {
        let mut job = Job::new("https://example.com", Utc::now());
        job.state = JobState::Succeeded;
        assert!(!job.invariant_holds());
        job.result = Some(serde_json::json!({"ok": true}));
        assert!(job.invariant_holds());
    }
}
