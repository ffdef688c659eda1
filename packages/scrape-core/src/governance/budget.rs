//! LLM and external-engine budgets (spec §4.2.3). Two rolling-window
//! counters per job and per tenant; a call is denied before it is made if
//! either would overflow.

use std::sync::Arc;
use uuid::Uuid;

use crate::coordination::CoordinationStore;
use crate::error::GovernanceError;
use crate::types::config::{ExternalBudgetConfig, LlmBudgetConfig};

pub struct BudgetGuard {
    store: Arc<dyn CoordinationStore>,
    llm: LlmBudgetConfig,
    external: ExternalBudgetConfig,
}

impl BudgetGuard {
    pub fn new(store: Arc<dyn CoordinationStore>, llm: LlmBudgetConfig, external: ExternalBudgetConfig) -> Self {
        Self { store, llm, external }
    }

    /// Increments and checks both the per-job and per-tenant LLM counters.
    /// Both increments happen even if one denies, matching "each call
    /// increments both" in spec §4.2.3.
    pub async fn check_llm(&self, job_id: Uuid, tenant: &str, now_ms: i64) -> Result<(), GovernanceError> {
        let job_key = format!("llm:job:{job_id}");
        let tenant_key = format!("llm:tenant:{tenant}");
        let job_ok = self.store.budget_increment_and_check(&job_key, self.llm.job_window_sec, self.llm.max_per_job, now_ms).await;
        let tenant_ok = self
            .store
            .budget_increment_and_check(&tenant_key, self.llm.tenant_window_sec, self.llm.max_per_tenant, now_ms)
            .await;
        if job_ok && tenant_ok {
            Ok(())
        } else {
            Err(GovernanceError::LlmBudgetExceeded)
        }
    }

    pub async fn check_external(&self, tenant: &str, cost: f64, now_ms: i64) -> Result<(), GovernanceError> {
        let calls_key = format!("external:tenant:{tenant}:calls");
        let cost_key = format!("external:tenant:{tenant}:cost");
        let calls_ok = self
            .store
            .budget_increment_and_check(&calls_key, self.external.window_sec, self.external.max_calls_per_tenant, now_ms)
            .await;
        let cost_ok = self
            .store
            .budget_increment_cost_and_check(&cost_key, self.external.window_sec, cost, self.external.max_cost_per_tenant, now_ms)
            .await;
        if calls_ok && cost_ok {
            Ok(())
        } else {
            Err(GovernanceError::ExternalBudgetExceeded)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::InMemoryCoordinationStore;

    #[tokio::test]
    async fn denies_once_job_budget_is_exhausted() {
        let store: Arc<dyn CoordinationStore> = Arc::new(InMemoryCoordinationStore::new());
        let guard = BudgetGuard::new(
            store,
            LlmBudgetConfig { max_per_job: 2, max_per_tenant: 100, job_window_sec: 3600, tenant_window_sec: 3600 },
            ExternalBudgetConfig::default(),
        );
        let job = Uuid::new_v4();
        assert!(guard.check_llm(job, "t1", 0).await.is_ok());
        assert!(guard.check_llm(job, "t1", 0).await.is_ok());
        assert!(guard.check_llm(job, "t1", 0).await.is_err());
    }
}
