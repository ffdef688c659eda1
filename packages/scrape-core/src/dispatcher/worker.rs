//! Worker Loop (C14, spec §4.14): pop one job id from `engine:<name>`, run
//! that tier's engine runner, and apply the resulting success/failure/
//! escalation transition to the job and its attempt history.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::engine::{self, PluginSelection, RunnerDeps};
use crate::error::PipelineError;
use crate::plugins::PluginChain;
use crate::types::artifact::{sha256_hex, Artifact, ArtifactType, BlobStore};
use crate::types::config::EngineConfig;
use crate::types::job::{AttemptStatus, Engine, JobState};

use super::{domain_of, next_engine, ArtifactRepository, JobAttemptRepository, JobRepository, SchemaRepository};

pub struct Worker {
    engine: Engine,
    jobs: Arc<dyn JobRepository>,
    attempts: Arc<dyn JobAttemptRepository>,
    schemas: Arc<dyn SchemaRepository>,
    deps: Arc<RunnerDeps>,
    plugins: PluginSelection,
    config: EngineConfig,
    artifacts: Arc<dyn ArtifactRepository>,
    blobs: Arc<dyn BlobStore>,
}

impl Worker {
    pub fn new(
        engine: Engine,
        jobs: Arc<dyn JobRepository>,
        attempts: Arc<dyn JobAttemptRepository>,
        schemas: Arc<dyn SchemaRepository>,
        deps: Arc<RunnerDeps>,
        plugins: PluginSelection,
        config: EngineConfig,
        artifacts: Arc<dyn ArtifactRepository>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        Self { engine, jobs, attempts, schemas, deps, plugins, config, artifacts, blobs }
    }

    /// Runs one cycle against this tier's queue. Returns `false` when the
    /// queue was empty.
    pub async fn run_once(&self, now: DateTime<Utc>, now_ms: i64) -> bool {
        let queue = format!("engine:{}", self.engine.as_str());
        let Some(job_id) = self.deps.coordination.queue_pop(&queue).await else { return false };
        let Some(mut job) = self.jobs.get(job_id).await else { return true };

        job.state = JobState::Running;
        job.updated_at = now;
        self.jobs.save(&job).await;

        let mut attempt = crate::types::job::JobAttempt::start(job.id, self.engine, now);

        let Some(schema_id) = job.schema_id else {
            self.finalize_terminal(&mut job, &mut attempt, "schema_missing", now).await;
            return true;
        };
        let Some(schema) = self.schemas.get_schema(schema_id).await else {
            self.finalize_terminal(&mut job, &mut attempt, "schema_missing", now).await;
            return true;
        };
        let selectors = self.schemas.get_selectors(schema_id).await;
        if selectors.is_empty() {
            self.finalize_terminal(&mut job, &mut attempt, "no_selectors", now).await;
            return true;
        }

        let chain = match self.deps.plugins.load(&self.plugins.global, &self.plugins.tenant, &schema.plugins) {
            Ok(plugins) => PluginChain::new(plugins),
            Err(e) => {
                self.finalize_terminal(&mut job, &mut attempt, &e.code(), now).await;
                return true;
            }
        };

        let outcome = self.dispatch(&job, &selectors, &chain, now_ms).await;
        self.apply_outcome(&mut job, &mut attempt, outcome, now).await;
        true
    }

    async fn dispatch(&self, job: &crate::types::job::Job, selectors: &[crate::types::schema::Selector], chain: &PluginChain, now_ms: i64) -> engine::EngineOutcome {
        match self.engine {
            Engine::Fast => engine::fast::run(&self.deps, job, selectors, chain, now_ms).await,
            Engine::Stealth => engine::stealth::run(&self.deps, job, selectors, chain, now_ms).await,
            Engine::Browser => engine::browser::run(&self.deps, job, selectors, chain, now_ms).await,
            Engine::External => engine::external::run(&self.deps, job, selectors, chain, now_ms).await,
        }
    }

    async fn apply_outcome(
        &self,
        job: &mut crate::types::job::Job,
        attempt: &mut crate::types::job::JobAttempt,
        outcome: engine::EngineOutcome,
        now: DateTime<Utc>,
    ) {
        match outcome {
            Ok(success) => {
                self.persist_artifact(job.id, ArtifactType::Html, success.html.as_ref().map(|h| h.as_bytes().to_vec()), "text/html", now).await;
                self.persist_artifact(job.id, ArtifactType::Screenshot, success.screenshot.clone(), "image/png", now).await;
                self.persist_artifact(job.id, ArtifactType::Har, success.har.clone(), "application/json", now).await;

                job.state = JobState::Succeeded;
                job.result = Some(success.data);
                job.error = None;
                job.updated_at = now;
                attempt.status = AttemptStatus::Succeeded;
                attempt.ended_at = Some(now);
                self.jobs.save(job).await;
                self.attempts.save(attempt).await;
            }
            Err(err) => self.handle_failure(job, attempt, err, now).await,
        }
    }

    /// Stores `bytes` via the configured blob store and records the
    /// resulting location+checksum, replacing any prior artifact of the
    /// same type for this job (spec §9 artifacts). A store failure is
    /// logged and otherwise swallowed: artifact persistence never blocks a
    /// successful extraction from completing.
    async fn persist_artifact(&self, job_id: uuid::Uuid, r#type: ArtifactType, bytes: Option<Vec<u8>>, content_type: &str, now: DateTime<Utc>) {
        let Some(bytes) = bytes else { return };
        match self.blobs.put(&bytes, content_type).await {
            Ok((location, _)) => {
                let checksum = sha256_hex(&bytes);
                self.artifacts.save(&Artifact::new(job_id, r#type, location, checksum, now)).await;
            }
            Err(err) => {
                tracing::warn!(job_id = %job_id, artifact_type = ?r#type, error = %err, "failed to persist artifact");
            }
        }
    }

    async fn handle_failure(
        &self,
        job: &mut crate::types::job::Job,
        attempt: &mut crate::types::job::JobAttempt,
        err: PipelineError,
        now: DateTime<Utc>,
    ) {
        if !err.escalate {
            self.finalize_terminal(job, attempt, &err.code, now).await;
            return;
        }

        let domain = domain_of(&job.url);
        match next_engine(self.engine, &domain, &self.config) {
            Some(next) => {
                attempt.status = AttemptStatus::Escalated;
                attempt.error = Some(err.code.clone());
                attempt.ended_at = Some(now);
                self.attempts.save(attempt).await;

                job.engine = Some(next);
                job.state = JobState::Queued;
                job.error = None;
                job.updated_at = now;
                self.jobs.save(job).await;
                self.deps.coordination.queue_push(&format!("engine:{}", next.as_str()), job.id).await;
            }
            None => self.finalize_terminal(job, attempt, &err.code, now).await,
        }
    }

    async fn finalize_terminal(&self, job: &mut crate::types::job::Job, attempt: &mut crate::types::job::JobAttempt, code: &str, now: DateTime<Utc>) {
        job.state = JobState::Failed;
        job.error = Some(code.to_string());
        job.result = None;
        job.updated_at = now;
        attempt.status = AttemptStatus::Failed;
        attempt.error = Some(code.to_string());
        attempt.ended_at = Some(now);
        self.jobs.save(job).await;
        self.attempts.save(attempt).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::job::Job;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use uuid::Uuid;

    struct StubJobRepo(Mutex<Vec<Job>>);

    #[async_trait]
    impl JobRepository for StubJobRepo {
        async fn get(&self, id: Uuid) -> Option<Job> {
            self.0.lock().unwrap().iter().find(|j| j.id == id).cloned()
        }
        async fn save(&self, job: &Job) {
            let mut guard = self.0.lock().unwrap();
            if let Some(existing) = guard.iter_mut().find(|j| j.id == job.id) {
                *existing = job.clone();
            } else {
                guard.push(job.clone());
            }
        }
    }

    struct StubAttemptRepo(Mutex<Vec<crate::types::job::JobAttempt>>);

    #[async_trait]
    impl JobAttemptRepository for StubAttemptRepo {
        async fn save(&self, attempt: &crate::types::job::JobAttempt) {
            self.0.lock().unwrap().push(attempt.clone());
        }
    }

    struct NoArtifacts;
    #[async_trait]
    impl ArtifactRepository for NoArtifacts {
        async fn save(&self, _artifact: &Artifact) {}
        async fn list_for_job(&self, _job_id: Uuid) -> Vec<Artifact> {
            vec![]
        }
        async fn find(&self, _job_id: Uuid, _type: ArtifactType) -> Option<Artifact> {
            None
        }
    }

    struct NoopBlobStore;
    #[async_trait]
    impl BlobStore for NoopBlobStore {
        async fn put(&self, _bytes: &[u8], _content_type: &str) -> anyhow::Result<(String, String)> {
            Ok(("memory://noop".to_string(), String::new()))
        }
    }

    #[tokio::test]
    async fn missing_schema_fails_job_terminally() {
        let now = Utc::now();
        let mut job = Job::new("https://shop.example", now);
        job.schema_id = None;
        let job_id = job.id;

        let jobs: Arc<dyn JobRepository> = Arc::new(StubJobRepo(Mutex::new(vec![job])));
        let attempts: Arc<dyn JobAttemptRepository> = Arc::new(StubAttemptRepo(Mutex::new(vec![])));
        struct NoSchemas;
        #[async_trait]
        impl SchemaRepository for NoSchemas {
            async fn get_schema(&self, _schema_id: Uuid) -> Option<crate::types::schema::Schema> {
                None
            }
            async fn get_selectors(&self, _schema_id: Uuid) -> Vec<crate::types::schema::Selector> {
                vec![]
            }
        }

        let coordination = Arc::new(crate::coordination::InMemoryCoordinationStore::new());
        coordination.queue_push("engine:fast", job_id).await;
        let deps = Arc::new(test_deps(coordination.clone()));

        let worker = Worker::new(
            Engine::Fast,
            jobs.clone(),
            attempts,
            Arc::new(NoSchemas),
            deps,
            PluginSelection::default(),
            EngineConfig::default(),
            Arc::new(NoArtifacts),
            Arc::new(NoopBlobStore),
        );
        assert!(worker.run_once(now, 0).await);

        let finalized = jobs.get(job_id).await.unwrap();
        assert_eq!(finalized.state, JobState::Failed);
        assert_eq!(finalized.error.as_deref(), Some("schema_missing"));
    }

    struct NoIdentities;
    #[async_trait]
    impl crate::identity::IdentityRepository for NoIdentities {
        async fn list_active(&self, _tenant: &str) -> Vec<crate::types::identity::Identity> {
            vec![]
        }
        async fn get(&self, _id: Uuid) -> Option<crate::types::identity::Identity> {
            None
        }
        async fn save(&self, _identity: &crate::types::identity::Identity) {}
    }

    struct NoProxyPolicies;
    #[async_trait]
    impl crate::proxy::ProxyPolicyRepository for NoProxyPolicies {
        async fn get_enabled(&self, _domain: &str) -> Option<crate::types::proxy::ProxyPolicy> {
            None
        }
    }

    struct NoCandidates;
    #[async_trait]
    impl crate::selectors::CandidateRepository for NoCandidates {
        async fn find_unpromoted(
            &self,
            _schema_id: Uuid,
            _group_name: Option<&str>,
            _field: &str,
            _selector: &str,
            _item_selector: Option<&str>,
            _attribute: Option<&str>,
        ) -> Option<crate::types::schema::SelectorCandidate> {
            None
        }
        async fn save_candidate(&self, _candidate: &crate::types::schema::SelectorCandidate) {}
        async fn active_selector_exists(&self, _candidate: &crate::types::schema::SelectorCandidate) -> bool {
            false
        }
        async fn activate(&self, _selector: &crate::types::schema::Selector) {}
    }

    struct UnreachableOracle;
    #[async_trait]
    impl crate::oracle::OracleTransport for UnreachableOracle {
        async fn call(&self, _html: &str, _schema: &crate::oracle::SchemaDescription) -> Result<crate::oracle::OracleRawResponse, crate::error::OracleError> {
            Err(crate::error::OracleError::Unavailable)
        }
    }

    fn test_deps(coordination: Arc<crate::coordination::InMemoryCoordinationStore>) -> RunnerDeps {
        use crate::fetchers::PlainFetcher;
        use crate::governance::{BudgetGuard, GovernanceGuard};
        use crate::identity::{IdentityCipher, IdentityManager};
        use crate::oracle::OracleClient;
        use crate::plugins::PluginRegistry;
        use crate::proxy::ProxyResolver;
        use crate::security::credentials::SecretString;
        use crate::security::ssrf::SystemDnsResolver;
        use crate::selectors::CandidateRegistry;
        use crate::types::config::PipelineConfig;
        use crate::types::proxy::ProxyMode;

        let config = PipelineConfig::default();
        let store: Arc<dyn crate::coordination::CoordinationStore> = coordination;
        let budget = Arc::new(BudgetGuard::new(store.clone(), config.governance.llm_budget.clone(), config.governance.external_budget.clone()));
        RunnerDeps {
            governance: Arc::new(GovernanceGuard::new(store.clone(), config.governance.clone())),
            dns_resolver: Arc::new(SystemDnsResolver),
            identity: Arc::new(IdentityManager::new(store.clone(), Arc::new(NoIdentities), config.identity.clone())),
            identity_cipher: Arc::new(IdentityCipher::new(&SecretString::new("0".repeat(32))).expect("32-byte test key")),
            proxy: Arc::new(ProxyResolver::new(Arc::new(NoProxyPolicies), ProxyMode::Direct, None)),
            plugins: Arc::new(PluginRegistry::new(vec![], None)),
            fast_fetcher: Arc::new(PlainFetcher::new(config.fetch.clone())),
            stealth_fetcher: Arc::new(PlainFetcher::new(config.fetch.clone())),
            browser_renderer: None,
            external_client: None,
            oracle: Arc::new(OracleClient::new(Arc::new(UnreachableOracle), budget, config.oracle.clone())),
            candidates: Arc::new(CandidateRegistry::new(Arc::new(NoCandidates), config.engine.selector_promotion_threshold)),
            coordination: store,
            config,
        }
    }

    #[tokio::test]
    async fn persist_artifact_stores_bytes_and_skips_when_absent() {
        let now = Utc::now();
        let job_id = Uuid::new_v4();

        let jobs: Arc<dyn JobRepository> = Arc::new(StubJobRepo(Mutex::new(vec![])));
        let attempts: Arc<dyn JobAttemptRepository> = Arc::new(StubAttemptRepo(Mutex::new(vec![])));
        struct NoSchemas2;
        #[async_trait]
        impl SchemaRepository for NoSchemas2 {
            async fn get_schema(&self, _schema_id: Uuid) -> Option<crate::types::schema::Schema> {
                None
            }
            async fn get_selectors(&self, _schema_id: Uuid) -> Vec<crate::types::schema::Selector> {
                vec![]
            }
        }

        let coordination = Arc::new(crate::coordination::InMemoryCoordinationStore::new());
        let deps = Arc::new(test_deps(coordination));
        let artifacts = Arc::new(crate::testing::InMemoryArtifactRepository::new());
        let blobs = Arc::new(crate::testing::InMemoryBlobStore::new());

        let worker = Worker::new(
            Engine::Fast,
            jobs,
            attempts,
            Arc::new(NoSchemas2),
            deps,
            PluginSelection::default(),
            EngineConfig::default(),
            artifacts.clone(),
            blobs.clone(),
        );

        worker.persist_artifact(job_id, crate::types::artifact::ArtifactType::Html, Some(b"<html></html>".to_vec()), "text/html", now).await;
        worker.persist_artifact(job_id, crate::types::artifact::ArtifactType::Screenshot, None, "image/png", now).await;

        let saved = artifacts.list_for_job(job_id).await;
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].r#type, crate::types::artifact::ArtifactType::Html);
        assert_eq!(blobs.get(&saved[0].location), Some(b"<html></html>".to_vec()));
    }
}
