//! Testing utilities: in-memory repositories and mock collaborators for
//! exercising the pipeline without a real network, browser, or database.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use uuid::Uuid;

use crate::dispatcher::{ArtifactRepository, JobAttemptRepository, JobRepository, SchemaRepository};
use crate::error::{ExternalError, FetchError, OracleError};
use crate::fetchers::{BrowserContext, BrowserRenderer, BrowserSessionResult, FetchRequest, FetchResponse, Fetcher};
use crate::identity::IdentityRepository;
use crate::oracle::{OracleRawResponse, OracleTransport, SchemaDescription};
use crate::proxy::ProxyPolicyRepository;
use crate::selectors::{CandidateRepository, SelectorHint};
use crate::types::artifact::{Artifact, ArtifactType, BlobStore};
use crate::types::identity::Identity;
use crate::types::job::{Job, JobAttempt};
use crate::types::proxy::ProxyPolicy;
use crate::types::schema::{Schema, Selector, SelectorCandidate};

use crate::engine::ExternalClient;
use crate::engine::ExternalFetchResult;

/// A mock HTTP fetcher returning predefined responses by URL.
#[derive(Default)]
pub struct MockFetcher {
    responses: RwLock<HashMap<String, FetchResponse>>,
    fail_urls: RwLock<Vec<String>>,
    calls: RwLock<Vec<String>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(self, url: impl Into<String>, response: FetchResponse) -> Self {
        self.responses.write().unwrap().insert(url.into(), response);
        self
    }

    pub fn fail_url(self, url: impl Into<String>) -> Self {
        self.fail_urls.write().unwrap().push(url.into());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.read().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        self.calls.write().unwrap().push(request.url.clone());
        if self.fail_urls.read().unwrap().contains(&request.url) {
            return Err(FetchError::FetchFailed("mock fetch failure".to_string()));
        }
        self.responses
            .read()
            .unwrap()
            .get(&request.url)
            .cloned()
            .ok_or_else(|| FetchError::FetchFailed(format!("no mock response for {}", request.url)))
    }
}

/// A mock browser renderer returning a predefined session result per URL.
#[derive(Default)]
pub struct MockBrowserRenderer {
    sessions: RwLock<HashMap<String, Vec<crate::fetchers::Snapshot>>>,
    calls: RwLock<Vec<String>>,
}

impl MockBrowserRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshots(self, url: impl Into<String>, snapshots: Vec<crate::fetchers::Snapshot>) -> Self {
        self.sessions.write().unwrap().insert(url.into(), snapshots);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.read().unwrap().clone()
    }

    fn entry_url(context: &BrowserContext) -> String {
        match &context.traversal {
            crate::fetchers::Traversal::Explicit(pages) => pages.first().map(|p| p.url.clone()).unwrap_or_default(),
            crate::fetchers::Traversal::NextSelector { first, .. } => first.url.clone(),
        }
    }
}

#[async_trait]
impl BrowserRenderer for MockBrowserRenderer {
    async fn render(&self, context: BrowserContext) -> Result<BrowserSessionResult, FetchError> {
        let url = Self::entry_url(&context);
        self.calls.write().unwrap().push(url.clone());
        let snapshots = self.sessions.read().unwrap().get(&url).cloned().ok_or(FetchError::BrowserUnavailable)?;
        Ok(BrowserSessionResult { snapshots, cookies: context.cookies, storage_state: context.storage_state, screenshot: None, har: None })
    }
}

/// A mock external-engine client returning a predefined response per URL.
#[derive(Default)]
pub struct MockExternalClient {
    responses: RwLock<HashMap<String, ExternalFetchResult>>,
}

impl MockExternalClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(self, url: impl Into<String>, status: u16, html: impl Into<String>, cost: f64) -> Self {
        self.responses
            .write()
            .unwrap()
            .insert(url.into(), ExternalFetchResult { html: html.into(), status, headers: std::collections::BTreeMap::new(), cost });
        self
    }
}

#[async_trait]
impl ExternalClient for MockExternalClient {
    async fn fetch(&self, url: &str) -> Result<ExternalFetchResult, ExternalError> {
        self.responses.read().unwrap().get(url).cloned().ok_or(ExternalError::ProviderUnavailable)
    }
}

impl Clone for ExternalFetchResult {
    fn clone(&self) -> Self {
        Self { html: self.html.clone(), status: self.status, headers: self.headers.clone(), cost: self.cost }
    }
}

/// A mock oracle transport returning a predefined raw response, or a fixed
/// error when `fail` is set.
pub struct MockOracleTransport {
    response: OracleRawResponse,
    fail: Option<OracleError>,
    calls: Mutex<u32>,
}

impl MockOracleTransport {
    pub fn success(data: serde_json::Value, selectors: HashMap<String, String>) -> Self {
        Self {
            response: OracleRawResponse { success: true, data: Some(data), selectors: selectors.into_iter().collect(), error: None },
            fail: None,
            calls: Mutex::new(0),
        }
    }

    pub fn failing(err: OracleError) -> Self {
        Self { response: OracleRawResponse { success: false, data: None, selectors: Default::default(), error: None }, fail: Some(err), calls: Mutex::new(0) }
    }

    pub fn call_count(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl OracleTransport for MockOracleTransport {
    async fn call(&self, _html: &str, _schema: &SchemaDescription) -> Result<OracleRawResponse, OracleError> {
        *self.calls.lock().unwrap() += 1;
        if let Some(err) = &self.fail {
            return Err(err.clone_code());
        }
        Ok(self.response.clone())
    }
}

/// `OracleError` carries a `String` payload on one variant, so mocks clone by
/// reconstructing from the code rather than deriving `Clone`.
trait CloneCode {
    fn clone_code(&self) -> OracleError;
}
impl CloneCode for OracleError {
    fn clone_code(&self) -> OracleError {
        match self {
            OracleError::Unavailable => OracleError::Unavailable,
            OracleError::Failed(msg) => OracleError::Failed(msg.clone()),
            OracleError::ValidationFailed => OracleError::ValidationFailed,
        }
    }
}

/// In-memory `IdentityRepository`, keyed by id.
#[derive(Default)]
pub struct InMemoryIdentityRepository {
    identities: Mutex<Vec<Identity>>,
}

impl InMemoryIdentityRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(identities: Vec<Identity>) -> Self {
        Self { identities: Mutex::new(identities) }
    }
}

#[async_trait]
impl IdentityRepository for InMemoryIdentityRepository {
    async fn list_active(&self, tenant: &str) -> Vec<Identity> {
        self.identities.lock().unwrap().iter().filter(|i| i.tenant == tenant).cloned().collect()
    }

    async fn get(&self, id: Uuid) -> Option<Identity> {
        self.identities.lock().unwrap().iter().find(|i| i.id == id).cloned()
    }

    async fn save(&self, identity: &Identity) {
        let mut guard = self.identities.lock().unwrap();
        if let Some(existing) = guard.iter_mut().find(|i| i.id == identity.id) {
            *existing = identity.clone();
        } else {
            guard.push(identity.clone());
        }
    }
}

/// In-memory `ProxyPolicyRepository` that never has a policy configured
/// unless seeded.
#[derive(Default)]
pub struct InMemoryProxyPolicyRepository {
    policies: Mutex<HashMap<String, ProxyPolicy>>,
}

impl InMemoryProxyPolicyRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(self, policy: ProxyPolicy) -> Self {
        self.policies.lock().unwrap().insert(policy.domain.clone(), policy);
        self
    }
}

#[async_trait]
impl ProxyPolicyRepository for InMemoryProxyPolicyRepository {
    async fn get_enabled(&self, domain: &str) -> Option<ProxyPolicy> {
        self.policies.lock().unwrap().get(domain).filter(|p| p.enabled).cloned()
    }
}

/// In-memory `CandidateRepository`.
#[derive(Default)]
pub struct InMemoryCandidateRepository {
    candidates: Mutex<Vec<SelectorCandidate>>,
    active: Mutex<Vec<Selector>>,
}

impl InMemoryCandidateRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_selectors(&self) -> Vec<Selector> {
        self.active.lock().unwrap().clone()
    }
}

#[async_trait]
impl CandidateRepository for InMemoryCandidateRepository {
    async fn find_unpromoted(
        &self,
        schema_id: Uuid,
        group_name: Option<&str>,
        field: &str,
        selector: &str,
        item_selector: Option<&str>,
        attribute: Option<&str>,
    ) -> Option<SelectorCandidate> {
        self.candidates
            .lock()
            .unwrap()
            .iter()
            .find(|c| {
                c.promoted_at.is_none()
                    && c.schema_id == schema_id
                    && c.group_name.as_deref() == group_name
                    && c.field == field
                    && c.selector == selector
                    && c.item_selector.as_deref() == item_selector
                    && c.attribute.as_deref() == attribute
            })
            .cloned()
    }

    async fn save_candidate(&self, candidate: &SelectorCandidate) {
        let mut guard = self.candidates.lock().unwrap();
        if let Some(existing) = guard.iter_mut().find(|c| c.id == candidate.id) {
            *existing = candidate.clone();
        } else {
            guard.push(candidate.clone());
        }
    }

    async fn active_selector_exists(&self, candidate: &SelectorCandidate) -> bool {
        self.active.lock().unwrap().iter().any(|s| candidate.matches_selector(s))
    }

    async fn activate(&self, selector: &Selector) {
        self.active.lock().unwrap().push(selector.clone());
    }
}

/// Unused by `record_hints`, but kept importable for callers that build
/// `SelectorHint`s directly in test fixtures.
pub fn hint(map_key: impl Into<String>, selector: impl Into<String>) -> SelectorHint {
    SelectorHint { map_key: map_key.into(), selector: selector.into(), item_selector: None, attribute: None }
}

/// In-memory `JobRepository`.
#[derive(Default)]
pub struct InMemoryJobRepository {
    jobs: Mutex<Vec<Job>>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(jobs: Vec<Job>) -> Self {
        Self { jobs: Mutex::new(jobs) }
    }

    pub fn all(&self) -> Vec<Job> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn get(&self, id: Uuid) -> Option<Job> {
        self.jobs.lock().unwrap().iter().find(|j| j.id == id).cloned()
    }

    async fn save(&self, job: &Job) {
        let mut guard = self.jobs.lock().unwrap();
        if let Some(existing) = guard.iter_mut().find(|j| j.id == job.id) {
            *existing = job.clone();
        } else {
            guard.push(job.clone());
        }
    }
}

/// In-memory `JobAttemptRepository`.
#[derive(Default)]
pub struct InMemoryJobAttemptRepository {
    attempts: Mutex<Vec<JobAttempt>>,
}

impl InMemoryJobAttemptRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<JobAttempt> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn for_job(&self, job_id: Uuid) -> Vec<JobAttempt> {
        self.attempts.lock().unwrap().iter().filter(|a| a.job_id == job_id).cloned().collect()
    }
}

#[async_trait]
impl JobAttemptRepository for InMemoryJobAttemptRepository {
    async fn save(&self, attempt: &JobAttempt) {
        self.attempts.lock().unwrap().push(attempt.clone());
    }
}

/// In-memory `SchemaRepository`.
#[derive(Default)]
pub struct InMemorySchemaRepository {
    schemas: Mutex<HashMap<Uuid, Schema>>,
    selectors: Mutex<HashMap<Uuid, Vec<Selector>>>,
}

impl InMemorySchemaRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schema(self, schema: Schema, selectors: Vec<Selector>) -> Self {
        self.schemas.lock().unwrap().insert(schema.id, schema.clone());
        self.selectors.lock().unwrap().insert(schema.id, selectors);
        self
    }
}

#[async_trait]
impl SchemaRepository for InMemorySchemaRepository {
    async fn get_schema(&self, schema_id: Uuid) -> Option<Schema> {
        self.schemas.lock().unwrap().get(&schema_id).cloned()
    }

    async fn get_selectors(&self, schema_id: Uuid) -> Vec<Selector> {
        self.selectors.lock().unwrap().get(&schema_id).cloned().unwrap_or_default()
    }
}

/// In-memory `ArtifactRepository`, one slot per `(job_id, type)`.
#[derive(Default)]
pub struct InMemoryArtifactRepository {
    artifacts: Mutex<Vec<Artifact>>,
}

impl InMemoryArtifactRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtifactRepository for InMemoryArtifactRepository {
    async fn save(&self, artifact: &Artifact) {
        let mut guard = self.artifacts.lock().unwrap();
        guard.retain(|a| !(a.job_id == artifact.job_id && a.r#type == artifact.r#type));
        guard.push(artifact.clone());
    }

    async fn list_for_job(&self, job_id: Uuid) -> Vec<Artifact> {
        self.artifacts.lock().unwrap().iter().filter(|a| a.job_id == job_id).cloned().collect()
    }

    async fn find(&self, job_id: Uuid, r#type: ArtifactType) -> Option<Artifact> {
        self.artifacts.lock().unwrap().iter().find(|a| a.job_id == job_id && a.r#type == r#type).cloned()
    }
}

/// In-memory `BlobStore`: keeps bytes in a map keyed by a generated
/// `memory://<uuid>` location, for tests that need to read them back.
#[derive(Default)]
pub struct InMemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, location: &str) -> Option<Vec<u8>> {
        self.blobs.lock().unwrap().get(location).cloned()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(&self, bytes: &[u8], _content_type: &str) -> anyhow::Result<(String, String)> {
        let location = format!("memory://{}", Uuid::new_v4());
        let checksum = crate::types::artifact::sha256_hex(bytes);
        self.blobs.lock().unwrap().insert(location.clone(), bytes.to_vec());
        Ok((location, checksum))
    }
}

/// Builder for a minimal `RunnerDeps`-adjacent fixture: seeds the identity,
/// proxy, and candidate repositories a test needs and leaves everything
/// else to the caller.
pub struct TestScenario {
    pub identities: Arc<InMemoryIdentityRepository>,
    pub proxy_policies: Arc<InMemoryProxyPolicyRepository>,
    pub candidates: Arc<InMemoryCandidateRepository>,
    pub jobs: Arc<InMemoryJobRepository>,
    pub attempts: Arc<InMemoryJobAttemptRepository>,
    pub schemas: Arc<InMemorySchemaRepository>,
    pub artifacts: Arc<InMemoryArtifactRepository>,
    pub blobs: Arc<InMemoryBlobStore>,
}

impl TestScenario {
    pub fn new() -> Self {
        Self {
            identities: Arc::new(InMemoryIdentityRepository::new()),
            proxy_policies: Arc::new(InMemoryProxyPolicyRepository::new()),
            candidates: Arc::new(InMemoryCandidateRepository::new()),
            jobs: Arc::new(InMemoryJobRepository::new()),
            attempts: Arc::new(InMemoryJobAttemptRepository::new()),
            schemas: Arc::new(InMemorySchemaRepository::new()),
            artifacts: Arc::new(InMemoryArtifactRepository::new()),
            blobs: Arc::new(InMemoryBlobStore::new()),
        }
    }
}

impl Default for TestScenario {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::identity::Fingerprint;

    #[tokio::test]
    async fn mock_fetcher_returns_seeded_response_by_url() {
        let response =
            FetchResponse { url: "https://shop.example".into(), status: 200, html: "<html></html>".into(), headers: Default::default(), cookies: vec![], content_type: None, truncated: false };
        let fetcher = MockFetcher::new().with_response("https://shop.example", response);
        let out = fetcher
            .fetch(FetchRequest { url: "https://shop.example".into(), headers: Default::default(), cookies: vec![], proxy_url: None })
            .await
            .unwrap();
        assert_eq!(out.status, 200);
        assert_eq!(fetcher.calls(), vec!["https://shop.example".to_string()]);
    }

    #[tokio::test]
    async fn mock_fetcher_fails_marked_urls() {
        let fetcher = MockFetcher::new().fail_url("https://down.example");
        let err = fetcher
            .fetch(FetchRequest { url: "https://down.example".into(), headers: Default::default(), cookies: vec![], proxy_url: None })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "fetch_failed");
    }

    #[tokio::test]
    async fn in_memory_identity_repository_round_trips() {
        let now = chrono::Utc::now();
        let identity = Identity::new("t1", "a", now);
        let repo = InMemoryIdentityRepository::seeded(vec![identity.clone()]);
        assert_eq!(repo.get(identity.id).await.unwrap().tenant, "t1");
        assert_eq!(repo.list_active("t1").await.len(), 1);
        assert!(repo.list_active("t2").await.is_empty());
    }

    #[tokio::test]
    async fn in_memory_job_repository_save_overwrites_existing() {
        let now = chrono::Utc::now();
        let mut job = Job::new("https://shop.example", now);
        let repo = InMemoryJobRepository::new();
        repo.save(&job).await;
        job.state = crate::types::job::JobState::Succeeded;
        job.result = Some(serde_json::json!({}));
        repo.save(&job).await;
        assert_eq!(repo.all().len(), 1);
        assert_eq!(repo.get(job.id).await.unwrap().state, crate::types::job::JobState::Succeeded);
    }

    #[tokio::test]
    async fn mock_oracle_transport_reports_call_count() {
        let transport = MockOracleTransport::success(serde_json::json!({"title": "X"}), HashMap::new());
        let schema = SchemaDescription { flat: vec![], groups: Default::default() };
        transport.call("<html></html>", &schema).await.unwrap();
        transport.call("<html></html>", &schema).await.unwrap();
        assert_eq!(transport.call_count(), 2);
    }

    #[test]
    fn fingerprint_default_is_reusable_in_fixtures() {
        let fp = Fingerprint::default();
        assert!(!fp.user_agent.is_empty());
    }

    #[tokio::test]
    async fn in_memory_artifact_repository_replaces_same_type() {
        let now = chrono::Utc::now();
        let job_id = Uuid::new_v4();
        let repo = InMemoryArtifactRepository::new();
        repo.save(&Artifact::new(job_id, ArtifactType::Html, "loc-1", "sum-1", now)).await;
        repo.save(&Artifact::new(job_id, ArtifactType::Html, "loc-2", "sum-2", now)).await;

        let found = repo.list_for_job(job_id).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].location, "loc-2");
        assert_eq!(repo.find(job_id, ArtifactType::Screenshot).await.map(|a| a.location), None);
    }

    #[tokio::test]
    async fn in_memory_blob_store_round_trips_bytes() {
        let store = InMemoryBlobStore::new();
        let (location, checksum) = store.put(b"hello", "text/plain").await.unwrap();
        assert_eq!(store.get(&location), Some(b"hello".to_vec()));
        assert_eq!(checksum, crate::types::artifact::sha256_hex(b"hello"));
    }
}
