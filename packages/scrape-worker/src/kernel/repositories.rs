//! Postgres-backed repositories implementing the `scrape-core` storage
//! traits (spec §6.3): jobs/attempts for the dispatcher and worker loop,
//! schemas/selectors for the extractor, identities for rotation, proxy
//! policy for the resolver, and selector candidates for promotion.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use scrape_core::dispatcher::{ArtifactRepository, JobAttemptRepository, JobRepository, SchemaRepository};
use scrape_core::identity::IdentityRepository;
use scrape_core::proxy::ProxyPolicyRepository;
use scrape_core::selectors::CandidateRepository;
use scrape_core::types::artifact::{Artifact, ArtifactType};
use scrape_core::types::identity::{Fingerprint, Identity};
use scrape_core::types::job::{AttemptStatus, Engine, Job, JobAttempt, JobState, Priority};
use scrape_core::types::proxy::{ProxyMode, ProxyPolicy};
use scrape_core::types::schema::{DataType, Schema, Selector, SelectorCandidate};

fn engine_to_str(e: Engine) -> &'static str {
    e.as_str()
}

fn engine_from_str(s: &str) -> Option<Engine> {
    Engine::ORDER.into_iter().find(|e| e.as_str() == s)
}

fn priority_to_str(p: Priority) -> &'static str {
    p.as_str()
}

fn priority_from_str(s: &str) -> Priority {
    Priority::ALL.into_iter().find(|p| p.as_str() == s).unwrap_or(Priority::Standard)
}

fn state_to_str(s: JobState) -> &'static str {
    match s {
        JobState::Queued => "queued",
        JobState::Running => "running",
        JobState::Succeeded => "succeeded",
        JobState::Failed => "failed",
        JobState::Escalated => "escalated",
    }
}

fn state_from_str(s: &str) -> JobState {
    match s {
        "running" => JobState::Running,
        "succeeded" => JobState::Succeeded,
        "failed" => JobState::Failed,
        "escalated" => JobState::Escalated,
        _ => JobState::Queued,
    }
}

fn attempt_status_to_str(s: AttemptStatus) -> &'static str {
    match s {
        AttemptStatus::Running => "running",
        AttemptStatus::Succeeded => "succeeded",
        AttemptStatus::Failed => "failed",
        AttemptStatus::Escalated => "escalated",
    }
}

fn attempt_status_from_str(s: &str) -> AttemptStatus {
    match s {
        "succeeded" => AttemptStatus::Succeeded,
        "failed" => AttemptStatus::Failed,
        "escalated" => AttemptStatus::Escalated,
        _ => AttemptStatus::Running,
    }
}

fn data_type_to_str(t: DataType) -> &'static str {
    match t {
        DataType::String => "string",
        DataType::Int => "int",
        DataType::Float => "float",
        DataType::Bool => "bool",
    }
}

fn data_type_from_str(s: &str) -> DataType {
    match s {
        "int" => DataType::Int,
        "float" => DataType::Float,
        "bool" => DataType::Bool,
        _ => DataType::String,
    }
}

fn proxy_mode_to_str(m: ProxyMode) -> &'static str {
    match m {
        ProxyMode::Direct => "direct",
        ProxyMode::Gateway => "gateway",
        ProxyMode::Custom => "custom",
    }
}

fn proxy_mode_from_str(s: &str) -> ProxyMode {
    match s {
        "gateway" => ProxyMode::Gateway,
        "custom" => ProxyMode::Custom,
        _ => ProxyMode::Direct,
    }
}

fn artifact_type_to_str(t: ArtifactType) -> &'static str {
    match t {
        ArtifactType::Html => "html",
        ArtifactType::Screenshot => "screenshot",
        ArtifactType::Har => "har",
        ArtifactType::Ocr => "ocr",
    }
}

fn artifact_type_from_str(s: &str) -> ArtifactType {
    match s {
        "screenshot" => ArtifactType::Screenshot,
        "har" => ArtifactType::Har,
        "ocr" => ArtifactType::Ocr,
        _ => ArtifactType::Html,
    }
}

fn row_to_job(row: &sqlx::postgres::PgRow) -> Job {
    Job {
        id: row.get("id"),
        url: row.get("url"),
        state: state_from_str(row.get::<&str, _>("state")),
        priority: priority_from_str(row.get::<&str, _>("priority")),
        schema_id: row.get("schema_id"),
        tenant: row.get("tenant"),
        engine: row.get::<Option<&str>, _>("engine").and_then(engine_from_str),
        result: row.get("result"),
        error: row.get("error"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_attempt(row: &sqlx::postgres::PgRow) -> JobAttempt {
    JobAttempt {
        id: row.get("id"),
        job_id: row.get("job_id"),
        engine: engine_from_str(row.get::<&str, _>("engine")).unwrap_or(Engine::Fast),
        status: attempt_status_from_str(row.get::<&str, _>("status")),
        error: row.get("error"),
        started_at: row.get("started_at"),
        ended_at: row.get("ended_at"),
    }
}

fn row_to_selector(row: &sqlx::postgres::PgRow) -> Selector {
    Selector {
        id: row.get("id"),
        schema_id: row.get("schema_id"),
        group_name: row.get("group_name"),
        field: row.get("field"),
        selector: row.get("selector"),
        item_selector: row.get("item_selector"),
        attribute: row.get("attribute"),
        data_type: data_type_from_str(row.get::<&str, _>("data_type")),
        required: row.get("required"),
        active: row.get("active"),
    }
}

fn row_to_candidate(row: &sqlx::postgres::PgRow) -> SelectorCandidate {
    SelectorCandidate {
        id: row.get("id"),
        schema_id: row.get("schema_id"),
        group_name: row.get("group_name"),
        field: row.get("field"),
        selector: row.get("selector"),
        item_selector: row.get("item_selector"),
        attribute: row.get("attribute"),
        data_type: data_type_from_str(row.get::<&str, _>("data_type")),
        required: row.get("required"),
        success_count: row.get::<i32, _>("success_count") as u32,
        promoted_at: row.get("promoted_at"),
    }
}

fn row_to_artifact(row: &sqlx::postgres::PgRow) -> Artifact {
    Artifact {
        id: row.get("id"),
        job_id: row.get("job_id"),
        r#type: artifact_type_from_str(row.get::<&str, _>("type")),
        location: row.get("location"),
        checksum: row.get("checksum"),
        created_at: row.get("created_at"),
    }
}

fn row_to_identity(row: &sqlx::postgres::PgRow) -> Identity {
    let fingerprint: Fingerprint = serde_json::from_value(row.get("fingerprint")).unwrap_or_default();
    Identity {
        id: row.get("id"),
        tenant: row.get("tenant"),
        label: row.get("label"),
        fingerprint,
        cookies_encrypted: row.get("cookies_encrypted"),
        storage_state_encrypted: row.get("storage_state_encrypted"),
        active: row.get("active"),
        use_count: row.get::<i64, _>("use_count") as u64,
        failure_count: row.get::<i64, _>("failure_count") as u32,
        last_used_at: row.get("last_used_at"),
        last_failed_at: row.get("last_failed_at"),
        created_at: row.get("created_at"),
    }
}

pub struct PostgresJobRepository {
    pool: PgPool,
}

impl PostgresJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobRepository for PostgresJobRepository {
    async fn get(&self, id: Uuid) -> Option<Job> {
        sqlx::query("SELECT * FROM jobs WHERE id = $1").bind(id).fetch_optional(&self.pool).await.ok().flatten().map(|r| row_to_job(&r))
    }

    async fn save(&self, job: &Job) {
        let engine = job.engine.map(engine_to_str);
        if let Err(e) = sqlx::query(
            "INSERT INTO jobs (id, url, state, priority, schema_id, tenant, engine, result, error, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             ON CONFLICT (id) DO UPDATE SET
                state = EXCLUDED.state, priority = EXCLUDED.priority, schema_id = EXCLUDED.schema_id,
                tenant = EXCLUDED.tenant, engine = EXCLUDED.engine, result = EXCLUDED.result,
                error = EXCLUDED.error, updated_at = EXCLUDED.updated_at",
        )
        .bind(job.id)
        .bind(&job.url)
        .bind(state_to_str(job.state))
        .bind(priority_to_str(job.priority))
        .bind(job.schema_id)
        .bind(&job.tenant)
        .bind(engine)
        .bind(&job.result)
        .bind(&job.error)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await
        {
            tracing::error!(error = %e, job_id = %job.id, "job save failed");
        }
    }
}

pub struct PostgresJobAttemptRepository {
    pool: PgPool,
}

impl PostgresJobAttemptRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobAttemptRepository for PostgresJobAttemptRepository {
    async fn save(&self, attempt: &JobAttempt) {
        if let Err(e) = sqlx::query(
            "INSERT INTO job_attempts (id, job_id, engine, status, error, started_at, ended_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (id) DO UPDATE SET status = EXCLUDED.status, error = EXCLUDED.error, ended_at = EXCLUDED.ended_at",
        )
        .bind(attempt.id)
        .bind(attempt.job_id)
        .bind(engine_to_str(attempt.engine))
        .bind(attempt_status_to_str(attempt.status))
        .bind(&attempt.error)
        .bind(attempt.started_at)
        .bind(attempt.ended_at)
        .execute(&self.pool)
        .await
        {
            tracing::error!(error = %e, attempt_id = %attempt.id, "job attempt save failed");
        }
    }
}

pub struct PostgresSchemaRepository {
    pool: PgPool,
}

impl PostgresSchemaRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SchemaRepository for PostgresSchemaRepository {
    async fn get_schema(&self, schema_id: Uuid) -> Option<Schema> {
        let row = sqlx::query("SELECT id, name, description, plugins FROM schemas WHERE id = $1")
            .bind(schema_id)
            .fetch_optional(&self.pool)
            .await
            .ok()
            .flatten()?;
        let plugins: Vec<String> = serde_json::from_value(row.get("plugins")).unwrap_or_default();
        Some(Schema { id: row.get("id"), name: row.get("name"), description: row.get("description"), plugins })
    }

    async fn get_selectors(&self, schema_id: Uuid) -> Vec<Selector> {
        sqlx::query("SELECT * FROM selectors WHERE schema_id = $1 AND active ORDER BY field")
            .bind(schema_id)
            .fetch_all(&self.pool)
            .await
            .unwrap_or_default()
            .iter()
            .map(row_to_selector)
            .collect()
    }
}

pub struct PostgresIdentityRepository {
    pool: PgPool,
}

impl PostgresIdentityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityRepository for PostgresIdentityRepository {
    async fn list_active(&self, tenant: &str) -> Vec<Identity> {
        sqlx::query("SELECT * FROM identities WHERE tenant = $1 AND active")
            .bind(tenant)
            .fetch_all(&self.pool)
            .await
            .unwrap_or_default()
            .iter()
            .map(row_to_identity)
            .collect()
    }

    async fn get(&self, id: Uuid) -> Option<Identity> {
        sqlx::query("SELECT * FROM identities WHERE id = $1").bind(id).fetch_optional(&self.pool).await.ok().flatten().map(|r| row_to_identity(&r))
    }

    async fn save(&self, identity: &Identity) {
        let fingerprint = serde_json::to_value(&identity.fingerprint).unwrap_or(serde_json::Value::Null);
        if let Err(e) = sqlx::query(
            "INSERT INTO identities (id, tenant, label, fingerprint, cookies_encrypted, storage_state_encrypted, active, use_count, failure_count, last_used_at, last_failed_at, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
             ON CONFLICT (id) DO UPDATE SET
                fingerprint = EXCLUDED.fingerprint, cookies_encrypted = EXCLUDED.cookies_encrypted,
                storage_state_encrypted = EXCLUDED.storage_state_encrypted, active = EXCLUDED.active,
                use_count = EXCLUDED.use_count, failure_count = EXCLUDED.failure_count,
                last_used_at = EXCLUDED.last_used_at, last_failed_at = EXCLUDED.last_failed_at",
        )
        .bind(identity.id)
        .bind(&identity.tenant)
        .bind(&identity.label)
        .bind(fingerprint)
        .bind(&identity.cookies_encrypted)
        .bind(&identity.storage_state_encrypted)
        .bind(identity.active)
        .bind(identity.use_count as i64)
        .bind(identity.failure_count as i64)
        .bind(identity.last_used_at)
        .bind(identity.last_failed_at)
        .bind(identity.created_at)
        .execute(&self.pool)
        .await
        {
            tracing::error!(error = %e, identity_id = %identity.id, "identity save failed");
        }
    }
}

pub struct PostgresProxyPolicyRepository {
    pool: PgPool,
}

impl PostgresProxyPolicyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProxyPolicyRepository for PostgresProxyPolicyRepository {
    async fn get_enabled(&self, domain: &str) -> Option<ProxyPolicy> {
        let row = sqlx::query("SELECT domain, mode, proxy_url, enabled FROM proxy_policies WHERE domain = $1 AND enabled")
            .bind(domain)
            .fetch_optional(&self.pool)
            .await
            .ok()
            .flatten()?;
        Some(ProxyPolicy {
            domain: row.get("domain"),
            mode: proxy_mode_from_str(row.get::<&str, _>("mode")),
            proxy_url: row.get("proxy_url"),
            enabled: row.get("enabled"),
        })
    }
}

pub struct PostgresCandidateRepository {
    pool: PgPool,
}

impl PostgresCandidateRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CandidateRepository for PostgresCandidateRepository {
    async fn find_unpromoted(
        &self,
        schema_id: Uuid,
        group_name: Option<&str>,
        field: &str,
        selector: &str,
        item_selector: Option<&str>,
        attribute: Option<&str>,
    ) -> Option<SelectorCandidate> {
        sqlx::query(
            "SELECT * FROM selector_candidates
             WHERE promoted_at IS NULL AND schema_id = $1
               AND group_name IS NOT DISTINCT FROM $2 AND field = $3 AND selector = $4
               AND item_selector IS NOT DISTINCT FROM $5 AND attribute IS NOT DISTINCT FROM $6",
        )
        .bind(schema_id)
        .bind(group_name)
        .bind(field)
        .bind(selector)
        .bind(item_selector)
        .bind(attribute)
        .fetch_optional(&self.pool)
        .await
        .ok()
        .flatten()
        .map(|r| row_to_candidate(&r))
    }

    async fn save_candidate(&self, candidate: &SelectorCandidate) {
        if let Err(e) = sqlx::query(
            "INSERT INTO selector_candidates (id, schema_id, group_name, field, selector, item_selector, attribute, data_type, required, success_count, promoted_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             ON CONFLICT (id) DO UPDATE SET success_count = EXCLUDED.success_count, promoted_at = EXCLUDED.promoted_at",
        )
        .bind(candidate.id)
        .bind(candidate.schema_id)
        .bind(&candidate.group_name)
        .bind(&candidate.field)
        .bind(&candidate.selector)
        .bind(&candidate.item_selector)
        .bind(&candidate.attribute)
        .bind(data_type_to_str(candidate.data_type))
        .bind(candidate.required)
        .bind(candidate.success_count as i32)
        .bind(candidate.promoted_at)
        .execute(&self.pool)
        .await
        {
            tracing::error!(error = %e, candidate_id = %candidate.id, "candidate save failed");
        }
    }

    async fn active_selector_exists(&self, candidate: &SelectorCandidate) -> bool {
        sqlx::query(
            "SELECT 1 FROM selectors
             WHERE active AND schema_id = $1 AND group_name IS NOT DISTINCT FROM $2 AND field = $3
               AND selector = $4 AND item_selector IS NOT DISTINCT FROM $5 AND attribute IS NOT DISTINCT FROM $6",
        )
        .bind(candidate.schema_id)
        .bind(&candidate.group_name)
        .bind(&candidate.field)
        .bind(&candidate.selector)
        .bind(&candidate.item_selector)
        .bind(&candidate.attribute)
        .fetch_optional(&self.pool)
        .await
        .ok()
        .flatten()
        .is_some()
    }

    async fn activate(&self, selector: &Selector) {
        if let Err(e) = sqlx::query(
            "INSERT INTO selectors (id, schema_id, group_name, field, selector, item_selector, attribute, data_type, required, active)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, true)",
        )
        .bind(selector.id)
        .bind(selector.schema_id)
        .bind(&selector.group_name)
        .bind(&selector.field)
        .bind(&selector.selector)
        .bind(&selector.item_selector)
        .bind(&selector.attribute)
        .bind(data_type_to_str(selector.data_type))
        .bind(selector.required)
        .execute(&self.pool)
        .await
        {
            tracing::error!(error = %e, selector_id = %selector.id, "selector activate failed");
        }
    }
}

pub struct PostgresArtifactRepository {
    pool: PgPool,
}

impl PostgresArtifactRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ArtifactRepository for PostgresArtifactRepository {
    async fn save(&self, artifact: &Artifact) {
        if let Err(e) = sqlx::query(
            "INSERT INTO artifacts (id, job_id, type, location, checksum, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (job_id, type) DO UPDATE SET
                id = EXCLUDED.id, location = EXCLUDED.location, checksum = EXCLUDED.checksum, created_at = EXCLUDED.created_at",
        )
        .bind(artifact.id)
        .bind(artifact.job_id)
        .bind(artifact_type_to_str(artifact.r#type))
        .bind(&artifact.location)
        .bind(&artifact.checksum)
        .bind(artifact.created_at)
        .execute(&self.pool)
        .await
        {
            tracing::error!(error = %e, job_id = %artifact.job_id, "artifact save failed");
        }
    }

    async fn list_for_job(&self, job_id: Uuid) -> Vec<Artifact> {
        sqlx::query("SELECT * FROM artifacts WHERE job_id = $1 ORDER BY type")
            .bind(job_id)
            .fetch_all(&self.pool)
            .await
            .unwrap_or_default()
            .iter()
            .map(row_to_artifact)
            .collect()
    }

    async fn find(&self, job_id: Uuid, r#type: ArtifactType) -> Option<Artifact> {
        sqlx::query("SELECT * FROM artifacts WHERE job_id = $1 AND type = $2")
            .bind(job_id)
            .bind(artifact_type_to_str(r#type))
            .fetch_optional(&self.pool)
            .await
            .ok()
            .flatten()
            .map(|r| row_to_artifact(&r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_str_round_trips() {
        for e in Engine::ORDER {
            assert_eq!(engine_from_str(engine_to_str(e)), Some(e));
        }
    }

    #[test]
    fn data_type_str_round_trips() {
        for t in [DataType::String, DataType::Int, DataType::Float, DataType::Bool] {
            assert_eq!(data_type_from_str(data_type_to_str(t)), t);
        }
    }

    #[test]
    fn proxy_mode_str_round_trips() {
        for m in [ProxyMode::Direct, ProxyMode::Gateway, ProxyMode::Custom] {
            assert_eq!(proxy_mode_from_str(proxy_mode_to_str(m)), m);
        }
    }

    #[test]
    fn artifact_type_str_round_trips() {
        for t in [ArtifactType::Html, ArtifactType::Screenshot, ArtifactType::Har, ArtifactType::Ocr] {
            assert_eq!(artifact_type_from_str(artifact_type_to_str(t)), t);
        }
    }
}
