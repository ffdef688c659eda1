use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::{Extension, Router};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use scrape_core::engine::{PluginSelection, RunnerDeps};
use scrape_core::fetchers::{ImpersonatingFetcher, ImpersonationProfile, PlainFetcher};
use scrape_core::security::{SecretString, SystemDnsResolver};
use scrape_core::types::job::Engine;
use scrape_core::{
    BudgetGuard, CandidateRegistry, Dispatcher, GovernanceGuard, IdentityCipher, IdentityManager, OracleClient, PluginRegistry, ProxyResolver, Worker,
};
use scrape_worker::kernel::{
    FilesystemBlobStore, HttpOracleTransport, PostgresArtifactRepository, PostgresCandidateRepository, PostgresCoordinationStore,
    PostgresIdentityRepository, PostgresJobAttemptRepository, PostgresJobRepository, PostgresProxyPolicyRepository,
    PostgresSchemaRepository, UnavailableOracleTransport,
};
use scrape_worker::routes::{health_handler, results_handler, status_handler, submit_handler, AppState};
use scrape_worker::Settings;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,scrape_worker=debug,scrape_core=debug,sqlx=warn".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting scrape-worker");

    let settings = Settings::from_env().context("failed to load configuration")?;
    let config = settings.pipeline_config();

    let pool = PgPoolOptions::new().max_connections(10).connect(&settings.database_url).await.context("failed to connect to database")?;
    sqlx::migrate!("./migrations").run(&pool).await.context("failed to run migrations")?;
    tracing::info!("database ready");

    let store: Arc<dyn scrape_core::CoordinationStore> = Arc::new(PostgresCoordinationStore::new(pool.clone()));
    let job_repo: Arc<dyn scrape_core::JobRepository> = Arc::new(PostgresJobRepository::new(pool.clone()));
    let attempt_repo: Arc<dyn scrape_core::JobAttemptRepository> = Arc::new(PostgresJobAttemptRepository::new(pool.clone()));
    let schema_repo: Arc<dyn scrape_core::SchemaRepository> = Arc::new(PostgresSchemaRepository::new(pool.clone()));
    let identity_repo: Arc<dyn scrape_core::IdentityRepository> = Arc::new(PostgresIdentityRepository::new(pool.clone()));
    let proxy_repo: Arc<dyn scrape_core::ProxyPolicyRepository> = Arc::new(PostgresProxyPolicyRepository::new(pool.clone()));
    let candidate_repo: Arc<dyn scrape_core::CandidateRepository> = Arc::new(PostgresCandidateRepository::new(pool.clone()));
    let artifact_repo: Arc<dyn scrape_core::ArtifactRepository> = Arc::new(PostgresArtifactRepository::new(pool.clone()));
    let blobs: Arc<dyn scrape_core::BlobStore> = Arc::new(FilesystemBlobStore::new(settings.artifact_store_dir.clone()));

    let governance = Arc::new(GovernanceGuard::new(store.clone(), config.governance.clone()));
    let budget = Arc::new(BudgetGuard::new(store.clone(), config.governance.llm_budget.clone(), config.governance.external_budget.clone()));

    let cipher_key = SecretString::new(settings.identity_cipher_key.clone());
    let identity_cipher = Arc::new(IdentityCipher::new(&cipher_key).context("invalid IDENTITY_CIPHER_KEY")?);
    let identity = Arc::new(IdentityManager::new(store.clone(), identity_repo, config.identity.clone()));
    let proxy = Arc::new(ProxyResolver::new(proxy_repo, scrape_core::ProxyMode::Direct, None));
    let plugins = Arc::new(PluginRegistry::new(Vec::new(), None));
    let candidates = Arc::new(CandidateRegistry::new(candidate_repo, config.engine.selector_promotion_threshold));

    let oracle_transport: Arc<dyn scrape_core::OracleTransport> = match &settings.oracle_endpoint {
        Some(endpoint) => Arc::new(HttpOracleTransport::new(endpoint.clone(), settings.oracle_timeout_ms)),
        None => Arc::new(UnavailableOracleTransport),
    };
    let oracle = Arc::new(OracleClient::new(oracle_transport, budget, config.oracle.clone()));

    let deps = Arc::new(RunnerDeps {
        config: config.clone(),
        coordination: store.clone(),
        governance,
        dns_resolver: Arc::new(SystemDnsResolver),
        identity,
        identity_cipher,
        proxy,
        plugins,
        fast_fetcher: Arc::new(PlainFetcher::new(config.fetch.clone())),
        stealth_fetcher: Arc::new(ImpersonatingFetcher::new(config.fetch.clone(), ImpersonationProfile::default())),
        browser_renderer: None,
        external_client: None,
        oracle,
        candidates,
    });

    let dispatcher = Dispatcher::new(store.clone(), job_repo.clone(), config.engine.clone());
    tokio::spawn(async move {
        loop {
            let did_work = dispatcher.dispatch_once(chrono::Utc::now()).await;
            if !did_work {
                tokio::time::sleep(Duration::from_millis(250)).await;
            }
        }
    });

    for engine in Engine::ORDER {
        let worker = Worker::new(
            engine,
            job_repo.clone(),
            attempt_repo.clone(),
            schema_repo.clone(),
            deps.clone(),
            PluginSelection::default(),
            config.engine.clone(),
            artifact_repo.clone(),
            blobs.clone(),
        );
        tokio::spawn(async move {
            loop {
                let now = chrono::Utc::now();
                let did_work = worker.run_once(now, now.timestamp_millis()).await;
                if !did_work {
                    tokio::time::sleep(Duration::from_millis(250)).await;
                }
            }
        });
    }

    let app_state =
        AppState { db_pool: pool, jobs: job_repo, artifacts: artifact_repo, store, dns_resolver: Arc::new(SystemDnsResolver), ssrf: config.ssrf.clone() };

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/jobs", post(submit_handler))
        .route("/jobs/:id", get(status_handler))
        .route("/jobs/:id/results", get(results_handler))
        .layer(Extension(app_state))
        .layer(tower_http::cors::CorsLayer::new().allow_origin(tower_http::cors::Any))
        .layer(tower_http::trace::TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr).await.context("failed to bind")?;
    tracing::info!(addr = %settings.bind_addr, "listening");
    axum::serve(listener, app.into_make_service()).await.context("server error")?;

    Ok(())
}
