//! # Scrape Core
//!
//! The fetch/extract pipeline at the heart of a multi-tenant web scraping
//! platform: tiered fetch engines (fast → stealth → browser → external),
//! per-domain governance (rate limiting, circuit breaking, budgets), SSRF
//! protection, identity binding and rotation, anti-bot detection,
//! selector-driven extraction with a candidate-promotion registry, a plugin
//! hook chain, and an LLM extraction-oracle recovery path.
//!
//! ## Pipeline
//!
//! ```text
//! Dispatcher (C13): priority:<p> queue -> engine:<name> queue
//! Worker (C14): engine:<name> queue -> engine runner (C12) -> terminal state
//!
//! Engine runner, per tier:
//!   governance guard -> identity/proxy acquisition -> fetch -> anti-bot
//!   detection -> request/response plugin hooks -> selector extraction ->
//!   parse plugin hook -> oracle recovery on extraction errors -> candidate
//!   promotion on oracle hints
//! ```
//!
//! ## Modules
//!
//! - [`types`] - domain types: Job, Identity, Schema, Selector, config (§3)
//! - [`error`] - typed errors per subsystem, unified by [`error::PipelineError`]
//! - [`coordination`] - durable key/value store backing every atomic script (C1)
//! - [`governance`] - rate limiter, circuit breaker, budgets (C2)
//! - [`security`] - SSRF protection and credential handling (C3)
//! - [`identity`] - identity acquisition, rotation, encrypted persistence (C4)
//! - [`proxy`] - per-domain proxy policy resolution (C5)
//! - [`plugins`] - tenant/schema plugin hook chain (C6)
//! - [`detector`] - anti-bot / blocked-response detection (C7)
//! - [`selectors`] - selector-driven HTML extraction and candidate registry (C8, C9)
//! - [`oracle`] - external LLM extraction-oracle client (C10)
//! - [`fetchers`] - plain, impersonating, and browser fetch engines (C11)
//! - [`engine`] - per-tier runners sharing one `RunnerDeps` bundle (C12)
//! - [`dispatcher`] - priority dispatcher and worker loop (C13, C14)
//! - [`testing`] - in-memory repositories and mock collaborators

pub mod coordination;
pub mod detector;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod fetchers;
pub mod governance;
pub mod identity;
pub mod oracle;
pub mod plugins;
pub mod proxy;
pub mod security;
pub mod selectors;
pub mod testing;
pub mod types;

pub use coordination::{CoordinationStore, InMemoryCoordinationStore, RateLimitOutcome};
pub use dispatcher::{ArtifactRepository, Dispatcher, JobAttemptRepository, JobRepository, SchemaRepository, Worker};
pub use engine::{EngineOutcome, EngineSuccess, ExternalClient, ExternalFetchResult, PluginSelection, RunnerDeps};
pub use error::{
    ExternalError, ExtractError, FetchError, GovernanceError, OracleError, PipelineError, PluginError, SecurityError,
};
pub use governance::{BudgetGuard, CircuitBreaker, GovernanceGuard, RateLimiter};
pub use identity::{IdentityCipher, IdentityManager, IdentityRepository};
pub use oracle::{OracleClient, OracleOutcome, OracleTransport, SchemaDescription};
pub use plugins::{Plugin, PluginChain, PluginRegistry};
pub use proxy::{ProxyPolicyRepository, ProxyResolver};
pub use security::{ensure_url_allowed, DnsResolver, SecretString, SystemDnsResolver};
pub use selectors::{extract, CandidateRegistry, CandidateRepository, ExtractionOutcome, SelectorHint};
pub use types::{
    artifact::{Artifact, ArtifactType, BlobStore},
    config::PipelineConfig,
    identity::{Cookie, Fingerprint, Identity},
    job::{AttemptStatus, Engine, Job, JobAttempt, JobState, Priority},
    proxy::{ProxyMode, ProxyPolicy},
    schema::{DataType, Schema, Selector, SelectorCandidate},
};
