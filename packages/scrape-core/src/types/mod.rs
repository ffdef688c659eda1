//! Domain-agnostic data types for the scraping pipeline (spec §3).

pub mod artifact;
pub mod config;
pub mod identity;
pub mod job;
pub mod plugin;
pub mod proxy;
pub mod schema;

pub use artifact::{Artifact, ArtifactType, BlobStore};
pub use config::PipelineConfig;
pub use identity::{Cookie, Fingerprint, Identity, IdentityBinding};
pub use job::{AttemptStatus, Engine, Job, JobAttempt, JobState, Priority};
pub use plugin::{ParseContext, RequestContext, ResponseContext, TenantPluginConfig};
pub use proxy::{ProxyDecision, ProxyMode, ProxyPolicy, ProxySource};
pub use schema::{DataType, Schema, Selector, SelectorCandidate, SelectorDialect};
