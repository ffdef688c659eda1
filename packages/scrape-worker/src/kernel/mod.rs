//! Postgres-backed infrastructure: one module per `scrape-core` trait this
//! service implements against durable storage, plus the coordination store
//! (C1) backing every atomic script the pipeline depends on.

pub mod blob_store;
pub mod coordination;
pub mod oracle_transport;
pub mod repositories;

pub use blob_store::FilesystemBlobStore;
pub use coordination::PostgresCoordinationStore;
pub use oracle_transport::{HttpOracleTransport, UnavailableOracleTransport};
pub use repositories::{
    PostgresArtifactRepository, PostgresCandidateRepository, PostgresIdentityRepository, PostgresJobAttemptRepository,
    PostgresJobRepository, PostgresProxyPolicyRepository, PostgresSchemaRepository,
};
