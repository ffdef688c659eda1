//! Postgres-backed service around `scrape-core`: durable repositories for
//! jobs, schemas, identities, and proxy policy, the priority dispatcher and
//! per-engine worker loops as background tasks, and a minimal submit/status/
//! results HTTP surface (spec §6.1).

pub mod config;
pub mod kernel;
pub mod routes;

pub use config::Settings;
