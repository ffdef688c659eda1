//! Engine Runners (C12): one module per fetch tier, driven by the
//! dispatcher/worker through a common `RunnerDeps` bundle and returning a
//! tagged `EngineOutcome` instead of throwing (spec §4.12).

pub mod browser;
pub mod context;
pub mod external;
pub mod fast;
pub mod outcome;
pub mod runner;
pub mod runner_support;
pub mod stealth;

pub use context::{PluginSelection, RunnerDeps};
pub use external::{ExternalClient, ExternalFetchResult};
pub use outcome::{EngineOutcome, EngineSuccess};
