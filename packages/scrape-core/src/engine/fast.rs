//! `fast` tier (spec §4.12): plain HTTP fetch, no impersonation, full C2
//! rate limiting.

use crate::plugins::PluginChain;
use crate::types::job::Job;
use crate::types::schema::Selector;

use super::context::RunnerDeps;
use super::outcome::EngineOutcome;
use super::runner::run_http_tier;

pub async fn run(deps: &RunnerDeps, job: &Job, selectors: &[Selector], plugins: &PluginChain, now_ms: i64) -> EngineOutcome {
    run_http_tier(deps, job, selectors, plugins, deps.fast_fetcher.as_ref(), true, now_ms).await
}
