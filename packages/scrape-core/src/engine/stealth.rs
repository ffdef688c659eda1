//! `stealth` tier (spec §4.12): impersonating fetch, restricted to domains
//! on the `stealth_allow_list`; falls back to `fast` otherwise.

use crate::plugins::PluginChain;
use crate::types::job::Job;
use crate::types::schema::Selector;

use super::context::RunnerDeps;
use super::fast;
use super::outcome::EngineOutcome;
use super::runner::run_http_tier;

pub async fn run(deps: &RunnerDeps, job: &Job, selectors: &[Selector], plugins: &PluginChain, now_ms: i64) -> EngineOutcome {
    let domain = url::Url::parse(&job.url).ok().and_then(|u| u.host_str().map(str::to_string)).unwrap_or_default();
    if !deps.config.engine.stealth_allow_list.contains(&domain) {
        return fast::run(deps, job, selectors, plugins, now_ms).await;
    }
    run_http_tier(deps, job, selectors, plugins, deps.stealth_fetcher.as_ref(), true, now_ms).await
}
