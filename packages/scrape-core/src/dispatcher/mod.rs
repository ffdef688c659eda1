//! Priority Dispatcher (C13) and Worker Loop (C14): the two periodic tasks
//! that move a Job from `priority:<p>` through `engine:<name>` to a terminal
//! state (spec §4.13, §4.14).

pub mod dispatcher;
pub mod worker;

pub use dispatcher::Dispatcher;
pub use worker::Worker;

use async_trait::async_trait;
use uuid::Uuid;

use crate::types::artifact::{Artifact, ArtifactType};
use crate::types::config::EngineConfig;
use crate::types::job::{Engine, Job, JobAttempt};
use crate::types::schema::Schema;

#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn get(&self, id: Uuid) -> Option<Job>;
    async fn save(&self, job: &Job);
}

#[async_trait]
pub trait JobAttemptRepository: Send + Sync {
    async fn save(&self, attempt: &JobAttempt);
}

#[async_trait]
pub trait SchemaRepository: Send + Sync {
    async fn get_schema(&self, schema_id: Uuid) -> Option<Schema>;
    async fn get_selectors(&self, schema_id: Uuid) -> Vec<crate::types::schema::Selector>;
}

/// At most one artifact per `(job_id, type)`; `save` replaces any prior one
/// on retry (spec §9 artifacts).
#[async_trait]
pub trait ArtifactRepository: Send + Sync {
    async fn save(&self, artifact: &Artifact);
    async fn list_for_job(&self, job_id: Uuid) -> Vec<Artifact>;
    async fn find(&self, job_id: Uuid, r#type: ArtifactType) -> Option<Artifact>;
}

pub(crate) fn domain_of(url: &str) -> String {
    url::Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_string)).unwrap_or_default()
}

/// `render=true`/`browser=true` query hint (spec §3 supplement): additive to,
/// never a replacement for, an explicit `engine` set on submit.
pub(crate) fn url_engine_hint(url: &str) -> Option<Engine> {
    let parsed = url::Url::parse(url).ok()?;
    parsed
        .query_pairs()
        .any(|(k, v)| (k == "render" || k == "browser") && v == "true")
        .then_some(Engine::Browser)
}

/// Whether `engine` may run against `domain` under the current policy
/// (spec §4.13): `fast`/`browser` are always eligible; `stealth` requires
/// the domain on its allow-list; `external` requires its allow-list and a
/// configured API key.
pub(crate) fn is_allowed(engine: Engine, domain: &str, config: &EngineConfig) -> bool {
    match engine {
        Engine::Fast | Engine::Browser => true,
        Engine::Stealth => config.stealth_allow_list.contains(domain),
        Engine::External => config.external_allow_list.contains(domain) && config.external_api_key_present,
    }
}

/// `next_engine` (spec §4.14): first tier after `current` in `Engine::ORDER`,
/// no further than `router_max_depth`, that `is_allowed` for `domain`.
pub(crate) fn next_engine(current: Engine, domain: &str, config: &EngineConfig) -> Option<Engine> {
    Engine::ORDER
        .iter()
        .skip(current.index() + 1)
        .take_while(|e| e.index() <= config.router_max_depth)
        .find(|e| is_allowed(**e, domain, config))
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EngineConfig {
        EngineConfig { router_max_depth: 3, ..EngineConfig::default() }
    }

    #[test]
    fn next_engine_skips_disallowed_stealth() {
        let config = config();
        assert_eq!(next_engine(Engine::Fast, "shop.example", &config), Some(Engine::Browser));
    }

    #[test]
    fn next_engine_respects_max_depth() {
        let mut config = config();
        config.router_max_depth = 0;
        assert_eq!(next_engine(Engine::Fast, "shop.example", &config), None);
    }

    #[test]
    fn next_engine_none_past_external() {
        assert_eq!(next_engine(Engine::External, "shop.example", &config()), None);
    }

    #[test]
    fn url_engine_hint_recognizes_render_and_browser_params() {
        assert_eq!(url_engine_hint("https://shop.example/p?render=true"), Some(Engine::Browser));
        assert_eq!(url_engine_hint("https://shop.example/p?browser=true"), Some(Engine::Browser));
        assert_eq!(url_engine_hint("https://shop.example/p?render=false"), None);
        assert_eq!(url_engine_hint("https://shop.example/p"), None);
    }
}
