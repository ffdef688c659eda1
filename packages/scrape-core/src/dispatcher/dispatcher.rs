//! Priority Dispatcher (C13, spec §4.13): pop one job id from the first
//! non-empty `priority:<p>` queue (strict priority, FIFO within), normalize
//! its engine assignment, and enqueue on `engine:<name>`.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::coordination::CoordinationStore;
use crate::types::config::EngineConfig;
use crate::types::job::{Engine, JobState, Priority};

use super::{domain_of, is_allowed, url_engine_hint, JobRepository};

pub struct Dispatcher {
    store: Arc<dyn CoordinationStore>,
    jobs: Arc<dyn JobRepository>,
    config: EngineConfig,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn CoordinationStore>, jobs: Arc<dyn JobRepository>, config: EngineConfig) -> Self {
        Self { store, jobs, config }
    }

    /// Runs one dispatch cycle. Returns `false` when every priority queue
    /// was empty, so the caller can back off before polling again.
    pub async fn dispatch_once(&self, now: DateTime<Utc>) -> bool {
        for priority in Priority::ALL {
            let queue = format!("priority:{}", priority.as_str());
            if let Some(job_id) = self.store.queue_pop(&queue).await {
                self.dispatch_job(job_id, now).await;
                return true;
            }
        }
        false
    }

    async fn dispatch_job(&self, job_id: uuid::Uuid, now: DateTime<Utc>) {
        let Some(mut job) = self.jobs.get(job_id).await else { return };
        let domain = domain_of(&job.url);
        let assigned = job.engine.or_else(|| url_engine_hint(&job.url)).unwrap_or(Engine::Fast);
        let engine = if is_allowed(assigned, &domain, &self.config) { assigned } else { Engine::Fast };

        job.engine = Some(engine);
        job.state = JobState::Queued;
        job.updated_at = now;
        self.jobs.save(&job).await;
        self.store.queue_push(&format!("engine:{}", engine.as_str()), job.id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::InMemoryCoordinationStore;
    use crate::types::job::Job;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use uuid::Uuid;

    struct StubJobRepo(Mutex<Vec<Job>>);

    #[async_trait]
    impl JobRepository for StubJobRepo {
        async fn get(&self, id: Uuid) -> Option<Job> {
            self.0.lock().unwrap().iter().find(|j| j.id == id).cloned()
        }
        async fn save(&self, job: &Job) {
            let mut guard = self.0.lock().unwrap();
            if let Some(existing) = guard.iter_mut().find(|j| j.id == job.id) {
                *existing = job.clone();
            } else {
                guard.push(job.clone());
            }
        }
    }

    #[tokio::test]
    async fn dispatch_downgrades_disallowed_stealth_to_fast() {
        let now = Utc::now();
        let mut job = Job::new("https://shop.example/p/1", now);
        job.engine = Some(Engine::Stealth);
        let job_id = job.id;
        let jobs: Arc<dyn JobRepository> = Arc::new(StubJobRepo(Mutex::new(vec![job])));
        let store: Arc<dyn CoordinationStore> = Arc::new(InMemoryCoordinationStore::new());
        store.queue_push("priority:standard", job_id).await;

        let dispatcher = Dispatcher::new(store.clone(), jobs.clone(), EngineConfig::default());
        assert!(dispatcher.dispatch_once(now).await);

        let dispatched = jobs.get(job_id).await.unwrap();
        assert_eq!(dispatched.engine, Some(Engine::Fast));
        assert_eq!(dispatched.state, JobState::Queued);
        assert_eq!(store.queue_pop("engine:fast").await, Some(job_id));
    }

    #[tokio::test]
    async fn render_query_hint_starts_at_browser_when_engine_unset() {
        let now = Utc::now();
        let job = Job::new("https://shop.example/p/1?render=true", now);
        let job_id = job.id;
        let jobs: Arc<dyn JobRepository> = Arc::new(StubJobRepo(Mutex::new(vec![job])));
        let store: Arc<dyn CoordinationStore> = Arc::new(InMemoryCoordinationStore::new());
        store.queue_push("priority:standard", job_id).await;

        let dispatcher = Dispatcher::new(store.clone(), jobs.clone(), EngineConfig::default());
        assert!(dispatcher.dispatch_once(now).await);

        let dispatched = jobs.get(job_id).await.unwrap();
        assert_eq!(dispatched.engine, Some(Engine::Browser));
        assert_eq!(store.queue_pop("engine:browser").await, Some(job_id));
    }

    #[tokio::test]
    async fn explicit_engine_overrides_render_query_hint() {
        let now = Utc::now();
        let mut job = Job::new("https://shop.example/p/1?render=true", now);
        job.engine = Some(Engine::Fast);
        let job_id = job.id;
        let jobs: Arc<dyn JobRepository> = Arc::new(StubJobRepo(Mutex::new(vec![job])));
        let store: Arc<dyn CoordinationStore> = Arc::new(InMemoryCoordinationStore::new());
        store.queue_push("priority:standard", job_id).await;

        let dispatcher = Dispatcher::new(store.clone(), jobs.clone(), EngineConfig::default());
        dispatcher.dispatch_once(now).await;

        let dispatched = jobs.get(job_id).await.unwrap();
        assert_eq!(dispatched.engine, Some(Engine::Fast));
    }

    #[tokio::test]
    async fn empty_queues_return_false() {
        let store: Arc<dyn CoordinationStore> = Arc::new(InMemoryCoordinationStore::new());
        let jobs: Arc<dyn JobRepository> = Arc::new(StubJobRepo(Mutex::new(vec![])));
        let dispatcher = Dispatcher::new(store, jobs, EngineConfig::default());
        assert!(!dispatcher.dispatch_once(Utc::now()).await);
    }

    #[tokio::test]
    async fn high_priority_drains_before_standard() {
        let now = Utc::now();
        let high = Job::new("https://a.example", now);
        let standard = Job::new("https://b.example", now);
        let (high_id, standard_id) = (high.id, standard.id);
        let jobs: Arc<dyn JobRepository> = Arc::new(StubJobRepo(Mutex::new(vec![high, standard])));
        let store: Arc<dyn CoordinationStore> = Arc::new(InMemoryCoordinationStore::new());
        store.queue_push("priority:standard", standard_id).await;
        store.queue_push("priority:high", high_id).await;

        let dispatcher = Dispatcher::new(store.clone(), jobs, EngineConfig::default());
        dispatcher.dispatch_once(now).await;
        assert_eq!(store.queue_pop("engine:fast").await, Some(high_id));
    }
}
