//! Minimal HTTP surface (spec §6.1): submit a job, poll its state, fetch
//! its results. Job execution itself happens on the dispatcher/worker
//! background tasks in `kernel`; these handlers only read and write the
//! `jobs` table and the `priority:*` queue.

pub mod health;
pub mod jobs;

pub use health::health_handler;
pub use jobs::{results_handler, status_handler, submit_handler, AppState};
