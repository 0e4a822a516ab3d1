//! Infrastructure: error taxonomy, durable job store, scheduler.

pub mod backoff;
pub mod error;
pub mod scheduler;
pub mod sqlite;
pub mod store;
pub mod submit;

pub use backoff::Backoff;
pub use error::{ProverError, Result};
pub use scheduler::{
    spawn_scheduler, ProofResult, Scheduler, SchedulerConfig, SchedulerMessage, WorkerDispatch,
};
pub use sqlite::SqliteJobStore;
pub use store::ProofJobStore;
pub use submit::SubmitService;
