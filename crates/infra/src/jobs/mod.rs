//! Background billing jobs: typed payloads and the polling executor.

pub mod executor;
pub mod types;

pub use executor::{JobExecutor, JobExecutorConfig, JobExecutorHandle, JobQueue};
pub use types::{BillingJob, JobId, JobStatus, QueuedJob};
