//! Polling job executor.
//!
//! One worker thread drains the queue and dispatches each job by exhaustive
//! match. Stopping the executor stops scheduling new jobs; the in-flight job
//! runs to completion or clean failure before the thread exits.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info};

use casabill_core::DomainResult;
use casabill_events::{AuditEvent, EventBus};
use casabill_tenancy::CompanyContext;

use crate::services::{BulkGenerationResult, InvoiceService, MonthlyGenerationRequest};
use crate::store::LedgerStore;

use super::types::{BillingJob, JobId, QueuedJob};

/// In-memory job queue. The queue transport is a collaborator; only the job
/// semantics live here.
#[derive(Debug, Default)]
pub struct JobQueue {
    pending: Mutex<VecDeque<QueuedJob>>,
    finished: Mutex<Vec<QueuedJob>>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, job: BillingJob) -> JobId {
        let queued = QueuedJob::new(job);
        let id = queued.id;
        if let Ok(mut pending) = self.pending.lock() {
            pending.push_back(queued);
        }
        id
    }

    fn pop(&self) -> Option<QueuedJob> {
        self.pending.lock().ok()?.pop_front()
    }

    fn record(&self, job: QueuedJob) {
        if let Ok(mut finished) = self.finished.lock() {
            finished.push(job);
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().map(|q| q.len()).unwrap_or(0)
    }

    /// Terminal jobs, in completion order.
    pub fn finished(&self) -> Vec<QueuedJob> {
        self.finished.lock().map(|f| f.clone()).unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct JobExecutorConfig {
    /// How often to poll for new jobs.
    pub poll_interval: Duration,
    /// Name for logging.
    pub name: String,
}

impl Default for JobExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
            name: "billing-executor".to_string(),
        }
    }
}

/// Handle to control a running executor thread.
pub struct JobExecutorHandle {
    shutdown: Arc<AtomicBool>,
    thread: thread::JoinHandle<()>,
}

impl JobExecutorHandle {
    /// Stop scheduling new jobs and wait for the in-flight one to finish.
    pub fn stop(self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let _ = self.thread.join();
    }
}

pub struct JobExecutor<S, B> {
    queue: Arc<JobQueue>,
    invoices: InvoiceService<S, B>,
    config: JobExecutorConfig,
}

impl<S, B> JobExecutor<S, B>
where
    S: LedgerStore + 'static,
    B: EventBus<AuditEvent> + 'static,
{
    pub fn new(queue: Arc<JobQueue>, invoices: InvoiceService<S, B>, config: JobExecutorConfig) -> Self {
        Self {
            queue,
            invoices,
            config,
        }
    }

    /// Drain everything currently queued, synchronously. Returns the number
    /// of jobs run.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Some(mut queued) = self.queue.pop() {
            queued.mark_running();
            debug!(job = %queued.id, job_type = queued.job.job_type(), "job started");

            match self.dispatch(&queued.job) {
                Ok(result) => {
                    if job_succeeded(&queued.job, &result) {
                        queued.mark_completed();
                    } else {
                        let reason = result
                            .errors
                            .first()
                            .map(|e| e.error.clone())
                            .unwrap_or_else(|| "generation produced no invoice".to_string());
                        queued.mark_failed(reason);
                    }
                }
                Err(e) => {
                    error!(job = %queued.id, error = %e, "job failed");
                    queued.mark_failed(e.to_string());
                }
            }
            self.queue.record(queued);
            ran += 1;
        }
        ran
    }

    fn dispatch(&self, job: &BillingJob) -> DomainResult<BulkGenerationResult> {
        match job {
            BillingJob::GenerateMonthly {
                company_id,
                actor_id,
                period,
                due_day,
                skip_existing,
            } => self.invoices.generate_monthly(
                &CompanyContext::new(*company_id, *actor_id),
                MonthlyGenerationRequest {
                    period: *period,
                    due_day: *due_day,
                    occupancy_ids: None,
                    skip_existing: *skip_existing,
                },
            ),
            BillingJob::GenerateSingle {
                company_id,
                actor_id,
                occupancy_id,
                period,
                due_day,
            } => self.invoices.generate_monthly(
                &CompanyContext::new(*company_id, *actor_id),
                MonthlyGenerationRequest {
                    period: *period,
                    due_day: *due_day,
                    occupancy_ids: Some(vec![*occupancy_id]),
                    skip_existing: false,
                },
            ),
        }
    }

    /// Run on a background thread until stopped.
    pub fn spawn(self) -> JobExecutorHandle
    where
        S: Send + Sync,
        B: Send + Sync,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = shutdown.clone();
        let name = self.config.name.clone();
        let poll_interval = self.config.poll_interval;

        let thread = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                info!(executor = %name, "job executor started");
                while !flag.load(Ordering::SeqCst) {
                    if self.run_pending() == 0 {
                        thread::sleep(poll_interval);
                    }
                }
                info!(executor = %name, "job executor stopped");
            })
            .expect("failed to spawn executor thread");

        JobExecutorHandle { shutdown, thread }
    }
}

/// A monthly batch is best-effort and completes as a job regardless of
/// per-item outcomes; a single-occupancy job succeeds only if its one
/// invoice was created.
fn job_succeeded(job: &BillingJob, result: &BulkGenerationResult) -> bool {
    match job {
        BillingJob::GenerateMonthly { .. } => true,
        BillingJob::GenerateSingle { .. } => result.created == 1,
    }
}
