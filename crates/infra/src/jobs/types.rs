//! Typed billing jobs.
//!
//! The queue carries a closed set of variants, each with its own validated
//! payload, dispatched by exhaustive match — no string-keyed switch and no
//! silent unknown-type fallback.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use casabill_billing::BillingPeriod;
use casabill_core::{ActorId, CompanyId};
use casabill_leasing::OccupancyId;

/// Unique job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The closed set of billing jobs the queue can carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingJob {
    /// Generate rent invoices for every eligible occupancy of the company.
    GenerateMonthly {
        company_id: CompanyId,
        actor_id: ActorId,
        period: BillingPeriod,
        due_day: u32,
        skip_existing: bool,
    },
    /// Generate the rent invoice for one occupancy.
    GenerateSingle {
        company_id: CompanyId,
        actor_id: ActorId,
        occupancy_id: OccupancyId,
        period: BillingPeriod,
        due_day: u32,
    },
}

impl BillingJob {
    pub fn company_id(&self) -> CompanyId {
        match self {
            BillingJob::GenerateMonthly { company_id, .. } => *company_id,
            BillingJob::GenerateSingle { company_id, .. } => *company_id,
        }
    }

    pub fn job_type(&self) -> &'static str {
        match self {
            BillingJob::GenerateMonthly { .. } => "billing.generate_monthly",
            BillingJob::GenerateSingle { .. } => "billing.generate_single",
        }
    }
}

/// Job execution status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed { error: String },
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed { .. })
    }
}

/// A queued job with its lifecycle bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedJob {
    pub id: JobId,
    pub job: BillingJob,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QueuedJob {
    pub fn new(job: BillingJob) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            job,
            status: JobStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn mark_running(&mut self) {
        self.status = JobStatus::Running;
        self.updated_at = Utc::now();
    }

    pub fn mark_completed(&mut self) {
        self.status = JobStatus::Completed;
        self.updated_at = Utc::now();
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = JobStatus::Failed {
            error: error.into(),
        };
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use casabill_core::EntityId;

    #[test]
    fn job_type_names_are_stable() {
        let monthly = BillingJob::GenerateMonthly {
            company_id: CompanyId::new(),
            actor_id: ActorId::new(),
            period: "2024-01".parse().unwrap(),
            due_day: 5,
            skip_existing: true,
        };
        assert_eq!(monthly.job_type(), "billing.generate_monthly");

        let single = BillingJob::GenerateSingle {
            company_id: CompanyId::new(),
            actor_id: ActorId::new(),
            occupancy_id: OccupancyId::new(EntityId::new()),
            period: "2024-01".parse().unwrap(),
            due_day: 5,
        };
        assert_eq!(single.job_type(), "billing.generate_single");
    }

    #[test]
    fn lifecycle_bookkeeping() {
        let mut queued = QueuedJob::new(BillingJob::GenerateMonthly {
            company_id: CompanyId::new(),
            actor_id: ActorId::new(),
            period: "2024-01".parse().unwrap(),
            due_day: 5,
            skip_existing: true,
        });
        assert_eq!(queued.status, JobStatus::Pending);
        assert!(!queued.status.is_terminal());

        queued.mark_running();
        assert_eq!(queued.status, JobStatus::Running);

        queued.mark_failed("duplicate period");
        assert!(queued.status.is_terminal());
    }
}
