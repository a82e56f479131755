//! Service layer: the operations the HTTP/controller collaborator calls.
//!
//! Each service takes an explicit [`CompanyContext`] plus typed arguments and
//! returns `Result<T, DomainError>`. Audit events are published strictly
//! after the store commit; a failed publish is logged and never unwinds the
//! committed mutation.

pub mod invoices;
pub mod occupancies;
pub mod payments;

use casabill_events::{AuditEvent, EventBus};
use tracing::warn;

pub use invoices::{BulkGenerationResult, GenerationError, InvoiceService, MonthlyGenerationRequest};
pub use occupancies::{NewOccupancy, OccupancyService};
pub use payments::{OverdueRecomputeResult, PaymentService};

/// Best-effort audit publication; the mutation is already committed.
pub(crate) fn publish_audit<B: EventBus<AuditEvent>>(bus: &B, event: AuditEvent) {
    if let Err(err) = bus.publish(event) {
        warn!(error = ?err, "audit event publish failed");
    }
}
