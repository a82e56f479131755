use casabill_core::CompanyId;

use crate::audit::AuditEvent;

/// Helper trait for company-scoped messages.
///
/// Marks types carrying an owning company ID, so infrastructure consumers
/// (audit writers, reminder schedulers) can be pinned to one company and
/// reject foreign messages as defense in depth.
pub trait CompanyScoped {
    fn company_id(&self) -> CompanyId;
}

impl CompanyScoped for AuditEvent {
    fn company_id(&self) -> CompanyId {
        self.company_id()
    }
}
