use casabill_core::{ActorId, CompanyId};

/// Tenancy context for an operation.
///
/// This is immutable and must be threaded explicitly into every core
/// operation — never ambient or global — so scoping is statically checkable
/// and testable without a request container.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CompanyContext {
    company_id: CompanyId,
    actor_id: ActorId,
}

impl CompanyContext {
    pub fn new(company_id: CompanyId, actor_id: ActorId) -> Self {
        Self {
            company_id,
            actor_id,
        }
    }

    pub fn company_id(&self) -> CompanyId {
        self.company_id
    }

    pub fn actor_id(&self) -> ActorId {
        self.actor_id
    }
}
