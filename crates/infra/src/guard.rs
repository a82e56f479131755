//! Tenancy guard: the pure access-control boundary.
//!
//! Re-applied at every entity boundary, not just the outermost request. The
//! store already refuses rows owned by another company; the guard adds the
//! defense-in-depth check on loaded entities and the company write gate.

use casabill_core::{DomainError, DomainResult, Tenanted};
use casabill_tenancy::{Company, CompanyContext};

use crate::store::LedgerStore;

pub struct TenancyGuard;

impl TenancyGuard {
    /// Verify a loaded entity belongs to the context's company. Never trust
    /// a client-supplied ID's implicit scope.
    pub fn check<E: Tenanted>(ctx: &CompanyContext, entity: &E) -> DomainResult<()> {
        if entity.company_id() != ctx.company_id() {
            return Err(DomainError::cross_tenant(format!(
                "entity owned by {} accessed from company {}",
                entity.company_id(),
                ctx.company_id()
            )));
        }
        Ok(())
    }

    /// Load the context's company and verify it accepts writes. Every
    /// mutating operation on child entities goes through this gate.
    pub fn active_company<S: LedgerStore>(
        store: &S,
        ctx: &CompanyContext,
    ) -> DomainResult<Company> {
        let company = store
            .get_company(ctx.company_id())
            .map_err(|e| e.into_domain())?;
        if !company.is_active() {
            return Err(DomainError::CompanyInactive);
        }
        Ok(company)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use casabill_core::{ActorId, CompanyId, EntityId};
    use casabill_leasing::{Apartment, ApartmentId, CompoundId};
    use chrono::Utc;

    #[test]
    fn foreign_entity_is_rejected() {
        let ctx = CompanyContext::new(CompanyId::new(), ActorId::new());
        let foreign = Apartment::new(
            ApartmentId::new(EntityId::new()),
            CompanyId::new(),
            CompoundId::new(EntityId::new()),
            "B-2",
            Utc::now(),
        )
        .unwrap();

        let err = TenancyGuard::check(&ctx, &foreign).unwrap_err();
        assert!(matches!(err, DomainError::CrossTenantAccess(_)));
    }

    #[test]
    fn inactive_company_gates_writes() {
        let store = MemoryStore::new();
        let mut company =
            Company::register(CompanyId::new(), "Nile Estates", "EGP", Utc::now()).unwrap();
        let ctx = CompanyContext::new(company.id_typed(), ActorId::new());

        company.deactivate(Utc::now());
        store.insert_company(company).unwrap();

        let err = TenancyGuard::active_company(&store, &ctx).unwrap_err();
        assert_eq!(err, DomainError::CompanyInactive);
    }
}
