//! Occupancy lifecycle service: lease creation, activation, move-out, and
//! the apartment/tenant registry around it.

use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use serde_json::json;
use tracing::info;

use casabill_core::{DomainError, DomainResult, EntityId, Money, SoftDelete};
use casabill_events::{AuditAction, AuditEvent, EventBus};
use casabill_leasing::{
    Apartment, ApartmentId, CompoundId, ContactInfo, Occupancy, OccupancyId, Tenant, TenantId,
};
use casabill_tenancy::CompanyContext;

use crate::guard::TenancyGuard;
use crate::store::{LedgerStore, Visibility};

use super::publish_audit;

/// Arguments for creating a lease.
#[derive(Debug, Clone)]
pub struct NewOccupancy {
    pub apartment_id: ApartmentId,
    pub tenant_id: TenantId,
    pub lease_start: NaiveDate,
    pub lease_end: NaiveDate,
    pub monthly_rent: Money,
    pub security_deposit: Option<Money>,
}

pub struct OccupancyService<S, B> {
    store: Arc<S>,
    bus: B,
}

impl<S, B> OccupancyService<S, B>
where
    S: LedgerStore,
    B: EventBus<AuditEvent>,
{
    pub fn new(store: Arc<S>, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn register_apartment(
        &self,
        ctx: &CompanyContext,
        compound_id: CompoundId,
        unit_no: &str,
    ) -> DomainResult<Apartment> {
        TenancyGuard::active_company(self.store.as_ref(), ctx)?;
        let now = Utc::now();
        let apartment = Apartment::new(
            ApartmentId::new(EntityId::new()),
            ctx.company_id(),
            compound_id,
            unit_no,
            now,
        )?;
        self.store
            .insert_apartment(apartment.clone())
            .map_err(|e| e.into_domain())?;
        publish_audit(
            &self.bus,
            AuditEvent::new(
                ctx.company_id(),
                ctx.actor_id(),
                "apartment",
                apartment.id_typed(),
                AuditAction::Created,
                now,
            ),
        );
        Ok(apartment)
    }

    pub fn register_tenant(
        &self,
        ctx: &CompanyContext,
        full_name: &str,
        contact: ContactInfo,
    ) -> DomainResult<Tenant> {
        TenancyGuard::active_company(self.store.as_ref(), ctx)?;
        let now = Utc::now();
        let tenant = Tenant::new(
            TenantId::new(EntityId::new()),
            ctx.company_id(),
            full_name,
            contact,
            now,
        )?;
        self.store
            .insert_tenant(tenant.clone())
            .map_err(|e| e.into_domain())?;
        publish_audit(
            &self.bus,
            AuditEvent::new(
                ctx.company_id(),
                ctx.actor_id(),
                "tenant",
                tenant.id_typed(),
                AuditAction::Created,
                now,
            ),
        );
        Ok(tenant)
    }

    /// Create a pending lease. Both referenced entities must belong to the
    /// context's company; the apartment status is untouched until
    /// activation — creation alone does not imply occupancy.
    pub fn create(&self, ctx: &CompanyContext, new: NewOccupancy) -> DomainResult<Occupancy> {
        TenancyGuard::active_company(self.store.as_ref(), ctx)?;

        let apartment = self
            .store
            .get_apartment(ctx.company_id(), new.apartment_id, Visibility::Live)
            .map_err(|e| e.into_domain())?;
        TenancyGuard::check(ctx, &apartment)?;

        let tenant = self
            .store
            .get_tenant(ctx.company_id(), new.tenant_id, Visibility::Live)
            .map_err(|e| e.into_domain())?;
        TenancyGuard::check(ctx, &tenant)?;

        let now = Utc::now();
        let occupancy = Occupancy::new(
            OccupancyId::new(EntityId::new()),
            ctx.company_id(),
            new.apartment_id,
            new.tenant_id,
            new.lease_start,
            new.lease_end,
            new.monthly_rent,
            new.security_deposit,
            now,
        )?;
        self.store
            .insert_occupancy(occupancy.clone())
            .map_err(|e| e.into_domain())?;
        publish_audit(
            &self.bus,
            AuditEvent::new(
                ctx.company_id(),
                ctx.actor_id(),
                "occupancy",
                occupancy.id_typed(),
                AuditAction::Created,
                now,
            ),
        );
        Ok(occupancy)
    }

    /// `Pending -> Active`; the apartment flips to occupied. The
    /// one-active-per-apartment constraint is enforced by the store at
    /// commit, which closes the race between two concurrent activations:
    /// exactly one wins, the loser gets `ApartmentNotAvailable`.
    pub fn activate(
        &self,
        ctx: &CompanyContext,
        id: OccupancyId,
        move_in: NaiveDate,
    ) -> DomainResult<Occupancy> {
        TenancyGuard::active_company(self.store.as_ref(), ctx)?;

        let mut occupancy = self
            .store
            .get_occupancy(ctx.company_id(), id, Visibility::Live)
            .map_err(|e| e.into_domain())?;
        TenancyGuard::check(ctx, &occupancy)?;

        // Pre-check for a clear error before the transition is attempted;
        // the store constraint remains the authority under concurrency.
        if let Some(existing) = self
            .store
            .active_occupancy_for_apartment(ctx.company_id(), occupancy.apartment_id())
            .map_err(|e| e.into_domain())?
        {
            if existing != id {
                return Err(DomainError::apartment_not_available(format!(
                    "apartment {} already has active occupancy {existing}",
                    occupancy.apartment_id()
                )));
            }
        }

        let mut apartment = self
            .store
            .get_apartment(ctx.company_id(), occupancy.apartment_id(), Visibility::Live)
            .map_err(|e| e.into_domain())?;

        let now = Utc::now();
        let before = json!({"status": occupancy.status()});
        occupancy.activate(move_in, now)?;
        apartment.mark_occupied(now);

        self.store
            .commit_activation(&occupancy, &apartment)
            .map_err(|e| e.into_domain())?;

        publish_audit(
            &self.bus,
            AuditEvent::new(
                ctx.company_id(),
                ctx.actor_id(),
                "occupancy",
                occupancy.id_typed(),
                AuditAction::Activated,
                now,
            )
            .with_before(before)
            .with_after(json!({"status": occupancy.status(), "move_in": move_in})),
        );
        info!(occupancy = %occupancy.id_typed(), apartment = %apartment.id_typed(), "occupancy activated");
        Ok(occupancy)
    }

    /// `Active -> Ended`; the apartment returns to available unless a
    /// different active occupancy exists for it — verified against the
    /// store rather than assumed from the at-most-one-active invariant.
    pub fn end(
        &self,
        ctx: &CompanyContext,
        id: OccupancyId,
        move_out: NaiveDate,
    ) -> DomainResult<Occupancy> {
        TenancyGuard::active_company(self.store.as_ref(), ctx)?;

        let mut occupancy = self
            .store
            .get_occupancy(ctx.company_id(), id, Visibility::Live)
            .map_err(|e| e.into_domain())?;
        TenancyGuard::check(ctx, &occupancy)?;

        let mut apartment = self
            .store
            .get_apartment(ctx.company_id(), occupancy.apartment_id(), Visibility::Live)
            .map_err(|e| e.into_domain())?;

        let now = Utc::now();
        let before = json!({"status": occupancy.status()});
        occupancy.end(move_out, now)?;

        let other_active = self
            .store
            .active_occupancy_for_apartment(ctx.company_id(), occupancy.apartment_id())
            .map_err(|e| e.into_domain())?
            .filter(|other| *other != id);
        if other_active.is_none() {
            apartment.mark_available(now);
        }

        self.store
            .commit_end(&occupancy, &apartment)
            .map_err(|e| e.into_domain())?;

        publish_audit(
            &self.bus,
            AuditEvent::new(
                ctx.company_id(),
                ctx.actor_id(),
                "occupancy",
                occupancy.id_typed(),
                AuditAction::Ended,
                now,
            )
            .with_before(before)
            .with_after(json!({"status": occupancy.status(), "move_out": move_out})),
        );
        Ok(occupancy)
    }

    /// `Pending -> Cancelled`.
    pub fn cancel(&self, ctx: &CompanyContext, id: OccupancyId) -> DomainResult<Occupancy> {
        TenancyGuard::active_company(self.store.as_ref(), ctx)?;

        let mut occupancy = self
            .store
            .get_occupancy(ctx.company_id(), id, Visibility::Live)
            .map_err(|e| e.into_domain())?;
        TenancyGuard::check(ctx, &occupancy)?;

        let now = Utc::now();
        occupancy.cancel(now)?;
        self.store
            .update_occupancy(&occupancy)
            .map_err(|e| e.into_domain())?;

        publish_audit(
            &self.bus,
            AuditEvent::new(
                ctx.company_id(),
                ctx.actor_id(),
                "occupancy",
                occupancy.id_typed(),
                AuditAction::Cancelled,
                now,
            ),
        );
        Ok(occupancy)
    }

    /// Active occupancies whose lease ends within `[as_of, as_of + days]`.
    /// A finite snapshot for the reminder collaborator, sorted by lease end;
    /// re-invoke to restart.
    pub fn list_active_expiring(
        &self,
        ctx: &CompanyContext,
        as_of: NaiveDate,
        within_days: u32,
    ) -> DomainResult<Vec<Occupancy>> {
        let horizon = as_of + Duration::days(i64::from(within_days));
        let mut expiring: Vec<Occupancy> = self
            .store
            .list_occupancies(ctx.company_id())
            .map_err(|e| e.into_domain())?
            .into_iter()
            .filter(|o| o.is_active() && o.lease_end() >= as_of && o.lease_end() <= horizon)
            .collect();
        expiring.sort_by_key(|o| o.lease_end());
        Ok(expiring)
    }

    /// Soft-delete an apartment. Refused while occupied — the business
    /// invariant is checked before the flag is ever set.
    pub fn delete_apartment(&self, ctx: &CompanyContext, id: ApartmentId) -> DomainResult<()> {
        TenancyGuard::active_company(self.store.as_ref(), ctx)?;

        let mut apartment = self
            .store
            .get_apartment(ctx.company_id(), id, Visibility::Live)
            .map_err(|e| e.into_domain())?;
        TenancyGuard::check(ctx, &apartment)?;

        if !apartment.can_delete() {
            return Err(DomainError::validation(
                "occupied apartment cannot be deleted",
            ));
        }

        let now = Utc::now();
        apartment.mark_deleted(now);
        self.store
            .update_apartment(&apartment)
            .map_err(|e| e.into_domain())?;
        publish_audit(
            &self.bus,
            AuditEvent::new(
                ctx.company_id(),
                ctx.actor_id(),
                "apartment",
                id,
                AuditAction::Deleted,
                now,
            ),
        );
        Ok(())
    }

    pub fn restore_apartment(&self, ctx: &CompanyContext, id: ApartmentId) -> DomainResult<Apartment> {
        TenancyGuard::active_company(self.store.as_ref(), ctx)?;

        let mut apartment = self
            .store
            .get_apartment(ctx.company_id(), id, Visibility::IncludeDeleted)
            .map_err(|e| e.into_domain())?;
        TenancyGuard::check(ctx, &apartment)?;

        apartment.restore();
        self.store
            .update_apartment(&apartment)
            .map_err(|e| e.into_domain())?;
        publish_audit(
            &self.bus,
            AuditEvent::new(
                ctx.company_id(),
                ctx.actor_id(),
                "apartment",
                id,
                AuditAction::Restored,
                Utc::now(),
            ),
        );
        Ok(apartment)
    }

    pub fn delete_tenant(&self, ctx: &CompanyContext, id: TenantId) -> DomainResult<()> {
        TenancyGuard::active_company(self.store.as_ref(), ctx)?;

        let mut tenant = self
            .store
            .get_tenant(ctx.company_id(), id, Visibility::Live)
            .map_err(|e| e.into_domain())?;
        TenancyGuard::check(ctx, &tenant)?;

        let now = Utc::now();
        tenant.mark_deleted(now);
        self.store
            .update_tenant(&tenant)
            .map_err(|e| e.into_domain())?;
        publish_audit(
            &self.bus,
            AuditEvent::new(
                ctx.company_id(),
                ctx.actor_id(),
                "tenant",
                id,
                AuditAction::Deleted,
                now,
            ),
        );
        Ok(())
    }

    /// Soft-delete a lease with its owned invoices (cascading soft-delete
    /// scope). Blocked while active, and blocked entirely if any owned
    /// invoice carries payments — the payment trail must survive.
    pub fn delete_occupancy(&self, ctx: &CompanyContext, id: OccupancyId) -> DomainResult<()> {
        TenancyGuard::active_company(self.store.as_ref(), ctx)?;

        let mut occupancy = self
            .store
            .get_occupancy(ctx.company_id(), id, Visibility::Live)
            .map_err(|e| e.into_domain())?;
        TenancyGuard::check(ctx, &occupancy)?;

        if occupancy.is_active() {
            return Err(DomainError::validation(
                "active occupancy cannot be deleted",
            ));
        }

        let owned: Vec<_> = self
            .store
            .list_invoices(ctx.company_id())
            .map_err(|e| e.into_domain())?
            .into_iter()
            .filter(|i| i.occupancy_id() == id)
            .collect();
        if owned.iter().any(|i| i.has_payments()) {
            return Err(DomainError::InvoiceHasPayments);
        }

        let now = Utc::now();
        for mut invoice in owned {
            invoice.mark_deleted(now);
            self.store
                .update_invoice(&invoice)
                .map_err(|e| e.into_domain())?;
        }
        occupancy.mark_deleted(now);
        self.store
            .update_occupancy(&occupancy)
            .map_err(|e| e.into_domain())?;

        publish_audit(
            &self.bus,
            AuditEvent::new(
                ctx.company_id(),
                ctx.actor_id(),
                "occupancy",
                id,
                AuditAction::Deleted,
                now,
            ),
        );
        Ok(())
    }
}
