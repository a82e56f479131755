//! In-memory store.
//!
//! Intended for tests/dev and as the reference implementation of the
//! concurrency contract. Every uniqueness check happens under the same write
//! lock as the row mutation, which is what makes the constraint authoritative
//! rather than a check-then-insert race.
//!
//! Lock order where two tables are touched: occupancies before apartments,
//! invoices before payments.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use casabill_billing::{BillingPeriod, Invoice, InvoiceId, Payment, PaymentId};
use casabill_core::{CompanyId, SoftDelete, Tenanted};
use casabill_leasing::{Apartment, ApartmentId, CompoundId, Occupancy, OccupancyId, Tenant, TenantId};
use casabill_tenancy::Company;

use super::{LedgerStore, StoreError, StoreResult, UniqueConstraint, Visibility};

#[derive(Debug, Default)]
struct ApartmentTable {
    rows: HashMap<ApartmentId, Apartment>,
    /// Unique `(company, compound, unit_no)`. Entries are kept for
    /// soft-deleted rows so a restore cannot collide.
    units: HashSet<(CompanyId, CompoundId, String)>,
}

#[derive(Debug, Default)]
struct OccupancyTable {
    rows: HashMap<OccupancyId, Occupancy>,
    /// Partial unique index: the one active occupancy per apartment.
    active_by_apartment: HashMap<(CompanyId, ApartmentId), OccupancyId>,
}

impl OccupancyTable {
    /// Re-point the partial index for one row; fails on a conflicting active
    /// occupancy. Must be called with the row mutation, under the same lock.
    fn apply_active_index(&mut self, occupancy: &Occupancy) -> StoreResult<()> {
        let key = (occupancy.company_id(), occupancy.apartment_id());
        if occupancy.is_active() && occupancy.deleted_at().is_none() {
            match self.active_by_apartment.get(&key) {
                Some(existing) if *existing != occupancy.id_typed() => {
                    return Err(StoreError::UniqueViolation(
                        UniqueConstraint::ActiveOccupancyPerApartment,
                    ));
                }
                _ => {
                    self.active_by_apartment.insert(key, occupancy.id_typed());
                }
            }
        } else if self.active_by_apartment.get(&key) == Some(&occupancy.id_typed()) {
            self.active_by_apartment.remove(&key);
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct InvoiceTable {
    rows: HashMap<InvoiceId, Invoice>,
    numbers: HashSet<(CompanyId, String)>,
    by_period: HashMap<(CompanyId, OccupancyId, BillingPeriod), InvoiceId>,
    sequences: HashMap<CompanyId, u64>,
}

/// In-memory implementation of [`LedgerStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    companies: RwLock<HashMap<CompanyId, Company>>,
    apartments: RwLock<ApartmentTable>,
    tenants: RwLock<HashMap<TenantId, Tenant>>,
    occupancies: RwLock<OccupancyTable>,
    invoices: RwLock<InvoiceTable>,
    payments: RwLock<HashMap<PaymentId, Payment>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> StoreError {
    StoreError::Backend("lock poisoned".to_string())
}

/// Tenancy + soft-delete gate applied on every row read.
fn scope_row<E: Tenanted + SoftDelete + Clone>(
    row: Option<&E>,
    company: CompanyId,
    vis: Visibility,
    what: &str,
) -> StoreResult<E> {
    let row = row.ok_or(StoreError::NotFound)?;
    if row.company_id() != company {
        return Err(StoreError::CrossTenant(format!(
            "{what} belongs to a different company"
        )));
    }
    if vis == Visibility::Live && row.is_deleted() {
        return Err(StoreError::NotFound);
    }
    Ok(row.clone())
}

impl LedgerStore for MemoryStore {
    fn insert_company(&self, company: Company) -> StoreResult<()> {
        let mut map = self.companies.write().map_err(|_| poisoned())?;
        map.insert(company.id_typed(), company);
        Ok(())
    }

    fn get_company(&self, id: CompanyId) -> StoreResult<Company> {
        let map = self.companies.read().map_err(|_| poisoned())?;
        let company = map.get(&id).ok_or(StoreError::NotFound)?;
        if company.is_deleted() {
            return Err(StoreError::NotFound);
        }
        Ok(company.clone())
    }

    fn update_company(&self, company: &Company) -> StoreResult<()> {
        let mut map = self.companies.write().map_err(|_| poisoned())?;
        if !map.contains_key(&company.id_typed()) {
            return Err(StoreError::NotFound);
        }
        map.insert(company.id_typed(), company.clone());
        Ok(())
    }

    fn insert_apartment(&self, apartment: Apartment) -> StoreResult<()> {
        let mut table = self.apartments.write().map_err(|_| poisoned())?;
        let unit_key = (
            apartment.company_id(),
            apartment.compound_id(),
            apartment.unit_no().to_string(),
        );
        if table.units.contains(&unit_key) {
            return Err(StoreError::UniqueViolation(
                UniqueConstraint::UnitNoPerCompound,
            ));
        }
        table.units.insert(unit_key);
        table.rows.insert(apartment.id_typed(), apartment);
        Ok(())
    }

    fn get_apartment(
        &self,
        company: CompanyId,
        id: ApartmentId,
        vis: Visibility,
    ) -> StoreResult<Apartment> {
        let table = self.apartments.read().map_err(|_| poisoned())?;
        scope_row(table.rows.get(&id), company, vis, "apartment")
    }

    fn update_apartment(&self, apartment: &Apartment) -> StoreResult<()> {
        let mut table = self.apartments.write().map_err(|_| poisoned())?;
        if !table.rows.contains_key(&apartment.id_typed()) {
            return Err(StoreError::NotFound);
        }
        table.rows.insert(apartment.id_typed(), apartment.clone());
        Ok(())
    }

    fn list_apartments(&self, company: CompanyId) -> StoreResult<Vec<Apartment>> {
        let table = self.apartments.read().map_err(|_| poisoned())?;
        Ok(table
            .rows
            .values()
            .filter(|a| a.company_id() == company && !a.is_deleted())
            .cloned()
            .collect())
    }

    fn insert_tenant(&self, tenant: Tenant) -> StoreResult<()> {
        let mut map = self.tenants.write().map_err(|_| poisoned())?;
        map.insert(tenant.id_typed(), tenant);
        Ok(())
    }

    fn get_tenant(
        &self,
        company: CompanyId,
        id: TenantId,
        vis: Visibility,
    ) -> StoreResult<Tenant> {
        let map = self.tenants.read().map_err(|_| poisoned())?;
        scope_row(map.get(&id), company, vis, "tenant")
    }

    fn update_tenant(&self, tenant: &Tenant) -> StoreResult<()> {
        let mut map = self.tenants.write().map_err(|_| poisoned())?;
        if !map.contains_key(&tenant.id_typed()) {
            return Err(StoreError::NotFound);
        }
        map.insert(tenant.id_typed(), tenant.clone());
        Ok(())
    }

    fn insert_occupancy(&self, occupancy: Occupancy) -> StoreResult<()> {
        let mut table = self.occupancies.write().map_err(|_| poisoned())?;
        table.apply_active_index(&occupancy)?;
        table.rows.insert(occupancy.id_typed(), occupancy);
        Ok(())
    }

    fn get_occupancy(
        &self,
        company: CompanyId,
        id: OccupancyId,
        vis: Visibility,
    ) -> StoreResult<Occupancy> {
        let table = self.occupancies.read().map_err(|_| poisoned())?;
        scope_row(table.rows.get(&id), company, vis, "occupancy")
    }

    fn update_occupancy(&self, occupancy: &Occupancy) -> StoreResult<()> {
        let mut table = self.occupancies.write().map_err(|_| poisoned())?;
        if !table.rows.contains_key(&occupancy.id_typed()) {
            return Err(StoreError::NotFound);
        }
        table.apply_active_index(occupancy)?;
        table.rows.insert(occupancy.id_typed(), occupancy.clone());
        Ok(())
    }

    fn list_occupancies(&self, company: CompanyId) -> StoreResult<Vec<Occupancy>> {
        let table = self.occupancies.read().map_err(|_| poisoned())?;
        Ok(table
            .rows
            .values()
            .filter(|o| o.company_id() == company && !o.is_deleted())
            .cloned()
            .collect())
    }

    fn active_occupancy_for_apartment(
        &self,
        company: CompanyId,
        apartment: ApartmentId,
    ) -> StoreResult<Option<OccupancyId>> {
        let table = self.occupancies.read().map_err(|_| poisoned())?;
        Ok(table.active_by_apartment.get(&(company, apartment)).copied())
    }

    fn commit_activation(&self, occupancy: &Occupancy, apartment: &Apartment) -> StoreResult<()> {
        // Lock order: occupancies, then apartments.
        let mut occupancies = self.occupancies.write().map_err(|_| poisoned())?;
        let mut apartments = self.apartments.write().map_err(|_| poisoned())?;

        if !occupancies.rows.contains_key(&occupancy.id_typed()) {
            return Err(StoreError::NotFound);
        }
        // Constraint check before either row is written.
        occupancies.apply_active_index(occupancy)?;
        occupancies
            .rows
            .insert(occupancy.id_typed(), occupancy.clone());
        apartments
            .rows
            .insert(apartment.id_typed(), apartment.clone());
        Ok(())
    }

    fn commit_end(&self, occupancy: &Occupancy, apartment: &Apartment) -> StoreResult<()> {
        let mut occupancies = self.occupancies.write().map_err(|_| poisoned())?;
        let mut apartments = self.apartments.write().map_err(|_| poisoned())?;

        if !occupancies.rows.contains_key(&occupancy.id_typed()) {
            return Err(StoreError::NotFound);
        }
        occupancies.apply_active_index(occupancy)?;
        occupancies
            .rows
            .insert(occupancy.id_typed(), occupancy.clone());
        apartments
            .rows
            .insert(apartment.id_typed(), apartment.clone());
        Ok(())
    }

    fn insert_invoice(&self, invoice: Invoice) -> StoreResult<()> {
        let mut table = self.invoices.write().map_err(|_| poisoned())?;

        let number_key = (invoice.company_id(), invoice.invoice_number().to_string());
        if table.numbers.contains(&number_key) {
            return Err(StoreError::UniqueViolation(UniqueConstraint::InvoiceNumber));
        }
        if let Some(period) = invoice.billing_period() {
            let period_key = (invoice.company_id(), invoice.occupancy_id(), period);
            if table.by_period.contains_key(&period_key) {
                return Err(StoreError::UniqueViolation(UniqueConstraint::InvoicePeriod));
            }
            table.by_period.insert(period_key, invoice.id_typed());
        }
        table.numbers.insert(number_key);
        table.rows.insert(invoice.id_typed(), invoice);
        Ok(())
    }

    fn get_invoice(
        &self,
        company: CompanyId,
        id: InvoiceId,
        vis: Visibility,
    ) -> StoreResult<Invoice> {
        let table = self.invoices.read().map_err(|_| poisoned())?;
        scope_row(table.rows.get(&id), company, vis, "invoice")
    }

    fn update_invoice(&self, invoice: &Invoice) -> StoreResult<()> {
        let mut table = self.invoices.write().map_err(|_| poisoned())?;
        if !table.rows.contains_key(&invoice.id_typed()) {
            return Err(StoreError::NotFound);
        }
        table.rows.insert(invoice.id_typed(), invoice.clone());
        Ok(())
    }

    fn list_invoices(&self, company: CompanyId) -> StoreResult<Vec<Invoice>> {
        let table = self.invoices.read().map_err(|_| poisoned())?;
        Ok(table
            .rows
            .values()
            .filter(|i| i.company_id() == company && !i.is_deleted())
            .cloned()
            .collect())
    }

    fn find_invoice_for_period(
        &self,
        company: CompanyId,
        occupancy: OccupancyId,
        period: BillingPeriod,
    ) -> StoreResult<Option<InvoiceId>> {
        let table = self.invoices.read().map_err(|_| poisoned())?;
        Ok(table.by_period.get(&(company, occupancy, period)).copied())
    }

    fn next_invoice_sequence(&self, company: CompanyId) -> StoreResult<u64> {
        let mut table = self.invoices.write().map_err(|_| poisoned())?;
        let seq = table.sequences.entry(company).or_insert(0);
        *seq += 1;
        Ok(*seq)
    }

    fn apply_payment(&self, payment: Payment, now: DateTime<Utc>) -> StoreResult<Invoice> {
        // Lock order: invoices, then payments. Holding the invoices write
        // lock for the whole read-modify-write is the row lock that keeps
        // concurrent payments from racing past the overpayment check.
        let mut invoices = self.invoices.write().map_err(|_| poisoned())?;
        let mut payments = self.payments.write().map_err(|_| poisoned())?;

        let invoice = invoices
            .rows
            .get_mut(&payment.invoice_id())
            .ok_or(StoreError::NotFound)?;
        if invoice.company_id() != payment.company_id() {
            return Err(StoreError::CrossTenant(
                "invoice belongs to a different company".to_string(),
            ));
        }
        if invoice.is_deleted() {
            return Err(StoreError::NotFound);
        }

        invoice.register_payment(payment.amount(), now)?;
        payments.insert(payment.id_typed(), payment);
        Ok(invoice.clone())
    }

    fn get_payment(&self, company: CompanyId, id: PaymentId) -> StoreResult<Payment> {
        let map = self.payments.read().map_err(|_| poisoned())?;
        let payment = map.get(&id).ok_or(StoreError::NotFound)?;
        if payment.company_id() != company {
            return Err(StoreError::CrossTenant(
                "payment belongs to a different company".to_string(),
            ));
        }
        Ok(payment.clone())
    }

    fn list_payments(&self, company: CompanyId, invoice: InvoiceId) -> StoreResult<Vec<Payment>> {
        let map = self.payments.read().map_err(|_| poisoned())?;
        Ok(map
            .values()
            .filter(|p| p.company_id() == company && p.invoice_id() == invoice)
            .cloned()
            .collect())
    }
}
