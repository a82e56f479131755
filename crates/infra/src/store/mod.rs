//! Storage contract for the consistency engine.
//!
//! The store is the authority for the engine's uniqueness guarantees:
//! check-then-insert at the application level is treated as a race, and the
//! constraints below are what actually hold under concurrency. Conflicts
//! surface as typed `StoreError::UniqueViolation` values which the services
//! reclassify (bulk generation turns a duplicate-period conflict into a
//! `skipped`/`failed` item instead of crashing).

pub mod memory;
pub mod postgres;

use chrono::{DateTime, Utc};
use thiserror::Error;

use casabill_billing::{BillingPeriod, Invoice, InvoiceId, Payment, PaymentId};
use casabill_core::{CompanyId, DomainError};
use casabill_leasing::{Apartment, ApartmentId, Occupancy, OccupancyId, Tenant, TenantId};
use casabill_tenancy::Company;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

pub type StoreResult<T> = Result<T, StoreError>;

/// The unique constraints the storage layer enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueConstraint {
    /// Partial unique: at most one occupancy per apartment may be active.
    ActiveOccupancyPerApartment,
    /// Unique `(company, occupancy, billing_period)` for generated invoices.
    InvoicePeriod,
    /// Unique `(company, invoice_number)`.
    InvoiceNumber,
    /// Unique `(company, compound, unit_no)`.
    UnitNoPerCompound,
}

impl core::fmt::Display for UniqueConstraint {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            UniqueConstraint::ActiveOccupancyPerApartment => "active occupancy per apartment",
            UniqueConstraint::InvoicePeriod => "invoice billing period",
            UniqueConstraint::InvoiceNumber => "invoice number",
            UniqueConstraint::UnitNoPerCompound => "unit_no per compound",
        };
        f.write_str(name)
    }
}

/// Store-level error.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,

    /// The row exists but belongs to a different company than requested.
    #[error("cross-tenant access: {0}")]
    CrossTenant(String),

    #[error("unique constraint violated: {0}")]
    UniqueViolation(UniqueConstraint),

    /// Domain rule rejected inside a store transaction (e.g. overpayment
    /// detected under the invoice row lock).
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("storage backend failure: {0}")]
    Backend(String),
}

impl StoreError {
    /// Map into the domain taxonomy at the service boundary.
    pub fn into_domain(self) -> DomainError {
        match self {
            StoreError::NotFound => DomainError::NotFound,
            StoreError::CrossTenant(msg) => DomainError::cross_tenant(msg),
            StoreError::UniqueViolation(UniqueConstraint::ActiveOccupancyPerApartment) => {
                DomainError::apartment_not_available(
                    "another active occupancy exists for this apartment",
                )
            }
            StoreError::UniqueViolation(UniqueConstraint::InvoicePeriod) => {
                DomainError::duplicate_period(
                    "an invoice already exists for this occupancy and period",
                )
            }
            StoreError::UniqueViolation(constraint) => {
                DomainError::validation(format!("unique constraint violated: {constraint}"))
            }
            StoreError::Domain(e) => e,
            StoreError::Backend(msg) => DomainError::Storage(msg),
        }
    }
}

/// Whether a read should see soft-deleted rows.
///
/// Every default read path filters `deleted_at IS NULL`; callers opt in to
/// deleted rows explicitly (restore paths, audits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Live,
    IncludeDeleted,
}

/// Relational-shaped store for the engine's entities.
///
/// Reads take the owning `CompanyId` and fail with `CrossTenant` when an
/// opaque ID resolves to a row owned by someone else — client-supplied IDs
/// are never trusted to imply scope. Writes that touch a uniqueness
/// constraint are atomic with the constraint check.
pub trait LedgerStore: Send + Sync {
    // Companies (the tenancy root is addressed by its own ID).
    fn insert_company(&self, company: Company) -> StoreResult<()>;
    fn get_company(&self, id: CompanyId) -> StoreResult<Company>;
    fn update_company(&self, company: &Company) -> StoreResult<()>;

    // Apartments
    fn insert_apartment(&self, apartment: Apartment) -> StoreResult<()>;
    fn get_apartment(
        &self,
        company: CompanyId,
        id: ApartmentId,
        vis: Visibility,
    ) -> StoreResult<Apartment>;
    fn update_apartment(&self, apartment: &Apartment) -> StoreResult<()>;
    fn list_apartments(&self, company: CompanyId) -> StoreResult<Vec<Apartment>>;

    // Tenants (residents)
    fn insert_tenant(&self, tenant: Tenant) -> StoreResult<()>;
    fn get_tenant(
        &self,
        company: CompanyId,
        id: TenantId,
        vis: Visibility,
    ) -> StoreResult<Tenant>;
    fn update_tenant(&self, tenant: &Tenant) -> StoreResult<()>;

    // Occupancies
    fn insert_occupancy(&self, occupancy: Occupancy) -> StoreResult<()>;
    fn get_occupancy(
        &self,
        company: CompanyId,
        id: OccupancyId,
        vis: Visibility,
    ) -> StoreResult<Occupancy>;
    fn update_occupancy(&self, occupancy: &Occupancy) -> StoreResult<()>;
    fn list_occupancies(&self, company: CompanyId) -> StoreResult<Vec<Occupancy>>;
    fn active_occupancy_for_apartment(
        &self,
        company: CompanyId,
        apartment: ApartmentId,
    ) -> StoreResult<Option<OccupancyId>>;

    /// Atomically persist an activation: the occupancy row, the apartment
    /// row, and the one-active-per-apartment constraint. Loses the race with
    /// `UniqueViolation(ActiveOccupancyPerApartment)`.
    fn commit_activation(&self, occupancy: &Occupancy, apartment: &Apartment) -> StoreResult<()>;

    /// Atomically persist an end-of-lease: occupancy + apartment rows, and
    /// release of the active-occupancy slot.
    fn commit_end(&self, occupancy: &Occupancy, apartment: &Apartment) -> StoreResult<()>;

    // Invoices
    /// Insert enforcing `(company, invoice_number)` and — when the invoice
    /// carries a billing period — `(company, occupancy, period)` uniqueness,
    /// atomically with the row write.
    fn insert_invoice(&self, invoice: Invoice) -> StoreResult<()>;
    fn get_invoice(
        &self,
        company: CompanyId,
        id: InvoiceId,
        vis: Visibility,
    ) -> StoreResult<Invoice>;
    fn update_invoice(&self, invoice: &Invoice) -> StoreResult<()>;
    fn list_invoices(&self, company: CompanyId) -> StoreResult<Vec<Invoice>>;
    fn find_invoice_for_period(
        &self,
        company: CompanyId,
        occupancy: OccupancyId,
        period: BillingPeriod,
    ) -> StoreResult<Option<InvoiceId>>;
    /// Next value of the per-company invoice number sequence.
    fn next_invoice_sequence(&self, company: CompanyId) -> StoreResult<u64>;

    // Payments
    /// Transactional read-modify-write: applies the payment to its invoice
    /// under the invoice row lock and persists both, so two concurrent
    /// payments can never both pass the overpayment check against a stale
    /// balance. Returns the updated invoice.
    fn apply_payment(&self, payment: Payment, now: DateTime<Utc>) -> StoreResult<Invoice>;
    fn get_payment(&self, company: CompanyId, id: PaymentId) -> StoreResult<Payment>;
    fn list_payments(&self, company: CompanyId, invoice: InvoiceId) -> StoreResult<Vec<Payment>>;
}
