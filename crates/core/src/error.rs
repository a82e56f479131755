//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic business failures (tenancy breaches,
/// invalid transitions, money/date validation). Infrastructure concerns
/// belong in the store layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// An entity addressed by ID belongs to a different company than the
    /// caller's context. Always fatal; never recovered locally.
    #[error("cross-tenant access denied: {0}")]
    CrossTenantAccess(String),

    /// A lifecycle operation was attempted from a state that does not allow it.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// A date range or date ordering constraint was violated.
    #[error("invalid date range: {0}")]
    InvalidDateRange(String),

    /// A line item failed validation (non-positive quantity/price/amount,
    /// or an amount that disagrees with quantity x unit price).
    #[error("invalid line item: {0}")]
    InvalidLineItem(String),

    /// The apartment already has an active occupancy.
    #[error("apartment not available: {0}")]
    ApartmentNotAvailable(String),

    /// A payment would push `amount_paid` above `total_amount`.
    #[error("overpayment rejected: {0}")]
    Overpayment(String),

    /// The invoice is cancelled and accepts no further payments.
    #[error("invoice is cancelled")]
    InvoiceCancelled,

    /// The invoice has recorded payments and cannot be cancelled or deleted.
    #[error("invoice has payments")]
    InvoiceHasPayments,

    /// The currency code is not in the supported set.
    #[error("unsupported currency: {0}")]
    UnsupportedCurrency(String),

    /// An invoice already exists for this occupancy and billing period.
    #[error("duplicate invoice period: {0}")]
    DuplicateInvoicePeriod(String),

    /// The owning company is inactive; all child writes are gated.
    #[error("company is inactive")]
    CompanyInactive,

    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested entity was not found (or is soft-deleted).
    #[error("not found")]
    NotFound,

    /// Storage-layer failure (lock poisoning, connection loss). Not a
    /// business outcome; callers generally retry or surface as 5xx upstream.
    #[error("storage failure: {0}")]
    Storage(String),
}

impl DomainError {
    pub fn cross_tenant(msg: impl Into<String>) -> Self {
        Self::CrossTenantAccess(msg.into())
    }

    pub fn invalid_transition(msg: impl Into<String>) -> Self {
        Self::InvalidTransition(msg.into())
    }

    pub fn invalid_date_range(msg: impl Into<String>) -> Self {
        Self::InvalidDateRange(msg.into())
    }

    pub fn invalid_line_item(msg: impl Into<String>) -> Self {
        Self::InvalidLineItem(msg.into())
    }

    pub fn apartment_not_available(msg: impl Into<String>) -> Self {
        Self::ApartmentNotAvailable(msg.into())
    }

    pub fn overpayment(msg: impl Into<String>) -> Self {
        Self::Overpayment(msg.into())
    }

    pub fn unsupported_currency(code: impl Into<String>) -> Self {
        Self::UnsupportedCurrency(code.into())
    }

    pub fn duplicate_period(msg: impl Into<String>) -> Self {
        Self::DuplicateInvoicePeriod(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    /// Stable kind name, used when batch results record per-item errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CrossTenantAccess(_) => "CrossTenantAccess",
            Self::InvalidTransition(_) => "InvalidTransition",
            Self::InvalidDateRange(_) => "InvalidDateRange",
            Self::InvalidLineItem(_) => "InvalidLineItem",
            Self::ApartmentNotAvailable(_) => "ApartmentNotAvailable",
            Self::Overpayment(_) => "Overpayment",
            Self::InvoiceCancelled => "InvoiceCancelled",
            Self::InvoiceHasPayments => "InvoiceHasPayments",
            Self::UnsupportedCurrency(_) => "UnsupportedCurrency",
            Self::DuplicateInvoicePeriod(_) => "DuplicateInvoicePeriod",
            Self::CompanyInactive => "CompanyInactive",
            Self::Validation(_) => "Validation",
            Self::InvalidId(_) => "InvalidId",
            Self::NotFound => "NotFound",
            Self::Storage(_) => "Storage",
        }
    }
}
