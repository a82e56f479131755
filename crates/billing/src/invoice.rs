//! Invoice: line items, exact minor-unit arithmetic, and the
//! `Draft -> Sent -> Paid/Overdue/Cancelled` lifecycle.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use casabill_core::{
    CompanyId, DomainError, DomainResult, Entity, EntityId, Money, SoftDelete, Tenanted,
};
use casabill_leasing::OccupancyId;

use crate::period::BillingPeriod;

/// Invoice identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceId(pub EntityId);

impl InvoiceId {
    pub fn new(id: EntityId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<InvoiceId> for Uuid {
    fn from(value: InvoiceId) -> Self {
        value.0.into()
    }
}

/// Invoice status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Paid,
    Overdue,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineItemKind {
    Rent,
    Utility,
    Maintenance,
    Other,
}

/// One invoice line. `amount` is always `quantity x unit_price`, exact in
/// minor units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    description: String,
    kind: LineItemKind,
    quantity: u32,
    unit_price: Money,
    amount: Money,
}

impl LineItem {
    /// Build a line, computing the amount.
    pub fn new(
        description: impl Into<String>,
        kind: LineItemKind,
        quantity: u32,
        unit_price: Money,
    ) -> DomainResult<Self> {
        if quantity == 0 {
            return Err(DomainError::invalid_line_item(
                "quantity must be positive",
            ));
        }
        if !unit_price.is_positive() {
            return Err(DomainError::invalid_line_item(
                "unit_price must be positive",
            ));
        }
        let amount = unit_price
            .checked_mul_quantity(quantity)
            .ok_or_else(|| DomainError::invalid_line_item("line amount overflow"))?;
        Ok(Self {
            description: description.into(),
            kind,
            quantity,
            unit_price,
            amount,
        })
    }

    /// Build a line from caller-supplied parts, verifying the stated amount
    /// against `quantity x unit_price`. Comparison is exact in minor units.
    pub fn from_parts(
        description: impl Into<String>,
        kind: LineItemKind,
        quantity: u32,
        unit_price: Money,
        amount: Money,
    ) -> DomainResult<Self> {
        let line = Self::new(description, kind, quantity, unit_price)?;
        if line.amount != amount {
            return Err(DomainError::invalid_line_item(format!(
                "stated amount {amount} disagrees with {quantity} x {unit_price} = {}",
                line.amount
            )));
        }
        Ok(line)
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn kind(&self) -> LineItemKind {
        self.kind
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn unit_price(&self) -> Money {
        self.unit_price
    }

    pub fn amount(&self) -> Money {
        self.amount
    }
}

/// Company-unique invoice number: `INV-<year>-<sequence>`.
pub fn format_invoice_number(year: i32, sequence: u64) -> String {
    format!("INV-{year}-{sequence:06}")
}

/// An invoice owned by exactly one occupancy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    id: InvoiceId,
    company_id: CompanyId,
    occupancy_id: OccupancyId,
    invoice_number: String,
    invoice_date: NaiveDate,
    due_date: NaiveDate,
    /// Set when generated by the bulk engine; uniqueness per
    /// `(occupancy, period)` is enforced by the store.
    billing_period: Option<BillingPeriod>,
    lines: Vec<LineItem>,
    subtotal: Money,
    tax_amount: Money,
    total_amount: Money,
    amount_paid: Money,
    status: InvoiceStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl Invoice {
    /// Create a draft. All money checks happen here, before anything is
    /// written: non-empty lines, non-negative tax, and an overall positive
    /// total.
    #[allow(clippy::too_many_arguments)]
    pub fn draft(
        id: InvoiceId,
        company_id: CompanyId,
        occupancy_id: OccupancyId,
        invoice_number: String,
        invoice_date: NaiveDate,
        due_date: NaiveDate,
        billing_period: Option<BillingPeriod>,
        lines: Vec<LineItem>,
        tax_amount: Money,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if due_date < invoice_date {
            return Err(DomainError::invalid_date_range(format!(
                "due_date {due_date} precedes invoice_date {invoice_date}"
            )));
        }
        if lines.is_empty() {
            return Err(DomainError::invalid_line_item(
                "invoice requires at least one line",
            ));
        }
        if tax_amount.is_negative() {
            return Err(DomainError::invalid_line_item(
                "tax_amount must not be negative",
            ));
        }
        let subtotal = Money::checked_sum(lines.iter().map(LineItem::amount))
            .ok_or_else(|| DomainError::invalid_line_item("subtotal overflow"))?;
        let total_amount = subtotal
            .checked_add(tax_amount)
            .ok_or_else(|| DomainError::invalid_line_item("total overflow"))?;
        if !total_amount.is_positive() {
            return Err(DomainError::invalid_line_item(
                "total_amount must be positive",
            ));
        }
        Ok(Self {
            id,
            company_id,
            occupancy_id,
            invoice_number,
            invoice_date,
            due_date,
            billing_period,
            lines,
            subtotal,
            tax_amount,
            total_amount,
            amount_paid: Money::ZERO,
            status: InvoiceStatus::Draft,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }

    pub fn id_typed(&self) -> InvoiceId {
        self.id
    }

    pub fn occupancy_id(&self) -> OccupancyId {
        self.occupancy_id
    }

    pub fn invoice_number(&self) -> &str {
        &self.invoice_number
    }

    pub fn invoice_date(&self) -> NaiveDate {
        self.invoice_date
    }

    pub fn due_date(&self) -> NaiveDate {
        self.due_date
    }

    pub fn billing_period(&self) -> Option<BillingPeriod> {
        self.billing_period
    }

    pub fn lines(&self) -> &[LineItem] {
        &self.lines
    }

    pub fn subtotal(&self) -> Money {
        self.subtotal
    }

    pub fn tax_amount(&self) -> Money {
        self.tax_amount
    }

    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    pub fn amount_paid(&self) -> Money {
        self.amount_paid
    }

    pub fn status(&self) -> InvoiceStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn outstanding(&self) -> Money {
        self.total_amount
            .checked_sub(self.amount_paid)
            .unwrap_or(Money::ZERO)
    }

    pub fn has_payments(&self) -> bool {
        self.amount_paid.is_positive()
    }

    /// Invariant: cancelled invoices accept no payments.
    pub fn can_accept_payment(&self) -> bool {
        self.status != InvoiceStatus::Cancelled && self.outstanding().is_positive()
    }

    /// `Draft -> Sent`. Idempotent when already sent: returns the current
    /// status without erroring. Paid, overdue, and cancelled invoices cannot
    /// be (re-)sent.
    pub fn send(&mut self, now: DateTime<Utc>) -> DomainResult<InvoiceStatus> {
        match self.status {
            InvoiceStatus::Draft => {
                self.status = InvoiceStatus::Sent;
                self.updated_at = now;
                Ok(self.status)
            }
            InvoiceStatus::Sent => Ok(self.status),
            other => Err(DomainError::invalid_transition(format!(
                "cannot send invoice in state {other:?}"
            ))),
        }
    }

    /// Cancellation is not permitted once money has moved; callers must
    /// issue a correction instead (out of scope here). Idempotent when
    /// already cancelled.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if self.has_payments() {
            return Err(DomainError::InvoiceHasPayments);
        }
        if self.status == InvoiceStatus::Cancelled {
            return Ok(());
        }
        self.status = InvoiceStatus::Cancelled;
        self.updated_at = now;
        Ok(())
    }

    /// Apply a payment amount. Overpayment is rejected, never capped:
    /// `amount_paid` stays `<= total_amount` and is monotonically
    /// non-decreasing.
    pub fn register_payment(&mut self, amount: Money, now: DateTime<Utc>) -> DomainResult<()> {
        if self.status == InvoiceStatus::Cancelled {
            return Err(DomainError::InvoiceCancelled);
        }
        if !amount.is_positive() {
            return Err(DomainError::validation("payment amount must be positive"));
        }
        let new_paid = self
            .amount_paid
            .checked_add(amount)
            .ok_or_else(|| DomainError::overpayment("payment total overflow"))?;
        if new_paid > self.total_amount {
            return Err(DomainError::overpayment(format!(
                "payment of {amount} would raise paid to {new_paid} above total {}",
                self.total_amount
            )));
        }
        self.amount_paid = new_paid;
        if self.amount_paid == self.total_amount {
            self.status = InvoiceStatus::Paid;
        }
        self.updated_at = now;
        Ok(())
    }

    /// Date-based status derivation: `Sent` and past due with an open
    /// balance becomes `Overdue`. Returns whether anything changed; safe to
    /// re-run.
    pub fn mark_overdue_if_due(&mut self, as_of: NaiveDate, now: DateTime<Utc>) -> bool {
        if self.status == InvoiceStatus::Sent
            && self.due_date < as_of
            && self.amount_paid < self.total_amount
        {
            self.status = InvoiceStatus::Overdue;
            self.updated_at = now;
            return true;
        }
        false
    }
}

impl Entity for Invoice {
    type Id = InvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Tenanted for Invoice {
    fn company_id(&self) -> CompanyId {
        self.company_id
    }
}

impl SoftDelete for Invoice {
    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    fn mark_deleted(&mut self, at: DateTime<Utc>) {
        self.deleted_at = Some(at);
        self.updated_at = at;
    }

    fn restore(&mut self) {
        self.deleted_at = None;
    }
}
