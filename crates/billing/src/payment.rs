//! Payment: an immutable record of money applied to one invoice.
//!
//! Payments are append-only. There is no update path and no delete path;
//! an invoice with payments refuses deletion so the trail survives.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use casabill_core::{CompanyId, DomainError, DomainResult, Entity, EntityId, Money, Tenanted};

use crate::invoice::InvoiceId;

/// Payment identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentId(pub EntityId);

impl PaymentId {
    pub fn new(id: EntityId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PaymentId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<PaymentId> for Uuid {
    fn from(value: PaymentId) -> Self {
        value.0.into()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentMethod {
    Cash,
    Bank,
    Mobile,
    Card,
    Other,
}

/// An immutable payment row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    id: PaymentId,
    company_id: CompanyId,
    invoice_id: InvoiceId,
    amount: Money,
    paid_at: DateTime<Utc>,
    method: PaymentMethod,
    reference: Option<String>,
    created_at: DateTime<Utc>,
}

impl Payment {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: PaymentId,
        company_id: CompanyId,
        invoice_id: InvoiceId,
        amount: Money,
        paid_at: DateTime<Utc>,
        method: PaymentMethod,
        reference: Option<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if !amount.is_positive() {
            return Err(DomainError::validation("payment amount must be positive"));
        }
        Ok(Self {
            id,
            company_id,
            invoice_id,
            amount,
            paid_at,
            method,
            reference,
            created_at: now,
        })
    }

    pub fn id_typed(&self) -> PaymentId {
        self.id
    }

    pub fn invoice_id(&self) -> InvoiceId {
        self.invoice_id
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn paid_at(&self) -> DateTime<Utc> {
        self.paid_at
    }

    pub fn method(&self) -> PaymentMethod {
        self.method
    }

    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Entity for Payment {
    type Id = PaymentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Tenanted for Payment {
    fn company_id(&self) -> CompanyId {
        self.company_id
    }
}
