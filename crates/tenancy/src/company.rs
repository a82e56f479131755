//! Company: the tenancy root that owns every other entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use casabill_core::{CompanyId, DomainResult, Entity, SoftDelete, Tenanted};

use crate::currency::{Currency, CurrencyPolicy};

/// Company entity. `is_active` gates all write operations on its children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    id: CompanyId,
    name: String,
    currency: Currency,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl Company {
    /// Register a company. The currency code is validated against the closed
    /// domain before anything is stored.
    pub fn register(
        id: CompanyId,
        name: impl Into<String>,
        currency_code: &str,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let currency = CurrencyPolicy::parse(currency_code)?;
        Ok(Self {
            id,
            name: name.into(),
            currency,
            is_active: true,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }

    pub fn id_typed(&self) -> CompanyId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Suspend all child writes.
    pub fn deactivate(&mut self, now: DateTime<Utc>) {
        self.is_active = false;
        self.updated_at = now;
    }

    pub fn reactivate(&mut self, now: DateTime<Utc>) {
        self.is_active = true;
        self.updated_at = now;
    }
}

impl Entity for Company {
    type Id = CompanyId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Tenanted for Company {
    fn company_id(&self) -> CompanyId {
        self.id
    }
}

impl SoftDelete for Company {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_validates_currency() {
        let now = Utc::now();
        let company = Company::register(CompanyId::new(), "Nile Estates", "EGP", now).unwrap();
        assert_eq!(company.currency(), Currency::Egp);
        assert!(company.is_active());

        assert!(Company::register(CompanyId::new(), "Bad Co", "XXX", now).is_err());
    }

    #[test]
    fn deactivate_flips_write_gate() {
        let now = Utc::now();
        let mut company = Company::register(CompanyId::new(), "Nile Estates", "USD", now).unwrap();
        company.deactivate(now);
        assert!(!company.is_active());
        company.reactivate(now);
        assert!(company.is_active());
    }
}
