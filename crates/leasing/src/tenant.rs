use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use casabill_core::{CompanyId, DomainError, DomainResult, Entity, EntityId, SoftDelete, Tenanted};

/// Resident tenant identifier. Not to be confused with the company — the
/// company is the SaaS tenancy root; this is the person on the lease.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub EntityId);

impl TenantId {
    pub fn new(id: EntityId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for TenantId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<TenantId> for Uuid {
    fn from(value: TenantId) -> Self {
        value.0.into()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    Active,
    Inactive,
}

/// Contact identity for a resident.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// A resident who can hold occupancies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    id: TenantId,
    company_id: CompanyId,
    full_name: String,
    contact: ContactInfo,
    status: TenantStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl Tenant {
    pub fn new(
        id: TenantId,
        company_id: CompanyId,
        full_name: impl Into<String>,
        contact: ContactInfo,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let full_name = full_name.into();
        if full_name.trim().is_empty() {
            return Err(DomainError::validation("full_name must not be empty"));
        }
        Ok(Self {
            id,
            company_id,
            full_name,
            contact,
            status: TenantStatus::Active,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }

    pub fn id_typed(&self) -> TenantId {
        self.id
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn contact(&self) -> &ContactInfo {
        &self.contact
    }

    pub fn status(&self) -> TenantStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == TenantStatus::Active
    }

    pub fn deactivate(&mut self, now: DateTime<Utc>) {
        self.status = TenantStatus::Inactive;
        self.updated_at = now;
    }

    pub fn reactivate(&mut self, now: DateTime<Utc>) {
        self.status = TenantStatus::Active;
        self.updated_at = now;
    }

    pub fn update_contact(&mut self, contact: ContactInfo, now: DateTime<Utc>) {
        self.contact = contact;
        self.updated_at = now;
    }
}

impl Entity for Tenant {
    type Id = TenantId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Tenanted for Tenant {
    fn company_id(&self) -> CompanyId {
        self.company_id
    }
}

impl SoftDelete for Tenant {
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
    fn new_tenant_is_active() {
        let tenant = Tenant::new(
            TenantId::new(EntityId::new()),
            CompanyId::new(),
            "Mona Hassan",
            ContactInfo {
                email: Some("mona@example.com".to_string()),
                phone: None,
            },
            Utc::now(),
        )
        .unwrap();
        assert!(tenant.is_active());
    }

    #[test]
    fn blank_name_is_rejected() {
        let result = Tenant::new(
            TenantId::new(EntityId::new()),
            CompanyId::new(),
            "",
            ContactInfo::default(),
            Utc::now(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn deactivate_and_reactivate() {
        let mut tenant = Tenant::new(
            TenantId::new(EntityId::new()),
            CompanyId::new(),
            "Mona Hassan",
            ContactInfo::default(),
            Utc::now(),
        )
        .unwrap();

        tenant.deactivate(Utc::now());
        assert_eq!(tenant.status(), TenantStatus::Inactive);
        tenant.reactivate(Utc::now());
        assert!(tenant.is_active());
    }
}
