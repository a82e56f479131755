use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use casabill_core::{CompanyId, DomainError, DomainResult, Entity, EntityId, SoftDelete, Tenanted};

/// Apartment identifier (company-scoped via the entity's `company_id`).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApartmentId(pub EntityId);

impl ApartmentId {
    pub fn new(id: EntityId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ApartmentId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<ApartmentId> for Uuid {
    fn from(value: ApartmentId) -> Self {
        value.0.into()
    }
}

/// Identifier of the compound (owning building/group) an apartment sits in.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompoundId(pub EntityId);

impl CompoundId {
    pub fn new(id: EntityId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for CompoundId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Apartment status lifecycle.
///
/// `Occupied` is derived: it holds if and only if the apartment has a
/// currently-active occupancy. The occupancy service owns the flips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApartmentStatus {
    Available,
    Occupied,
    Maintenance,
    Reserved,
}

/// A leasable residential unit inside a compound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Apartment {
    id: ApartmentId,
    company_id: CompanyId,
    compound_id: CompoundId,
    /// Unit identifier, unique within the compound.
    unit_no: String,
    status: ApartmentStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl Apartment {
    pub fn new(
        id: ApartmentId,
        company_id: CompanyId,
        compound_id: CompoundId,
        unit_no: impl Into<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let unit_no = unit_no.into();
        if unit_no.trim().is_empty() {
            return Err(DomainError::validation("unit_no must not be empty"));
        }
        Ok(Self {
            id,
            company_id,
            compound_id,
            unit_no,
            status: ApartmentStatus::Available,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }

    pub fn id_typed(&self) -> ApartmentId {
        self.id
    }

    pub fn compound_id(&self) -> CompoundId {
        self.compound_id
    }

    pub fn unit_no(&self) -> &str {
        &self.unit_no
    }

    pub fn status(&self) -> ApartmentStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_occupied(&self) -> bool {
        self.status == ApartmentStatus::Occupied
    }

    /// An occupied apartment cannot be deleted.
    pub fn can_delete(&self) -> bool {
        !self.is_occupied()
    }

    /// Flip to occupied when an occupancy activates.
    pub fn mark_occupied(&mut self, now: DateTime<Utc>) {
        self.status = ApartmentStatus::Occupied;
        self.updated_at = now;
    }

    /// Flip back when the active occupancy ends.
    pub fn mark_available(&mut self, now: DateTime<Utc>) {
        self.status = ApartmentStatus::Available;
        self.updated_at = now;
    }

    pub fn set_maintenance(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if self.is_occupied() {
            return Err(DomainError::invalid_transition(
                "occupied apartment cannot enter maintenance",
            ));
        }
        self.status = ApartmentStatus::Maintenance;
        self.updated_at = now;
        Ok(())
    }

    pub fn set_reserved(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if self.is_occupied() {
            return Err(DomainError::invalid_transition(
                "occupied apartment cannot be reserved",
            ));
        }
        self.status = ApartmentStatus::Reserved;
        self.updated_at = now;
        Ok(())
    }
}

impl Entity for Apartment {
    type Id = ApartmentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Tenanted for Apartment {
    fn company_id(&self) -> CompanyId {
        self.company_id
    }
}

impl SoftDelete for Apartment {
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
