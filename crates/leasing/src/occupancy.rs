//! Occupancy: the lease state machine binding one apartment to one tenant.
//!
//! Transitions: `Pending -> {Active, Cancelled}`, `Active -> Ended`.
//! `Ended` and `Cancelled` are terminal; nothing re-enters `Pending`, and a
//! set `move_out` closes the lease dates for good.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use casabill_core::{
    CompanyId, DomainError, DomainResult, Entity, EntityId, Money, SoftDelete, Tenanted,
};

use crate::apartment::ApartmentId;
use crate::tenant::TenantId;

/// Occupancy identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OccupancyId(pub EntityId);

impl OccupancyId {
    pub fn new(id: EntityId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for OccupancyId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<OccupancyId> for Uuid {
    fn from(value: OccupancyId) -> Self {
        value.0.into()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OccupancyStatus {
    Pending,
    Active,
    Ended,
    Cancelled,
}

/// A lease binding one apartment to one tenant over `[lease_start, lease_end]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occupancy {
    id: OccupancyId,
    company_id: CompanyId,
    apartment_id: ApartmentId,
    tenant_id: TenantId,
    lease_start: NaiveDate,
    lease_end: NaiveDate,
    monthly_rent: Money,
    security_deposit: Option<Money>,
    deposit_paid: bool,
    move_in: Option<NaiveDate>,
    move_out: Option<NaiveDate>,
    status: OccupancyStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl Occupancy {
    /// Create a pending lease. Creation alone does not imply occupancy; the
    /// apartment status is untouched until activation.
    ///
    /// Rent positivity is deliberately not enforced here — invoice generation
    /// validates it per billing run, so a lease whose rent was corrupted
    /// after the fact fails at generation, not retroactively.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: OccupancyId,
        company_id: CompanyId,
        apartment_id: ApartmentId,
        tenant_id: TenantId,
        lease_start: NaiveDate,
        lease_end: NaiveDate,
        monthly_rent: Money,
        security_deposit: Option<Money>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if lease_end < lease_start {
            return Err(DomainError::invalid_date_range(format!(
                "lease_end {lease_end} precedes lease_start {lease_start}"
            )));
        }
        if monthly_rent.is_negative() {
            return Err(DomainError::validation("monthly_rent must not be negative"));
        }
        if let Some(deposit) = security_deposit {
            if deposit.is_negative() {
                return Err(DomainError::validation(
                    "security_deposit must not be negative",
                ));
            }
        }
        Ok(Self {
            id,
            company_id,
            apartment_id,
            tenant_id,
            lease_start,
            lease_end,
            monthly_rent,
            security_deposit,
            deposit_paid: false,
            move_in: None,
            move_out: None,
            status: OccupancyStatus::Pending,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }

    pub fn id_typed(&self) -> OccupancyId {
        self.id
    }

    pub fn apartment_id(&self) -> ApartmentId {
        self.apartment_id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn lease_start(&self) -> NaiveDate {
        self.lease_start
    }

    pub fn lease_end(&self) -> NaiveDate {
        self.lease_end
    }

    pub fn monthly_rent(&self) -> Money {
        self.monthly_rent
    }

    pub fn security_deposit(&self) -> Option<Money> {
        self.security_deposit
    }

    pub fn deposit_paid(&self) -> bool {
        self.deposit_paid
    }

    pub fn move_in(&self) -> Option<NaiveDate> {
        self.move_in
    }

    pub fn move_out(&self) -> Option<NaiveDate> {
        self.move_out
    }

    pub fn status(&self) -> OccupancyStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_active(&self) -> bool {
        self.status == OccupancyStatus::Active
    }

    /// Whether the lease dates overlap the `[from, to]` window.
    pub fn covers(&self, from: NaiveDate, to: NaiveDate) -> bool {
        self.lease_start <= to && self.lease_end >= from
    }

    pub fn record_deposit_paid(&mut self, now: DateTime<Utc>) {
        self.deposit_paid = true;
        self.updated_at = now;
    }

    /// `Pending -> Active`. The apartment flip and the one-active-per-
    /// apartment constraint are the store's side of this transition.
    pub fn activate(&mut self, move_in: NaiveDate, now: DateTime<Utc>) -> DomainResult<()> {
        if self.status != OccupancyStatus::Pending {
            return Err(DomainError::invalid_transition(format!(
                "cannot activate occupancy in state {:?}",
                self.status
            )));
        }
        self.status = OccupancyStatus::Active;
        self.move_in = Some(move_in);
        self.updated_at = now;
        Ok(())
    }

    /// `Active -> Ended`. Terminal: lease dates are frozen afterwards.
    pub fn end(&mut self, move_out: NaiveDate, now: DateTime<Utc>) -> DomainResult<()> {
        if self.status != OccupancyStatus::Active {
            return Err(DomainError::invalid_transition(format!(
                "cannot end occupancy in state {:?}",
                self.status
            )));
        }
        if move_out < self.lease_start {
            return Err(DomainError::invalid_date_range(format!(
                "move_out {move_out} precedes lease_start {}",
                self.lease_start
            )));
        }
        self.status = OccupancyStatus::Ended;
        self.move_out = Some(move_out);
        self.updated_at = now;
        Ok(())
    }

    /// `Pending -> Cancelled`. Terminal.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if self.status != OccupancyStatus::Pending {
            return Err(DomainError::invalid_transition(format!(
                "cannot cancel occupancy in state {:?}",
                self.status
            )));
        }
        self.status = OccupancyStatus::Cancelled;
        self.updated_at = now;
        Ok(())
    }
}

impl Entity for Occupancy {
    type Id = OccupancyId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Tenanted for Occupancy {
    fn company_id(&self) -> CompanyId {
        self.company_id
    }
}

impl SoftDelete for Occupancy {
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

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn test_occupancy() -> Occupancy {
        Occupancy::new(
            OccupancyId::new(EntityId::new()),
            CompanyId::new(),
            ApartmentId::new(EntityId::new()),
            TenantId::new(EntityId::new()),
            date(2024, 1, 1),
            date(2024, 12, 31),
            Money::from_minor(150_000),
            Some(Money::from_minor(300_000)),
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn new_occupancy_is_pending() {
        let occupancy = test_occupancy();
        assert_eq!(occupancy.status(), OccupancyStatus::Pending);
        assert!(occupancy.move_in().is_none());
        assert!(!occupancy.deposit_paid());
    }

    #[test]
    fn inverted_lease_dates_are_rejected() {
        let result = Occupancy::new(
            OccupancyId::new(EntityId::new()),
            CompanyId::new(),
            ApartmentId::new(EntityId::new()),
            TenantId::new(EntityId::new()),
            date(2024, 6, 1),
            date(2024, 5, 31),
            Money::from_minor(150_000),
            None,
            Utc::now(),
        );
        assert!(matches!(result, Err(DomainError::InvalidDateRange(_))));
    }

    #[test]
    fn same_day_lease_is_valid() {
        let result = Occupancy::new(
            OccupancyId::new(EntityId::new()),
            CompanyId::new(),
            ApartmentId::new(EntityId::new()),
            TenantId::new(EntityId::new()),
            date(2024, 6, 1),
            date(2024, 6, 1),
            Money::from_minor(150_000),
            None,
            Utc::now(),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn activate_only_from_pending() {
        let mut occupancy = test_occupancy();
        occupancy.activate(date(2024, 1, 5), Utc::now()).unwrap();
        assert_eq!(occupancy.status(), OccupancyStatus::Active);
        assert_eq!(occupancy.move_in(), Some(date(2024, 1, 5)));

        let err = occupancy.activate(date(2024, 1, 6), Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition(_)));
    }

    #[test]
    fn end_requires_active_and_valid_move_out() {
        let mut occupancy = test_occupancy();
        assert!(occupancy.end(date(2024, 6, 1), Utc::now()).is_err());

        occupancy.activate(date(2024, 1, 5), Utc::now()).unwrap();

        let err = occupancy.end(date(2023, 12, 1), Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::InvalidDateRange(_)));

        occupancy.end(date(2024, 6, 30), Utc::now()).unwrap();
        assert_eq!(occupancy.status(), OccupancyStatus::Ended);
        assert_eq!(occupancy.move_out(), Some(date(2024, 6, 30)));

        // Terminal: no further transitions.
        assert!(occupancy.end(date(2024, 7, 1), Utc::now()).is_err());
        assert!(occupancy.cancel(Utc::now()).is_err());
    }

    #[test]
    fn cancel_only_from_pending() {
        let mut occupancy = test_occupancy();
        occupancy.cancel(Utc::now()).unwrap();
        assert_eq!(occupancy.status(), OccupancyStatus::Cancelled);

        let mut active = test_occupancy();
        active.activate(date(2024, 1, 5), Utc::now()).unwrap();
        assert!(active.cancel(Utc::now()).is_err());
    }

    #[test]
    fn covers_checks_window_overlap() {
        let occupancy = test_occupancy();
        assert!(occupancy.covers(date(2024, 1, 1), date(2024, 1, 31)));
        assert!(occupancy.covers(date(2024, 12, 1), date(2024, 12, 31)));
        assert!(!occupancy.covers(date(2025, 1, 1), date(2025, 1, 31)));
        assert!(!occupancy.covers(date(2023, 11, 1), date(2023, 12, 31)));
    }
}
