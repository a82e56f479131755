//! Entity traits: identity, tenancy ownership, soft deletion.

use chrono::{DateTime, Utc};

use crate::id::CompanyId;

/// Entity marker + minimal interface.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}

/// An entity owned by exactly one company. `company_id` is immutable after
/// creation; every store query is scoped by it.
pub trait Tenanted {
    fn company_id(&self) -> CompanyId;
}

/// Shared soft-delete contract.
///
/// Deletion sets a timestamp instead of removing the row; default read paths
/// filter deleted rows out. Business invariants (occupied apartment, invoice
/// with payments) are checked by the owning service *before* this flag is set.
pub trait SoftDelete {
    fn deleted_at(&self) -> Option<DateTime<Utc>>;

    fn mark_deleted(&mut self, at: DateTime<Utc>);

    /// Clears the deletion marker (reactivation).
    fn restore(&mut self);

    fn is_deleted(&self) -> bool {
        self.deleted_at().is_some()
    }
}
