//! `casabill-leasing` — apartments, resident tenants, and the occupancy
//! (lease) state machine.

pub mod apartment;
pub mod occupancy;
pub mod tenant;

pub use apartment::{Apartment, ApartmentId, ApartmentStatus, CompoundId};
pub use occupancy::{Occupancy, OccupancyId, OccupancyStatus};
pub use tenant::{ContactInfo, Tenant, TenantId, TenantStatus};
