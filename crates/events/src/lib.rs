//! `casabill-events` — audit event payloads and the pub/sub mechanics that
//! carry them to collaborators after commit.

pub mod audit;
pub mod bus;
pub mod in_memory_bus;
pub mod scoped;

pub use audit::{AuditAction, AuditEvent};
pub use bus::{EventBus, Subscription};
pub use in_memory_bus::InMemoryEventBus;
pub use scoped::CompanyScoped;
