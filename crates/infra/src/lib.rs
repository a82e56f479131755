//! Infrastructure layer: stores, tenancy guard, services, background jobs.

pub mod guard;
pub mod jobs;
pub mod services;
pub mod store;

#[cfg(test)]
mod integration_tests;

pub use guard::TenancyGuard;
pub use services::{InvoiceService, OccupancyService, PaymentService};
pub use store::{LedgerStore, MemoryStore, PostgresStore, StoreError, Visibility};
