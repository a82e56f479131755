//! `casabill-billing` — billing periods, the invoice state machine, and
//! immutable payment records.

pub mod invoice;
pub mod payment;
pub mod period;

pub use invoice::{
    format_invoice_number, Invoice, InvoiceId, InvoiceStatus, LineItem, LineItemKind,
};
pub use payment::{Payment, PaymentId, PaymentMethod};
pub use period::BillingPeriod;
