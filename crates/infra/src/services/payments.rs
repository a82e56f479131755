//! Payment ledger: applying money to invoices and the date-based overdue
//! recomputation batch.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::info;

use casabill_billing::{Invoice, InvoiceId, Payment, PaymentId, PaymentMethod};
use casabill_core::{DomainResult, EntityId, Money};
use casabill_events::{AuditAction, AuditEvent, EventBus};
use casabill_tenancy::CompanyContext;

use crate::guard::TenancyGuard;
use crate::store::{LedgerStore, Visibility};

use super::publish_audit;

/// Summary of one overdue recomputation run.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct OverdueRecomputeResult {
    pub examined: u32,
    pub marked_overdue: u32,
}

pub struct PaymentService<S, B> {
    store: Arc<S>,
    bus: B,
}

impl<S, B> PaymentService<S, B>
where
    S: LedgerStore,
    B: EventBus<AuditEvent>,
{
    pub fn new(store: Arc<S>, bus: B) -> Self {
        Self { store, bus }
    }

    /// Apply a payment to an invoice.
    ///
    /// The store runs the balance check and both writes under the invoice
    /// row lock, so concurrent payments serialize: partial payments are
    /// fine, excess is rejected with `Overpayment` — never silently capped —
    /// and `amount_paid == total_amount` flips the status to paid. The
    /// payment row itself is immutable once written.
    #[allow(clippy::too_many_arguments)]
    pub fn apply_payment(
        &self,
        ctx: &CompanyContext,
        invoice_id: InvoiceId,
        amount: Money,
        paid_at: DateTime<Utc>,
        method: PaymentMethod,
        reference: Option<String>,
    ) -> DomainResult<(Payment, Invoice)> {
        TenancyGuard::active_company(self.store.as_ref(), ctx)?;

        // Tenancy is checked on the loaded row before the write is
        // attempted; the store re-checks under its lock.
        let invoice = self
            .store
            .get_invoice(ctx.company_id(), invoice_id, Visibility::Live)
            .map_err(|e| e.into_domain())?;
        TenancyGuard::check(ctx, &invoice)?;
        let paid_before = invoice.amount_paid();

        let now = Utc::now();
        let payment = Payment::new(
            PaymentId::new(EntityId::new()),
            ctx.company_id(),
            invoice_id,
            amount,
            paid_at,
            method,
            reference,
            now,
        )?;

        let updated = self
            .store
            .apply_payment(payment.clone(), now)
            .map_err(|e| e.into_domain())?;

        publish_audit(
            &self.bus,
            AuditEvent::new(
                ctx.company_id(),
                ctx.actor_id(),
                "payment",
                payment.id_typed(),
                AuditAction::PaymentApplied,
                now,
            )
            .with_before(json!({"amount_paid": paid_before}))
            .with_after(json!({
                "amount_paid": updated.amount_paid(),
                "status": updated.status(),
            })),
        );
        info!(
            invoice = %invoice_id,
            amount = %amount,
            status = ?updated.status(),
            "payment applied"
        );
        Ok((payment, updated))
    }

    /// Batch status derivation: every sent invoice past `as_of` with an open
    /// balance becomes overdue. Pure derivation over the status field, safe
    /// to re-run any number of times.
    pub fn recompute_overdue(
        &self,
        ctx: &CompanyContext,
        as_of: NaiveDate,
    ) -> DomainResult<OverdueRecomputeResult> {
        TenancyGuard::active_company(self.store.as_ref(), ctx)?;

        let invoices = self
            .store
            .list_invoices(ctx.company_id())
            .map_err(|e| e.into_domain())?;

        let mut result = OverdueRecomputeResult {
            examined: 0,
            marked_overdue: 0,
        };
        let now = Utc::now();
        for mut invoice in invoices {
            result.examined += 1;
            if invoice.mark_overdue_if_due(as_of, now) {
                self.store
                    .update_invoice(&invoice)
                    .map_err(|e| e.into_domain())?;
                result.marked_overdue += 1;
                publish_audit(
                    &self.bus,
                    AuditEvent::new(
                        ctx.company_id(),
                        ctx.actor_id(),
                        "invoice",
                        invoice.id_typed(),
                        AuditAction::MarkedOverdue,
                        now,
                    ),
                );
            }
        }

        info!(
            company = %ctx.company_id(),
            examined = result.examined,
            marked_overdue = result.marked_overdue,
            "overdue recomputation finished"
        );
        Ok(result)
    }

    /// Read-only payment history for an invoice.
    pub fn list_for_invoice(
        &self,
        ctx: &CompanyContext,
        invoice_id: InvoiceId,
    ) -> DomainResult<Vec<Payment>> {
        let invoice = self
            .store
            .get_invoice(ctx.company_id(), invoice_id, Visibility::Live)
            .map_err(|e| e.into_domain())?;
        TenancyGuard::check(ctx, &invoice)?;
        self.store
            .list_payments(ctx.company_id(), invoice_id)
            .map_err(|e| e.into_domain())
    }
}
