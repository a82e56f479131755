//! Invoice engine: single drafts, dispatch/cancel transitions, and the bulk
//! monthly generation workflow.
//!
//! Bulk generation is a best-effort batch with structured partial-failure
//! reporting, never an all-or-nothing transaction: one occupancy's failure
//! must not abort the rest, and re-running with `skip_existing` is
//! idempotent at `(occupancy, period)` granularity. The store's unique index
//! is the authority for that idempotence; an insert that loses a concurrent
//! race is caught here and reclassified, not crashed on.

use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDate, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::info;

use casabill_billing::{
    format_invoice_number, BillingPeriod, Invoice, InvoiceId, InvoiceStatus, LineItem,
    LineItemKind,
};
use casabill_core::{DomainError, DomainResult, EntityId, Money, SoftDelete};
use casabill_events::{AuditAction, AuditEvent, EventBus};
use casabill_leasing::{Occupancy, OccupancyId};
use casabill_tenancy::CompanyContext;

use crate::guard::TenancyGuard;
use crate::store::{LedgerStore, StoreError, UniqueConstraint, Visibility};

use super::publish_audit;

/// Arguments for one bulk generation run.
#[derive(Debug, Clone)]
pub struct MonthlyGenerationRequest {
    pub period: BillingPeriod,
    /// Day of month payment is due; clamped to the month's length.
    pub due_day: u32,
    /// Explicit targets; when `None`, every active occupancy whose lease
    /// covers the period is enumerated.
    pub occupancy_ids: Option<Vec<OccupancyId>>,
    /// Record an existing `(occupancy, period)` invoice as `skipped` instead
    /// of `failed`.
    pub skip_existing: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationError {
    pub occupancy_id: OccupancyId,
    pub error: String,
}

/// The batch summary. Always returned in full, even when every item failed;
/// callers inspect `failed`/`errors` rather than receiving an exception.
#[derive(Debug, Clone, Serialize)]
pub struct BulkGenerationResult {
    pub period: BillingPeriod,
    pub processed: u32,
    pub created: u32,
    pub skipped: u32,
    pub failed: u32,
    pub created_invoice_ids: Vec<InvoiceId>,
    pub errors: Vec<GenerationError>,
    /// Sum of `total_amount` across created invoices.
    pub total_amount: Money,
}

impl BulkGenerationResult {
    fn new(period: BillingPeriod) -> Self {
        Self {
            period,
            processed: 0,
            created: 0,
            skipped: 0,
            failed: 0,
            created_invoice_ids: Vec::new(),
            errors: Vec::new(),
            total_amount: Money::ZERO,
        }
    }
}

enum Outcome {
    Created(Invoice),
    Skipped,
    Failed(DomainError),
}

pub struct InvoiceService<S, B> {
    store: Arc<S>,
    bus: B,
}

impl<S, B> InvoiceService<S, B>
where
    S: LedgerStore,
    B: EventBus<AuditEvent>,
{
    pub fn new(store: Arc<S>, bus: B) -> Self {
        Self { store, bus }
    }

    /// Create a draft invoice against an occupancy. All line and date
    /// validation happens before any write; the invoice number is allocated
    /// from the company's sequence.
    pub fn create_draft(
        &self,
        ctx: &CompanyContext,
        occupancy_id: OccupancyId,
        invoice_date: NaiveDate,
        due_date: NaiveDate,
        lines: Vec<LineItem>,
        tax_amount: Money,
    ) -> DomainResult<Invoice> {
        TenancyGuard::active_company(self.store.as_ref(), ctx)?;

        let occupancy = self
            .store
            .get_occupancy(ctx.company_id(), occupancy_id, Visibility::Live)
            .map_err(|e| e.into_domain())?;
        TenancyGuard::check(ctx, &occupancy)?;

        let sequence = self
            .store
            .next_invoice_sequence(ctx.company_id())
            .map_err(|e| e.into_domain())?;
        let now = Utc::now();
        let invoice = Invoice::draft(
            InvoiceId::new(EntityId::new()),
            ctx.company_id(),
            occupancy_id,
            format_invoice_number(invoice_date.year(), sequence),
            invoice_date,
            due_date,
            None,
            lines,
            tax_amount,
            now,
        )?;
        self.store
            .insert_invoice(invoice.clone())
            .map_err(|e| e.into_domain())?;

        publish_audit(
            &self.bus,
            AuditEvent::new(
                ctx.company_id(),
                ctx.actor_id(),
                "invoice",
                invoice.id_typed(),
                AuditAction::Created,
                now,
            )
            .with_after(json!({
                "invoice_number": invoice.invoice_number(),
                "total_amount": invoice.total_amount(),
            })),
        );
        Ok(invoice)
    }

    /// `Draft -> Sent`; idempotent when already sent.
    pub fn send(&self, ctx: &CompanyContext, id: InvoiceId) -> DomainResult<Invoice> {
        TenancyGuard::active_company(self.store.as_ref(), ctx)?;

        let mut invoice = self
            .store
            .get_invoice(ctx.company_id(), id, Visibility::Live)
            .map_err(|e| e.into_domain())?;
        TenancyGuard::check(ctx, &invoice)?;

        let was_draft = invoice.status() == InvoiceStatus::Draft;
        let now = Utc::now();
        invoice.send(now)?;
        if was_draft {
            self.store
                .update_invoice(&invoice)
                .map_err(|e| e.into_domain())?;
            publish_audit(
                &self.bus,
                AuditEvent::new(
                    ctx.company_id(),
                    ctx.actor_id(),
                    "invoice",
                    id,
                    AuditAction::Sent,
                    now,
                ),
            );
        }
        Ok(invoice)
    }

    /// Cancellation is refused once money has moved; the caller must issue a
    /// correction instead (a deliberately separate, unspecified workflow).
    pub fn cancel(&self, ctx: &CompanyContext, id: InvoiceId) -> DomainResult<Invoice> {
        TenancyGuard::active_company(self.store.as_ref(), ctx)?;

        let mut invoice = self
            .store
            .get_invoice(ctx.company_id(), id, Visibility::Live)
            .map_err(|e| e.into_domain())?;
        TenancyGuard::check(ctx, &invoice)?;

        let now = Utc::now();
        invoice.cancel(now)?;
        self.store
            .update_invoice(&invoice)
            .map_err(|e| e.into_domain())?;

        publish_audit(
            &self.bus,
            AuditEvent::new(
                ctx.company_id(),
                ctx.actor_id(),
                "invoice",
                id,
                AuditAction::Cancelled,
                now,
            ),
        );
        Ok(invoice)
    }

    /// Soft-delete. Refused while payments exist — the trail is carried, not
    /// destroyed.
    pub fn delete(&self, ctx: &CompanyContext, id: InvoiceId) -> DomainResult<()> {
        TenancyGuard::active_company(self.store.as_ref(), ctx)?;

        let mut invoice = self
            .store
            .get_invoice(ctx.company_id(), id, Visibility::Live)
            .map_err(|e| e.into_domain())?;
        TenancyGuard::check(ctx, &invoice)?;

        let payments = self
            .store
            .list_payments(ctx.company_id(), id)
            .map_err(|e| e.into_domain())?;
        if invoice.has_payments() || !payments.is_empty() {
            return Err(DomainError::InvoiceHasPayments);
        }

        let now = Utc::now();
        invoice.mark_deleted(now);
        self.store
            .update_invoice(&invoice)
            .map_err(|e| e.into_domain())?;

        publish_audit(
            &self.bus,
            AuditEvent::new(
                ctx.company_id(),
                ctx.actor_id(),
                "invoice",
                id,
                AuditAction::Deleted,
                now,
            ),
        );
        Ok(())
    }

    /// Bulk monthly generation. Per-occupancy atomic and independently
    /// failing; the summary always comes back, even under total failure.
    pub fn generate_monthly(
        &self,
        ctx: &CompanyContext,
        request: MonthlyGenerationRequest,
    ) -> DomainResult<BulkGenerationResult> {
        TenancyGuard::active_company(self.store.as_ref(), ctx)?;

        let mut result = BulkGenerationResult::new(request.period);

        match &request.occupancy_ids {
            Some(ids) => {
                for id in ids {
                    result.processed += 1;
                    match self
                        .store
                        .get_occupancy(ctx.company_id(), *id, Visibility::Live)
                    {
                        Ok(occupancy) => {
                            self.record_outcome(ctx, &occupancy, &request, &mut result)
                        }
                        // Cross-tenant addressing aborts the whole request;
                        // everything else stays a per-item failure.
                        Err(StoreError::CrossTenant(msg)) => {
                            return Err(DomainError::cross_tenant(msg));
                        }
                        Err(e) => {
                            result.failed += 1;
                            result.errors.push(GenerationError {
                                occupancy_id: *id,
                                error: e.into_domain().kind().to_string(),
                            });
                        }
                    }
                }
            }
            None => {
                let period = request.period;
                let targets: Vec<Occupancy> = self
                    .store
                    .list_occupancies(ctx.company_id())
                    .map_err(|e| e.into_domain())?
                    .into_iter()
                    .filter(|o| o.is_active() && o.covers(period.first_day(), period.last_day()))
                    .collect();
                for occupancy in targets {
                    result.processed += 1;
                    self.record_outcome(ctx, &occupancy, &request, &mut result);
                }
            }
        }

        info!(
            company = %ctx.company_id(),
            period = %result.period,
            processed = result.processed,
            created = result.created,
            skipped = result.skipped,
            failed = result.failed,
            total_amount = %result.total_amount,
            "monthly generation finished"
        );
        Ok(result)
    }

    fn record_outcome(
        &self,
        ctx: &CompanyContext,
        occupancy: &Occupancy,
        request: &MonthlyGenerationRequest,
        result: &mut BulkGenerationResult,
    ) {
        match self.generate_one(ctx, occupancy, request) {
            Outcome::Created(invoice) => {
                result.created += 1;
                result.total_amount = result.total_amount.saturating_add(invoice.total_amount());
                result.created_invoice_ids.push(invoice.id_typed());
            }
            Outcome::Skipped => result.skipped += 1,
            Outcome::Failed(error) => {
                result.failed += 1;
                result.errors.push(GenerationError {
                    occupancy_id: occupancy.id_typed(),
                    error: error.kind().to_string(),
                });
            }
        }
    }

    fn generate_one(
        &self,
        ctx: &CompanyContext,
        occupancy: &Occupancy,
        request: &MonthlyGenerationRequest,
    ) -> Outcome {
        let period = request.period;

        // Fast path: an invoice for this occupancy and period already
        // exists. The check is advisory; the unique index below decides
        // under concurrency.
        match self
            .store
            .find_invoice_for_period(ctx.company_id(), occupancy.id_typed(), period)
        {
            Ok(Some(_)) => {
                return if request.skip_existing {
                    Outcome::Skipped
                } else {
                    Outcome::Failed(DomainError::duplicate_period("duplicate period"))
                };
            }
            Ok(None) => {}
            Err(e) => return Outcome::Failed(e.into_domain()),
        }

        let rent_line = match LineItem::new(
            format!("Monthly rent {period}"),
            LineItemKind::Rent,
            1,
            occupancy.monthly_rent(),
        ) {
            Ok(line) => line,
            Err(e) => return Outcome::Failed(e),
        };

        let sequence = match self.store.next_invoice_sequence(ctx.company_id()) {
            Ok(seq) => seq,
            Err(e) => return Outcome::Failed(e.into_domain()),
        };

        let now = Utc::now();
        let invoice = match Invoice::draft(
            InvoiceId::new(EntityId::new()),
            ctx.company_id(),
            occupancy.id_typed(),
            format_invoice_number(period.year(), sequence),
            period.first_day(),
            period.due_date(request.due_day),
            Some(period),
            vec![rent_line],
            Money::ZERO,
            now,
        ) {
            Ok(invoice) => invoice,
            Err(e) => return Outcome::Failed(e),
        };

        match self.store.insert_invoice(invoice.clone()) {
            Ok(()) => {
                publish_audit(
                    &self.bus,
                    AuditEvent::new(
                        ctx.company_id(),
                        ctx.actor_id(),
                        "invoice",
                        invoice.id_typed(),
                        AuditAction::Created,
                        now,
                    )
                    .with_after(json!({
                        "invoice_number": invoice.invoice_number(),
                        "billing_period": period.to_string(),
                        "total_amount": invoice.total_amount(),
                    })),
                );
                Outcome::Created(invoice)
            }
            // Lost a concurrent race on the period index: reclassify, the
            // other writer's invoice stands.
            Err(StoreError::UniqueViolation(UniqueConstraint::InvoicePeriod)) => {
                if request.skip_existing {
                    Outcome::Skipped
                } else {
                    Outcome::Failed(DomainError::duplicate_period("duplicate period"))
                }
            }
            Err(e) => Outcome::Failed(e.into_domain()),
        }
    }

    /// Invoices nearing or past their due date, for the reminder
    /// collaborator. Read-only.
    pub fn list_due_within(
        &self,
        ctx: &CompanyContext,
        as_of: NaiveDate,
        within_days: u32,
    ) -> DomainResult<Vec<Invoice>> {
        let horizon = as_of + Duration::days(i64::from(within_days));
        let mut due: Vec<Invoice> = self
            .store
            .list_invoices(ctx.company_id())
            .map_err(|e| e.into_domain())?
            .into_iter()
            .filter(|i| {
                matches!(i.status(), InvoiceStatus::Sent | InvoiceStatus::Overdue)
                    && i.due_date() <= horizon
            })
            .collect();
        due.sort_by_key(|i| i.due_date());
        Ok(due)
    }

    pub fn get(&self, ctx: &CompanyContext, id: InvoiceId) -> DomainResult<Invoice> {
        let invoice = self
            .store
            .get_invoice(ctx.company_id(), id, Visibility::Live)
            .map_err(|e| e.into_domain())?;
        TenancyGuard::check(ctx, &invoice)?;
        Ok(invoice)
    }
}
