//! Integration tests for the full engine: services over the in-memory store
//! with audit events on the bus.
//!
//! Verifies:
//! - the billing scenarios end to end (generation, payment, overdue)
//! - tenancy isolation and the company write gate
//! - idempotent bulk generation, including under concurrency
//! - the storage-enforced invariants surviving concurrent writers

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use chrono::{NaiveDate, Utc};

    use casabill_billing::{InvoiceStatus, LineItem, LineItemKind, PaymentMethod};
    use casabill_core::{ActorId, CompanyId, DomainError, EntityId, Money};
    use casabill_events::{AuditEvent, EventBus, InMemoryEventBus};
    use casabill_leasing::{ApartmentId, CompoundId, ContactInfo, OccupancyId, OccupancyStatus};
    use casabill_tenancy::{Company, CompanyContext};

    use crate::jobs::{BillingJob, JobExecutor, JobExecutorConfig, JobQueue, JobStatus};
    use crate::services::{
        InvoiceService, MonthlyGenerationRequest, NewOccupancy, OccupancyService, PaymentService,
    };
    use crate::store::{LedgerStore, MemoryStore, Visibility};

    type Bus = Arc<InMemoryEventBus<AuditEvent>>;

    struct Harness {
        store: Arc<MemoryStore>,
        bus: Bus,
        ctx: CompanyContext,
    }

    impl Harness {
        fn occupancies(&self) -> OccupancyService<MemoryStore, Bus> {
            OccupancyService::new(self.store.clone(), self.bus.clone())
        }

        fn invoices(&self) -> InvoiceService<MemoryStore, Bus> {
            InvoiceService::new(self.store.clone(), self.bus.clone())
        }

        fn payments(&self) -> PaymentService<MemoryStore, Bus> {
            PaymentService::new(self.store.clone(), self.bus.clone())
        }

        /// Register an apartment + tenant and create a lease over 2024.
        fn lease(&self, rent_minor: i64) -> OccupancyId {
            let occupancies = self.occupancies();
            let apartment = occupancies
                .register_apartment(&self.ctx, CompoundId::new(EntityId::new()), "A-1")
                .unwrap();
            self.lease_on(apartment.id_typed(), rent_minor)
        }

        fn lease_on(&self, apartment_id: ApartmentId, rent_minor: i64) -> OccupancyId {
            let occupancies = self.occupancies();
            let tenant = occupancies
                .register_tenant(&self.ctx, "Mona Hassan", ContactInfo::default())
                .unwrap();
            occupancies
                .create(
                    &self.ctx,
                    NewOccupancy {
                        apartment_id,
                        tenant_id: tenant.id_typed(),
                        lease_start: date(2024, 1, 1),
                        lease_end: date(2024, 12, 31),
                        monthly_rent: Money::from_minor(rent_minor),
                        security_deposit: None,
                    },
                )
                .unwrap()
                .id_typed()
        }

        fn activated_lease(&self, rent_minor: i64) -> OccupancyId {
            let id = self.lease(rent_minor);
            self.occupancies()
                .activate(&self.ctx, id, date(2024, 1, 1))
                .unwrap();
            id
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let company =
            Company::register(CompanyId::new(), "Nile Estates", "EGP", Utc::now()).unwrap();
        let ctx = CompanyContext::new(company.id_typed(), ActorId::new());
        store.insert_company(company).unwrap();
        Harness { store, bus, ctx }
    }

    fn monthly(period: &str, due_day: u32, skip_existing: bool) -> MonthlyGenerationRequest {
        MonthlyGenerationRequest {
            period: period.parse().unwrap(),
            due_day,
            occupancy_ids: None,
            skip_existing,
        }
    }

    #[test]
    fn scenario_a_monthly_generation_produces_rent_draft() {
        let h = harness();
        h.activated_lease(150_000);

        let result = h
            .invoices()
            .generate_monthly(&h.ctx, monthly("2024-01", 5, true))
            .unwrap();

        assert_eq!(result.processed, 1);
        assert_eq!(result.created, 1);
        assert_eq!(result.skipped, 0);
        assert_eq!(result.failed, 0);
        assert_eq!(result.total_amount, Money::from_minor(150_000));

        let invoice = h
            .invoices()
            .get(&h.ctx, result.created_invoice_ids[0])
            .unwrap();
        assert_eq!(invoice.invoice_date(), date(2024, 1, 1));
        assert_eq!(invoice.due_date(), date(2024, 1, 5));
        assert_eq!(invoice.total_amount(), Money::from_minor(150_000));
        assert_eq!(invoice.status(), InvoiceStatus::Draft);
        assert_eq!(invoice.lines().len(), 1);
        assert_eq!(invoice.lines()[0].kind(), LineItemKind::Rent);
    }

    #[test]
    fn generation_is_idempotent_with_skip_existing() {
        let h = harness();
        h.activated_lease(150_000);

        let first = h
            .invoices()
            .generate_monthly(&h.ctx, monthly("2024-01", 5, true))
            .unwrap();
        let second = h
            .invoices()
            .generate_monthly(&h.ctx, monthly("2024-01", 5, true))
            .unwrap();

        assert_eq!(first.created, 1);
        assert_eq!(second.created, 0);
        assert_eq!(second.skipped, first.created);
        assert!(second.created_invoice_ids.is_empty());

        // Same invoice set before and after the re-run.
        let invoices = h.store.list_invoices(h.ctx.company_id()).unwrap();
        assert_eq!(invoices.len(), 1);
        assert_eq!(invoices[0].id_typed(), first.created_invoice_ids[0]);
    }

    #[test]
    fn duplicate_period_without_skip_is_recorded_failure() {
        let h = harness();
        h.activated_lease(150_000);

        h.invoices()
            .generate_monthly(&h.ctx, monthly("2024-01", 5, true))
            .unwrap();
        let rerun = h
            .invoices()
            .generate_monthly(&h.ctx, monthly("2024-01", 5, false))
            .unwrap();

        assert_eq!(rerun.failed, 1);
        assert_eq!(rerun.errors.len(), 1);
        assert_eq!(rerun.errors[0].error, "DuplicateInvoicePeriod");
    }

    #[test]
    fn scenario_b_full_payment_then_excess_cent() {
        let h = harness();
        h.activated_lease(150_000);

        let generated = h
            .invoices()
            .generate_monthly(&h.ctx, monthly("2024-01", 5, true))
            .unwrap();
        let invoice_id = generated.created_invoice_ids[0];
        h.invoices().send(&h.ctx, invoice_id).unwrap();

        let (_, updated) = h
            .payments()
            .apply_payment(
                &h.ctx,
                invoice_id,
                Money::from_minor(150_000),
                Utc::now(),
                PaymentMethod::Bank,
                Some("TRX-1".to_string()),
            )
            .unwrap();
        assert_eq!(updated.status(), InvoiceStatus::Paid);

        let err = h
            .payments()
            .apply_payment(
                &h.ctx,
                invoice_id,
                Money::from_minor(1),
                Utc::now(),
                PaymentMethod::Cash,
                None,
            )
            .unwrap_err();
        assert!(matches!(err, DomainError::Overpayment(_)));
    }

    #[test]
    fn scenario_c_second_occupancy_creates_but_cannot_activate() {
        let h = harness();
        let occupancies = h.occupancies();
        let apartment = occupancies
            .register_apartment(&h.ctx, CompoundId::new(EntityId::new()), "A-1")
            .unwrap();

        let first = h.lease_on(apartment.id_typed(), 150_000);
        occupancies
            .activate(&h.ctx, first, date(2024, 1, 1))
            .unwrap();

        // Creation itself is allowed while the apartment is occupied.
        let second = h.lease_on(apartment.id_typed(), 160_000);

        let err = occupancies
            .activate(&h.ctx, second, date(2024, 2, 1))
            .unwrap_err();
        assert!(matches!(err, DomainError::ApartmentNotAvailable(_)));

        let first_row = h
            .store
            .get_occupancy(h.ctx.company_id(), first, Visibility::Live)
            .unwrap();
        assert_eq!(first_row.status(), OccupancyStatus::Active);
        let second_row = h
            .store
            .get_occupancy(h.ctx.company_id(), second, Visibility::Live)
            .unwrap();
        assert_eq!(second_row.status(), OccupancyStatus::Pending);
    }

    #[test]
    fn scenario_d_corrupted_rent_fails_only_that_item() {
        let h = harness();
        let occupancies = h.occupancies();

        let mut ids = Vec::new();
        for (unit, rent) in [("A-1", 150_000), ("A-2", 0), ("A-3", 90_000)] {
            let apartment = occupancies
                .register_apartment(&h.ctx, CompoundId::new(EntityId::new()), unit)
                .unwrap();
            let id = h.lease_on(apartment.id_typed(), rent);
            occupancies.activate(&h.ctx, id, date(2024, 1, 1)).unwrap();
            ids.push(id);
        }

        let result = h
            .invoices()
            .generate_monthly(&h.ctx, monthly("2024-01", 5, true))
            .unwrap();

        assert_eq!(result.processed, 3);
        assert_eq!(result.created, 2);
        assert_eq!(result.failed, 1);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].occupancy_id, ids[1]);
        assert_eq!(result.errors[0].error, "InvalidLineItem");
        assert_eq!(result.total_amount, Money::from_minor(240_000));
    }

    #[test]
    fn due_day_past_month_end_clamps() {
        let h = harness();
        h.activated_lease(150_000);

        let result = h
            .invoices()
            .generate_monthly(&h.ctx, monthly("2024-02", 31, true))
            .unwrap();
        let invoice = h
            .invoices()
            .get(&h.ctx, result.created_invoice_ids[0])
            .unwrap();
        assert_eq!(invoice.due_date(), date(2024, 2, 29));
    }

    #[test]
    fn cross_tenant_access_is_fatal() {
        let h = harness();
        let occupancy = h.activated_lease(150_000);

        let other =
            Company::register(CompanyId::new(), "Rival Estates", "USD", Utc::now()).unwrap();
        let other_ctx = CompanyContext::new(other.id_typed(), ActorId::new());
        h.store.insert_company(other).unwrap();

        let err = h
            .occupancies()
            .end(&other_ctx, occupancy, date(2024, 6, 30))
            .unwrap_err();
        assert!(matches!(err, DomainError::CrossTenantAccess(_)));

        // The row is untouched.
        let row = h
            .store
            .get_occupancy(h.ctx.company_id(), occupancy, Visibility::Live)
            .unwrap();
        assert_eq!(row.status(), OccupancyStatus::Active);
    }

    #[test]
    fn inactive_company_rejects_writes() {
        let h = harness();
        let occupancy = h.lease(150_000);

        let mut company = h.store.get_company(h.ctx.company_id()).unwrap();
        company.deactivate(Utc::now());
        h.store.update_company(&company).unwrap();

        let err = h
            .occupancies()
            .activate(&h.ctx, occupancy, date(2024, 1, 1))
            .unwrap_err();
        assert_eq!(err, DomainError::CompanyInactive);
    }

    #[test]
    fn audit_events_are_emitted_after_commit_only() {
        let h = harness();
        let sub = h.bus.subscribe();
        let occupancy = h.activated_lease(150_000);

        let mut types = Vec::new();
        while let Ok(event) = sub.try_recv() {
            types.push(event.event_type());
        }
        assert!(types.contains(&"apartment.created".to_string()));
        assert!(types.contains(&"tenant.created".to_string()));
        assert!(types.contains(&"occupancy.created".to_string()));
        assert!(types.contains(&"occupancy.activated".to_string()));

        // A failed transition publishes nothing.
        let err = h
            .occupancies()
            .activate(&h.ctx, occupancy, date(2024, 1, 2))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition(_)));
        assert!(sub.try_recv().is_err());
    }

    #[test]
    fn concurrent_payments_never_exceed_total() {
        let h = harness();
        h.activated_lease(150_000);
        let generated = h
            .invoices()
            .generate_monthly(&h.ctx, monthly("2024-01", 5, true))
            .unwrap();
        let invoice_id = generated.created_invoice_ids[0];
        h.invoices().send(&h.ctx, invoice_id).unwrap();

        let mut handles = Vec::new();
        for _ in 0..10 {
            let store = h.store.clone();
            let bus = h.bus.clone();
            let ctx = h.ctx;
            handles.push(thread::spawn(move || {
                PaymentService::new(store, bus)
                    .apply_payment(
                        &ctx,
                        invoice_id,
                        Money::from_minor(20_000),
                        Utc::now(),
                        PaymentMethod::Mobile,
                        None,
                    )
                    .is_ok()
            }));
        }
        let successes = handles
            .into_iter()
            .map(|handle| handle.join().unwrap_or(false))
            .filter(|&ok| ok)
            .count();

        // 7 x 20_000 fits in 150_000; the 8th would overpay.
        assert_eq!(successes, 7);
        let invoice = h.invoices().get(&h.ctx, invoice_id).unwrap();
        assert_eq!(invoice.amount_paid(), Money::from_minor(140_000));
        assert!(invoice.amount_paid() <= invoice.total_amount());
        assert_eq!(
            h.payments()
                .list_for_invoice(&h.ctx, invoice_id)
                .unwrap()
                .len(),
            7
        );
    }

    #[test]
    fn concurrent_activation_has_single_winner() {
        let h = harness();
        let apartment = h
            .occupancies()
            .register_apartment(&h.ctx, CompoundId::new(EntityId::new()), "A-1")
            .unwrap();
        let first = h.lease_on(apartment.id_typed(), 150_000);
        let second = h.lease_on(apartment.id_typed(), 160_000);

        let mut handles = Vec::new();
        for id in [first, second] {
            let store = h.store.clone();
            let bus = h.bus.clone();
            let ctx = h.ctx;
            handles.push(thread::spawn(move || {
                OccupancyService::new(store, bus)
                    .activate(&ctx, id, date(2024, 1, 1))
                    .is_ok()
            }));
        }
        let successes = handles
            .into_iter()
            .map(|handle| handle.join().unwrap_or(false))
            .filter(|&ok| ok)
            .count();
        assert_eq!(successes, 1);

        let active: Vec<_> = h
            .store
            .list_occupancies(h.ctx.company_id())
            .unwrap()
            .into_iter()
            .filter(|o| o.is_active())
            .collect();
        assert_eq!(active.len(), 1);
    }

    #[test]
    fn concurrent_generation_creates_no_duplicates() {
        let h = harness();
        for unit in ["A-1", "A-2", "A-3"] {
            let apartment = h
                .occupancies()
                .register_apartment(&h.ctx, CompoundId::new(EntityId::new()), unit)
                .unwrap();
            let id = h.lease_on(apartment.id_typed(), 150_000);
            h.occupancies()
                .activate(&h.ctx, id, date(2024, 1, 1))
                .unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..4 {
            let store = h.store.clone();
            let bus = h.bus.clone();
            let ctx = h.ctx;
            handles.push(thread::spawn(move || {
                InvoiceService::new(store, bus)
                    .generate_monthly(&ctx, monthly("2024-01", 5, true))
                    .unwrap()
            }));
        }
        let total_created: u32 = handles
            .into_iter()
            .map(|handle| handle.join().unwrap().created)
            .sum();

        assert_eq!(total_created, 3);
        assert_eq!(h.store.list_invoices(h.ctx.company_id()).unwrap().len(), 3);
    }

    #[test]
    fn occupied_apartment_refuses_deletion() {
        let h = harness();
        let apartment = h
            .occupancies()
            .register_apartment(&h.ctx, CompoundId::new(EntityId::new()), "A-1")
            .unwrap();
        let occupancy = h.lease_on(apartment.id_typed(), 150_000);
        h.occupancies()
            .activate(&h.ctx, occupancy, date(2024, 1, 1))
            .unwrap();

        let err = h
            .occupancies()
            .delete_apartment(&h.ctx, apartment.id_typed())
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        // After move-out the apartment can be deleted and restored.
        h.occupancies()
            .end(&h.ctx, occupancy, date(2024, 6, 30))
            .unwrap();
        h.occupancies()
            .delete_apartment(&h.ctx, apartment.id_typed())
            .unwrap();
        assert!(h
            .store
            .get_apartment(h.ctx.company_id(), apartment.id_typed(), Visibility::Live)
            .is_err());
        h.occupancies()
            .restore_apartment(&h.ctx, apartment.id_typed())
            .unwrap();
        assert!(h
            .store
            .get_apartment(h.ctx.company_id(), apartment.id_typed(), Visibility::Live)
            .is_ok());
    }

    #[test]
    fn invoice_with_payments_refuses_deletion_and_cancellation() {
        let h = harness();
        h.activated_lease(150_000);
        let generated = h
            .invoices()
            .generate_monthly(&h.ctx, monthly("2024-01", 5, true))
            .unwrap();
        let invoice_id = generated.created_invoice_ids[0];
        h.invoices().send(&h.ctx, invoice_id).unwrap();
        h.payments()
            .apply_payment(
                &h.ctx,
                invoice_id,
                Money::from_minor(10_000),
                Utc::now(),
                PaymentMethod::Cash,
                None,
            )
            .unwrap();

        assert_eq!(
            h.invoices().cancel(&h.ctx, invoice_id).unwrap_err(),
            DomainError::InvoiceHasPayments
        );
        assert_eq!(
            h.invoices().delete(&h.ctx, invoice_id).unwrap_err(),
            DomainError::InvoiceHasPayments
        );
    }

    #[test]
    fn recompute_overdue_is_idempotent() {
        let h = harness();
        h.activated_lease(150_000);
        let generated = h
            .invoices()
            .generate_monthly(&h.ctx, monthly("2024-01", 5, true))
            .unwrap();
        let invoice_id = generated.created_invoice_ids[0];
        h.invoices().send(&h.ctx, invoice_id).unwrap();

        let first = h
            .payments()
            .recompute_overdue(&h.ctx, date(2024, 2, 1))
            .unwrap();
        assert_eq!(first.marked_overdue, 1);

        let second = h
            .payments()
            .recompute_overdue(&h.ctx, date(2024, 2, 1))
            .unwrap();
        assert_eq!(second.marked_overdue, 0);

        let invoice = h.invoices().get(&h.ctx, invoice_id).unwrap();
        assert_eq!(invoice.status(), InvoiceStatus::Overdue);
    }

    #[test]
    fn expiring_and_due_feeds() {
        let h = harness();
        h.activated_lease(150_000);
        let generated = h
            .invoices()
            .generate_monthly(&h.ctx, monthly("2024-01", 5, true))
            .unwrap();
        h.invoices()
            .send(&h.ctx, generated.created_invoice_ids[0])
            .unwrap();

        let expiring = h
            .occupancies()
            .list_active_expiring(&h.ctx, date(2024, 12, 1), 60)
            .unwrap();
        assert_eq!(expiring.len(), 1);
        assert!(h
            .occupancies()
            .list_active_expiring(&h.ctx, date(2024, 6, 1), 30)
            .unwrap()
            .is_empty());

        let due = h
            .invoices()
            .list_due_within(&h.ctx, date(2024, 1, 1), 7)
            .unwrap();
        assert_eq!(due.len(), 1);
    }

    #[test]
    fn job_executor_dispatches_typed_jobs() {
        let h = harness();
        let occupancy = h.activated_lease(150_000);

        let queue = Arc::new(JobQueue::new());
        queue.enqueue(BillingJob::GenerateMonthly {
            company_id: h.ctx.company_id(),
            actor_id: h.ctx.actor_id(),
            period: "2024-01".parse().unwrap(),
            due_day: 5,
            skip_existing: true,
        });
        queue.enqueue(BillingJob::GenerateSingle {
            company_id: h.ctx.company_id(),
            actor_id: h.ctx.actor_id(),
            occupancy_id: occupancy,
            period: "2024-02".parse().unwrap(),
            due_day: 5,
        });

        let executor =
            JobExecutor::new(queue.clone(), h.invoices(), JobExecutorConfig::default());
        assert_eq!(executor.run_pending(), 2);

        let finished = queue.finished();
        assert_eq!(finished.len(), 2);
        assert!(finished.iter().all(|job| job.status == JobStatus::Completed));
        assert_eq!(h.store.list_invoices(h.ctx.company_id()).unwrap().len(), 2);

        // A single-occupancy job for an already-billed period fails.
        queue.enqueue(BillingJob::GenerateSingle {
            company_id: h.ctx.company_id(),
            actor_id: h.ctx.actor_id(),
            occupancy_id: occupancy,
            period: "2024-02".parse().unwrap(),
            due_day: 5,
        });
        executor.run_pending();
        let finished = queue.finished();
        assert!(matches!(
            finished.last().map(|job| &job.status),
            Some(JobStatus::Failed { .. })
        ));
    }

    #[test]
    fn cancelled_occupancy_is_not_billed() {
        let h = harness();
        let occupancy = h.lease(150_000);
        h.occupancies().cancel(&h.ctx, occupancy).unwrap();

        let result = h
            .invoices()
            .generate_monthly(&h.ctx, monthly("2024-01", 5, true))
            .unwrap();
        assert_eq!(result.processed, 0);
        assert_eq!(result.created, 0);
    }

    #[test]
    fn manual_draft_and_send_lifecycle() {
        let h = harness();
        let occupancy = h.activated_lease(150_000);

        let lines = vec![
            LineItem::new(
                "Monthly rent",
                LineItemKind::Rent,
                1,
                Money::from_minor(150_000),
            )
            .unwrap(),
            LineItem::new("Water", LineItemKind::Utility, 2, Money::from_minor(2_500)).unwrap(),
        ];
        let invoice = h
            .invoices()
            .create_draft(
                &h.ctx,
                occupancy,
                date(2024, 3, 1),
                date(2024, 3, 10),
                lines,
                Money::from_minor(1_000),
            )
            .unwrap();
        assert_eq!(invoice.total_amount(), Money::from_minor(156_000));
        assert!(invoice.invoice_number().starts_with("INV-2024-"));

        let sent = h.invoices().send(&h.ctx, invoice.id_typed()).unwrap();
        assert_eq!(sent.status(), InvoiceStatus::Sent);
        // Idempotent re-send.
        let resent = h.invoices().send(&h.ctx, invoice.id_typed()).unwrap();
        assert_eq!(resent.status(), InvoiceStatus::Sent);
    }
}
