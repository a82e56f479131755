use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use std::sync::Arc;

use chrono::{NaiveDate, Utc};

use casabill_billing::PaymentMethod;
use casabill_core::{ActorId, CompanyId, EntityId, Money};
use casabill_events::{AuditEvent, InMemoryEventBus};
use casabill_infra::services::{
    InvoiceService, MonthlyGenerationRequest, NewOccupancy, OccupancyService, PaymentService,
};
use casabill_infra::store::MemoryStore;
use casabill_infra::LedgerStore;
use casabill_leasing::{CompoundId, ContactInfo};
use casabill_tenancy::{Company, CompanyContext};

type Bus = Arc<InMemoryEventBus<AuditEvent>>;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// A company with `n` active leases ready for billing.
fn seeded_company(n: usize) -> (Arc<MemoryStore>, Bus, CompanyContext) {
    let store = Arc::new(MemoryStore::new());
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    let company = Company::register(CompanyId::new(), "Bench Estates", "USD", Utc::now()).unwrap();
    let ctx = CompanyContext::new(company.id_typed(), ActorId::new());
    store.insert_company(company).unwrap();

    let occupancies = OccupancyService::new(store.clone(), bus.clone());
    for i in 0..n {
        let apartment = occupancies
            .register_apartment(&ctx, CompoundId::new(EntityId::new()), &format!("A-{i}"))
            .unwrap();
        let tenant = occupancies
            .register_tenant(&ctx, &format!("Tenant {i}"), ContactInfo::default())
            .unwrap();
        let occupancy = occupancies
            .create(
                &ctx,
                NewOccupancy {
                    apartment_id: apartment.id_typed(),
                    tenant_id: tenant.id_typed(),
                    lease_start: date(2024, 1, 1),
                    lease_end: date(2024, 12, 31),
                    monthly_rent: Money::from_minor(150_000),
                    security_deposit: None,
                },
            )
            .unwrap();
        occupancies
            .activate(&ctx, occupancy.id_typed(), date(2024, 1, 1))
            .unwrap();
    }
    (store, bus, ctx)
}

fn bench_generate_monthly(c: &mut Criterion) {
    let mut group = c.benchmark_group("generate_monthly");
    for n in [10usize, 100, 500] {
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter_batched(
                || seeded_company(n),
                |(store, bus, ctx)| {
                    let invoices = InvoiceService::new(store, bus);
                    invoices
                        .generate_monthly(
                            &ctx,
                            MonthlyGenerationRequest {
                                period: "2024-01".parse().unwrap(),
                                due_day: 5,
                                occupancy_ids: None,
                                skip_existing: true,
                            },
                        )
                        .unwrap()
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_apply_payment(c: &mut Criterion) {
    c.bench_function("apply_payment", |b| {
        b.iter_batched(
            || {
                let (store, bus, ctx) = seeded_company(1);
                let invoices = InvoiceService::new(store.clone(), bus.clone());
                let result = invoices
                    .generate_monthly(
                        &ctx,
                        MonthlyGenerationRequest {
                            period: "2024-01".parse().unwrap(),
                            due_day: 5,
                            occupancy_ids: None,
                            skip_existing: true,
                        },
                    )
                    .unwrap();
                (store, bus, ctx, result.created_invoice_ids[0])
            },
            |(store, bus, ctx, invoice_id)| {
                PaymentService::new(store, bus)
                    .apply_payment(
                        &ctx,
                        invoice_id,
                        Money::from_minor(50_000),
                        Utc::now(),
                        PaymentMethod::Bank,
                        None,
                    )
                    .unwrap()
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, bench_generate_monthly, bench_apply_payment);
criterion_main!(benches);
