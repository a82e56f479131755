//! Postgres-backed store.
//!
//! Rows carry the full entity as JSONB (`body`) plus typed columns for
//! everything a constraint or batch scan needs. The schema is where the
//! engine's §-level guarantees actually live:
//!
//! - `occupancies_active_apartment_uq` — partial unique index on
//!   `(company_id, apartment_id) WHERE status = 'active' AND deleted_at IS
//!   NULL`: at most one active occupancy per apartment, even under
//!   concurrent activation.
//! - `invoices_period_uq` — partial unique on `(company_id, occupancy_id,
//!   billing_period) WHERE billing_period IS NOT NULL`: bulk generation is
//!   idempotent per occupancy-period.
//! - `invoices_number_uq` — unique `(company_id, invoice_number)`.
//! - `apartments_unit_uq` — unique `(company_id, compound_id, unit_no)`.
//!
//! ## Error Mapping
//!
//! | PostgreSQL error | Code | StoreError |
//! |---|---|---|
//! | unique violation on a named constraint above | `23505` | `UniqueViolation(..)` |
//! | unique violation on anything else | `23505` | `Backend` |
//! | any other database/pool/network error | — | `Backend` |
//!
//! ## Runtime
//!
//! The [`LedgerStore`] trait is synchronous; Postgres operations are async.
//! Trait methods resolve the current tokio runtime handle and `block_on` the
//! async inner call, the same adapter shape the in-process callers already
//! run under.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::future::Future;

use casabill_billing::{BillingPeriod, Invoice, InvoiceId, Payment, PaymentId};
use casabill_core::{CompanyId, EntityId, SoftDelete, Tenanted};
use casabill_leasing::{Apartment, ApartmentId, Occupancy, OccupancyId, Tenant, TenantId};
use casabill_tenancy::Company;

use super::{LedgerStore, StoreError, StoreResult, UniqueConstraint, Visibility};

/// DDL applied by [`PostgresStore::ensure_schema`].
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS companies (
    id          UUID PRIMARY KEY,
    is_active   BOOLEAN NOT NULL,
    deleted_at  TIMESTAMPTZ,
    body        JSONB NOT NULL
);

CREATE TABLE IF NOT EXISTS apartments (
    id          UUID PRIMARY KEY,
    company_id  UUID NOT NULL,
    compound_id UUID NOT NULL,
    unit_no     TEXT NOT NULL,
    status      TEXT NOT NULL,
    deleted_at  TIMESTAMPTZ,
    body        JSONB NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS apartments_unit_uq
    ON apartments (company_id, compound_id, unit_no);
CREATE INDEX IF NOT EXISTS apartments_company_status_idx
    ON apartments (company_id, status);

CREATE TABLE IF NOT EXISTS tenants (
    id          UUID PRIMARY KEY,
    company_id  UUID NOT NULL,
    deleted_at  TIMESTAMPTZ,
    body        JSONB NOT NULL
);

CREATE TABLE IF NOT EXISTS occupancies (
    id           UUID PRIMARY KEY,
    company_id   UUID NOT NULL,
    apartment_id UUID NOT NULL,
    status       TEXT NOT NULL,
    lease_end    DATE NOT NULL,
    deleted_at   TIMESTAMPTZ,
    body         JSONB NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS occupancies_active_apartment_uq
    ON occupancies (company_id, apartment_id)
    WHERE status = 'active' AND deleted_at IS NULL;
CREATE INDEX IF NOT EXISTS occupancies_company_status_idx
    ON occupancies (company_id, status);

CREATE TABLE IF NOT EXISTS invoices (
    id             UUID PRIMARY KEY,
    company_id     UUID NOT NULL,
    occupancy_id   UUID NOT NULL,
    invoice_number TEXT NOT NULL,
    billing_period TEXT,
    status         TEXT NOT NULL,
    due_date       DATE NOT NULL,
    deleted_at     TIMESTAMPTZ,
    body           JSONB NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS invoices_number_uq
    ON invoices (company_id, invoice_number);
CREATE UNIQUE INDEX IF NOT EXISTS invoices_period_uq
    ON invoices (company_id, occupancy_id, billing_period)
    WHERE billing_period IS NOT NULL;
CREATE INDEX IF NOT EXISTS invoices_company_status_idx
    ON invoices (company_id, status);

CREATE TABLE IF NOT EXISTS payments (
    id         UUID PRIMARY KEY,
    company_id UUID NOT NULL,
    invoice_id UUID NOT NULL,
    body       JSONB NOT NULL
);
CREATE INDEX IF NOT EXISTS payments_invoice_idx
    ON payments (company_id, invoice_id);

CREATE TABLE IF NOT EXISTS invoice_sequences (
    company_id UUID PRIMARY KEY,
    next_value BIGINT NOT NULL
);
"#;

/// Postgres implementation of [`LedgerStore`].
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect with a `DATABASE_URL`-style connection string.
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| StoreError::Backend(format!("connect: {e}")))?;
        Ok(Self { pool })
    }

    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the schema (idempotent).
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        for statement in SCHEMA_SQL.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        Ok(())
    }

    fn block<O>(&self, fut: impl Future<Output = StoreResult<O>>) -> StoreResult<O> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| {
            StoreError::Backend(
                "PostgresStore requires a tokio runtime context".to_string(),
            )
        })?;
        handle.block_on(fut)
    }

    async fn fetch_entity<E>(
        &self,
        table: &str,
        id: EntityId,
        company: CompanyId,
        vis: Visibility,
        what: &str,
    ) -> StoreResult<E>
    where
        E: DeserializeOwned + Tenanted + SoftDelete,
    {
        let query = format!("SELECT body FROM {table} WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(uuid::Uuid::from(id))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(what, e))?
            .ok_or(StoreError::NotFound)?;
        let body: serde_json::Value = row
            .try_get("body")
            .map_err(|e| StoreError::Backend(format!("{what}: {e}")))?;
        let entity: E = serde_json::from_value(body)
            .map_err(|e| StoreError::Backend(format!("{what} decode: {e}")))?;
        if entity.company_id() != company {
            return Err(StoreError::CrossTenant(format!(
                "{what} belongs to a different company"
            )));
        }
        if vis == Visibility::Live && entity.is_deleted() {
            return Err(StoreError::NotFound);
        }
        Ok(entity)
    }

    async fn list_entities<E>(&self, table: &str, company: CompanyId) -> StoreResult<Vec<E>>
    where
        E: DeserializeOwned,
    {
        let query =
            format!("SELECT body FROM {table} WHERE company_id = $1 AND deleted_at IS NULL");
        let rows = sqlx::query(&query)
            .bind(uuid::Uuid::from(company))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(table, e))?;
        rows.into_iter()
            .map(|row| {
                let body: serde_json::Value = row
                    .try_get("body")
                    .map_err(|e| StoreError::Backend(format!("{table}: {e}")))?;
                serde_json::from_value(body)
                    .map_err(|e| StoreError::Backend(format!("{table} decode: {e}")))
            })
            .collect()
    }

    async fn upsert_occupancy_row(
        tx: &mut Transaction<'_, Postgres>,
        occupancy: &Occupancy,
    ) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO occupancies (id, company_id, apartment_id, status, lease_end, deleted_at, body)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (id) DO UPDATE
             SET status = EXCLUDED.status,
                 lease_end = EXCLUDED.lease_end,
                 deleted_at = EXCLUDED.deleted_at,
                 body = EXCLUDED.body",
        )
        .bind(uuid::Uuid::from(occupancy.id_typed()))
        .bind(uuid::Uuid::from(occupancy.company_id()))
        .bind(uuid::Uuid::from(occupancy.apartment_id()))
        .bind(status_str(&occupancy.status()))
        .bind(occupancy.lease_end())
        .bind(occupancy.deleted_at())
        .bind(to_body(occupancy)?)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("upsert_occupancy", e))?;
        Ok(())
    }

    async fn upsert_apartment_row(
        tx: &mut Transaction<'_, Postgres>,
        apartment: &Apartment,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE apartments
             SET status = $2, deleted_at = $3, body = $4
             WHERE id = $1",
        )
        .bind(uuid::Uuid::from(apartment.id_typed()))
        .bind(status_str(&apartment.status()))
        .bind(apartment.deleted_at())
        .bind(to_body(apartment)?)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("upsert_apartment", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn insert_invoice_inner(&self, invoice: Invoice) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO invoices
               (id, company_id, occupancy_id, invoice_number, billing_period,
                status, due_date, deleted_at, body)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(uuid::Uuid::from(invoice.id_typed()))
        .bind(uuid::Uuid::from(invoice.company_id()))
        .bind(uuid::Uuid::from(invoice.occupancy_id()))
        .bind(invoice.invoice_number())
        .bind(invoice.billing_period().map(|p| p.to_string()))
        .bind(status_str(&invoice.status()))
        .bind(invoice.due_date())
        .bind(invoice.deleted_at())
        .bind(to_body(&invoice)?)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_invoice", e))?;
        Ok(())
    }

    async fn apply_payment_inner(
        &self,
        payment: Payment,
        now: DateTime<Utc>,
    ) -> StoreResult<Invoice> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("apply_payment", e))?;

        // Row lock: concurrent payments against this invoice serialize here,
        // so the overpayment check always runs against the committed balance.
        let row = sqlx::query("SELECT body FROM invoices WHERE id = $1 FOR UPDATE")
            .bind(uuid::Uuid::from(payment.invoice_id()))
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("apply_payment", e))?
            .ok_or(StoreError::NotFound)?;
        let body: serde_json::Value = row
            .try_get("body")
            .map_err(|e| StoreError::Backend(format!("apply_payment: {e}")))?;
        let mut invoice: Invoice = serde_json::from_value(body)
            .map_err(|e| StoreError::Backend(format!("apply_payment decode: {e}")))?;

        if invoice.company_id() != payment.company_id() {
            return Err(StoreError::CrossTenant(
                "invoice belongs to a different company".to_string(),
            ));
        }
        if invoice.is_deleted() {
            return Err(StoreError::NotFound);
        }

        invoice.register_payment(payment.amount(), now)?;

        sqlx::query("UPDATE invoices SET status = $2, body = $3 WHERE id = $1")
            .bind(uuid::Uuid::from(invoice.id_typed()))
            .bind(status_str(&invoice.status()))
            .bind(to_body(&invoice)?)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("apply_payment", e))?;

        sqlx::query(
            "INSERT INTO payments (id, company_id, invoice_id, body) VALUES ($1, $2, $3, $4)",
        )
        .bind(uuid::Uuid::from(payment.id_typed()))
        .bind(uuid::Uuid::from(payment.company_id()))
        .bind(uuid::Uuid::from(payment.invoice_id()))
        .bind(to_body(&payment)?)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("apply_payment", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("apply_payment", e))?;
        Ok(invoice)
    }
}

fn to_body<E: Serialize>(entity: &E) -> StoreResult<serde_json::Value> {
    serde_json::to_value(entity).map_err(|e| StoreError::Backend(format!("encode: {e}")))
}

fn status_str<S: Serialize>(status: &S) -> String {
    serde_json::to_value(status)
        .ok()
        .and_then(|v| v.as_str().map(str::to_owned))
        .unwrap_or_else(|| "unknown".to_string())
}

fn map_sqlx_error(op: &str, e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        if db.code().as_deref() == Some("23505") {
            let mapped = match db.constraint() {
                Some("occupancies_active_apartment_uq") => {
                    Some(UniqueConstraint::ActiveOccupancyPerApartment)
                }
                Some("invoices_period_uq") => Some(UniqueConstraint::InvoicePeriod),
                Some("invoices_number_uq") => Some(UniqueConstraint::InvoiceNumber),
                Some("apartments_unit_uq") => Some(UniqueConstraint::UnitNoPerCompound),
                _ => None,
            };
            if let Some(constraint) = mapped {
                return StoreError::UniqueViolation(constraint);
            }
        }
    }
    StoreError::Backend(format!("{op}: {e}"))
}

impl LedgerStore for PostgresStore {
    fn insert_company(&self, company: Company) -> StoreResult<()> {
        self.block(async {
            sqlx::query(
                "INSERT INTO companies (id, is_active, deleted_at, body)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (id) DO UPDATE
                 SET is_active = EXCLUDED.is_active,
                     deleted_at = EXCLUDED.deleted_at,
                     body = EXCLUDED.body",
            )
            .bind(uuid::Uuid::from(company.id_typed()))
            .bind(company.is_active())
            .bind(company.deleted_at())
            .bind(to_body(&company)?)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_company", e))?;
            Ok(())
        })
    }

    fn get_company(&self, id: CompanyId) -> StoreResult<Company> {
        self.block(async {
            let row = sqlx::query("SELECT body FROM companies WHERE id = $1 AND deleted_at IS NULL")
                .bind(uuid::Uuid::from(id))
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("get_company", e))?
                .ok_or(StoreError::NotFound)?;
            let body: serde_json::Value = row
                .try_get("body")
                .map_err(|e| StoreError::Backend(format!("get_company: {e}")))?;
            serde_json::from_value(body)
                .map_err(|e| StoreError::Backend(format!("get_company decode: {e}")))
        })
    }

    fn update_company(&self, company: &Company) -> StoreResult<()> {
        self.block(async {
            let result = sqlx::query(
                "UPDATE companies SET is_active = $2, deleted_at = $3, body = $4 WHERE id = $1",
            )
            .bind(uuid::Uuid::from(company.id_typed()))
            .bind(company.is_active())
            .bind(company.deleted_at())
            .bind(to_body(company)?)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_company", e))?;
            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
    }

    fn insert_apartment(&self, apartment: Apartment) -> StoreResult<()> {
        self.block(async {
            sqlx::query(
                "INSERT INTO apartments
                   (id, company_id, compound_id, unit_no, status, deleted_at, body)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(uuid::Uuid::from(apartment.id_typed()))
            .bind(uuid::Uuid::from(apartment.company_id()))
            .bind(uuid::Uuid::from(apartment.compound_id().0))
            .bind(apartment.unit_no())
            .bind(status_str(&apartment.status()))
            .bind(apartment.deleted_at())
            .bind(to_body(&apartment)?)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_apartment", e))?;
            Ok(())
        })
    }

    fn get_apartment(
        &self,
        company: CompanyId,
        id: ApartmentId,
        vis: Visibility,
    ) -> StoreResult<Apartment> {
        self.block(self.fetch_entity("apartments", id.0, company, vis, "apartment"))
    }

    fn update_apartment(&self, apartment: &Apartment) -> StoreResult<()> {
        self.block(async {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| map_sqlx_error("update_apartment", e))?;
            Self::upsert_apartment_row(&mut tx, apartment).await?;
            tx.commit()
                .await
                .map_err(|e| map_sqlx_error("update_apartment", e))?;
            Ok(())
        })
    }

    fn list_apartments(&self, company: CompanyId) -> StoreResult<Vec<Apartment>> {
        self.block(self.list_entities("apartments", company))
    }

    fn insert_tenant(&self, tenant: Tenant) -> StoreResult<()> {
        self.block(async {
            sqlx::query(
                "INSERT INTO tenants (id, company_id, deleted_at, body) VALUES ($1, $2, $3, $4)",
            )
            .bind(uuid::Uuid::from(tenant.id_typed()))
            .bind(uuid::Uuid::from(tenant.company_id()))
            .bind(tenant.deleted_at())
            .bind(to_body(&tenant)?)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_tenant", e))?;
            Ok(())
        })
    }

    fn get_tenant(
        &self,
        company: CompanyId,
        id: TenantId,
        vis: Visibility,
    ) -> StoreResult<Tenant> {
        self.block(self.fetch_entity("tenants", id.0, company, vis, "tenant"))
    }

    fn update_tenant(&self, tenant: &Tenant) -> StoreResult<()> {
        self.block(async {
            let result =
                sqlx::query("UPDATE tenants SET deleted_at = $2, body = $3 WHERE id = $1")
                    .bind(uuid::Uuid::from(tenant.id_typed()))
                    .bind(tenant.deleted_at())
                    .bind(to_body(tenant)?)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| map_sqlx_error("update_tenant", e))?;
            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
    }

    fn insert_occupancy(&self, occupancy: Occupancy) -> StoreResult<()> {
        self.block(async {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| map_sqlx_error("insert_occupancy", e))?;
            Self::upsert_occupancy_row(&mut tx, &occupancy).await?;
            tx.commit()
                .await
                .map_err(|e| map_sqlx_error("insert_occupancy", e))?;
            Ok(())
        })
    }

    fn get_occupancy(
        &self,
        company: CompanyId,
        id: OccupancyId,
        vis: Visibility,
    ) -> StoreResult<Occupancy> {
        self.block(self.fetch_entity("occupancies", id.0, company, vis, "occupancy"))
    }

    fn update_occupancy(&self, occupancy: &Occupancy) -> StoreResult<()> {
        self.block(async {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| map_sqlx_error("update_occupancy", e))?;
            Self::upsert_occupancy_row(&mut tx, occupancy).await?;
            tx.commit()
                .await
                .map_err(|e| map_sqlx_error("update_occupancy", e))?;
            Ok(())
        })
    }

    fn list_occupancies(&self, company: CompanyId) -> StoreResult<Vec<Occupancy>> {
        self.block(self.list_entities("occupancies", company))
    }

    fn active_occupancy_for_apartment(
        &self,
        company: CompanyId,
        apartment: ApartmentId,
    ) -> StoreResult<Option<OccupancyId>> {
        self.block(async {
            let row = sqlx::query(
                "SELECT id FROM occupancies
                 WHERE company_id = $1 AND apartment_id = $2
                   AND status = 'active' AND deleted_at IS NULL",
            )
            .bind(uuid::Uuid::from(company))
            .bind(uuid::Uuid::from(apartment))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("active_occupancy_for_apartment", e))?;
            match row {
                Some(row) => {
                    let id: uuid::Uuid = row
                        .try_get("id")
                        .map_err(|e| StoreError::Backend(format!("active_occupancy: {e}")))?;
                    Ok(Some(OccupancyId::new(EntityId::from_uuid(id))))
                }
                None => Ok(None),
            }
        })
    }

    fn commit_activation(&self, occupancy: &Occupancy, apartment: &Apartment) -> StoreResult<()> {
        self.block(async {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| map_sqlx_error("commit_activation", e))?;
            // The partial unique index decides the race; a loser rolls back
            // with UniqueViolation(ActiveOccupancyPerApartment).
            Self::upsert_occupancy_row(&mut tx, occupancy).await?;
            Self::upsert_apartment_row(&mut tx, apartment).await?;
            tx.commit()
                .await
                .map_err(|e| map_sqlx_error("commit_activation", e))?;
            Ok(())
        })
    }

    fn commit_end(&self, occupancy: &Occupancy, apartment: &Apartment) -> StoreResult<()> {
        self.block(async {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| map_sqlx_error("commit_end", e))?;
            Self::upsert_occupancy_row(&mut tx, occupancy).await?;
            Self::upsert_apartment_row(&mut tx, apartment).await?;
            tx.commit()
                .await
                .map_err(|e| map_sqlx_error("commit_end", e))?;
            Ok(())
        })
    }

    fn insert_invoice(&self, invoice: Invoice) -> StoreResult<()> {
        self.block(self.insert_invoice_inner(invoice))
    }

    fn get_invoice(
        &self,
        company: CompanyId,
        id: InvoiceId,
        vis: Visibility,
    ) -> StoreResult<Invoice> {
        self.block(self.fetch_entity("invoices", id.0, company, vis, "invoice"))
    }

    fn update_invoice(&self, invoice: &Invoice) -> StoreResult<()> {
        self.block(async {
            let result = sqlx::query(
                "UPDATE invoices SET status = $2, deleted_at = $3, body = $4 WHERE id = $1",
            )
            .bind(uuid::Uuid::from(invoice.id_typed()))
            .bind(status_str(&invoice.status()))
            .bind(invoice.deleted_at())
            .bind(to_body(invoice)?)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_invoice", e))?;
            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
    }

    fn list_invoices(&self, company: CompanyId) -> StoreResult<Vec<Invoice>> {
        self.block(self.list_entities("invoices", company))
    }

    fn find_invoice_for_period(
        &self,
        company: CompanyId,
        occupancy: OccupancyId,
        period: BillingPeriod,
    ) -> StoreResult<Option<InvoiceId>> {
        self.block(async {
            let row = sqlx::query(
                "SELECT id FROM invoices
                 WHERE company_id = $1 AND occupancy_id = $2 AND billing_period = $3",
            )
            .bind(uuid::Uuid::from(company))
            .bind(uuid::Uuid::from(occupancy))
            .bind(period.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_invoice_for_period", e))?;
            match row {
                Some(row) => {
                    let id: uuid::Uuid = row
                        .try_get("id")
                        .map_err(|e| StoreError::Backend(format!("find_invoice: {e}")))?;
                    Ok(Some(InvoiceId::new(EntityId::from_uuid(id))))
                }
                None => Ok(None),
            }
        })
    }

    fn next_invoice_sequence(&self, company: CompanyId) -> StoreResult<u64> {
        self.block(async {
            let row = sqlx::query(
                "INSERT INTO invoice_sequences (company_id, next_value)
                 VALUES ($1, 1)
                 ON CONFLICT (company_id)
                 DO UPDATE SET next_value = invoice_sequences.next_value + 1
                 RETURNING next_value",
            )
            .bind(uuid::Uuid::from(company))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("next_invoice_sequence", e))?;
            let next: i64 = row
                .try_get("next_value")
                .map_err(|e| StoreError::Backend(format!("next_invoice_sequence: {e}")))?;
            Ok(next as u64)
        })
    }

    fn apply_payment(&self, payment: Payment, now: DateTime<Utc>) -> StoreResult<Invoice> {
        self.block(self.apply_payment_inner(payment, now))
    }

    fn get_payment(&self, company: CompanyId, id: PaymentId) -> StoreResult<Payment> {
        self.block(async {
            let row = sqlx::query("SELECT company_id, body FROM payments WHERE id = $1")
                .bind(uuid::Uuid::from(id))
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("get_payment", e))?
                .ok_or(StoreError::NotFound)?;
            let owner: uuid::Uuid = row
                .try_get("company_id")
                .map_err(|e| StoreError::Backend(format!("get_payment: {e}")))?;
            if CompanyId::from_uuid(owner) != company {
                return Err(StoreError::CrossTenant(
                    "payment belongs to a different company".to_string(),
                ));
            }
            let body: serde_json::Value = row
                .try_get("body")
                .map_err(|e| StoreError::Backend(format!("get_payment: {e}")))?;
            serde_json::from_value(body)
                .map_err(|e| StoreError::Backend(format!("get_payment decode: {e}")))
        })
    }

    fn list_payments(&self, company: CompanyId, invoice: InvoiceId) -> StoreResult<Vec<Payment>> {
        self.block(async {
            let rows = sqlx::query(
                "SELECT body FROM payments WHERE company_id = $1 AND invoice_id = $2",
            )
            .bind(uuid::Uuid::from(company))
            .bind(uuid::Uuid::from(invoice))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_payments", e))?;
            rows.into_iter()
                .map(|row| {
                    let body: serde_json::Value = row
                        .try_get("body")
                        .map_err(|e| StoreError::Backend(format!("list_payments: {e}")))?;
                    serde_json::from_value(body)
                        .map_err(|e| StoreError::Backend(format!("list_payments decode: {e}")))
                })
                .collect()
        })
    }
}
