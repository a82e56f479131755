//! Structured audit events for the audit-logging collaborator.
//!
//! Every mutating operation emits one of these **after** the underlying store
//! commit succeeds — never speculatively before. The event is a fact; treat
//! it as immutable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use casabill_core::{ActorId, CompanyId};

/// What happened to the entity.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Created,
    Updated,
    Activated,
    Ended,
    Cancelled,
    Sent,
    PaymentApplied,
    MarkedOverdue,
    Deleted,
    Restored,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Created => "created",
            AuditAction::Updated => "updated",
            AuditAction::Activated => "activated",
            AuditAction::Ended => "ended",
            AuditAction::Cancelled => "cancelled",
            AuditAction::Sent => "sent",
            AuditAction::PaymentApplied => "payment_applied",
            AuditAction::MarkedOverdue => "marked_overdue",
            AuditAction::Deleted => "deleted",
            AuditAction::Restored => "restored",
        }
    }
}

/// One audited mutation: `{entity, entity_id, action, company_id, actor_id,
/// before?, after?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    event_id: Uuid,
    company_id: CompanyId,
    actor_id: ActorId,
    entity: String,
    entity_id: Uuid,
    action: AuditAction,
    before: Option<serde_json::Value>,
    after: Option<serde_json::Value>,
    occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        company_id: CompanyId,
        actor_id: ActorId,
        entity: impl Into<String>,
        entity_id: impl Into<Uuid>,
        action: AuditAction,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            company_id,
            actor_id,
            entity: entity.into(),
            entity_id: entity_id.into(),
            action,
            before: None,
            after: None,
            occurred_at,
        }
    }

    pub fn with_before(mut self, before: serde_json::Value) -> Self {
        self.before = Some(before);
        self
    }

    pub fn with_after(mut self, after: serde_json::Value) -> Self {
        self.after = Some(after);
        self
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn company_id(&self) -> CompanyId {
        self.company_id
    }

    pub fn actor_id(&self) -> ActorId {
        self.actor_id
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn entity_id(&self) -> Uuid {
        self.entity_id
    }

    pub fn action(&self) -> AuditAction {
        self.action
    }

    pub fn before(&self) -> Option<&serde_json::Value> {
        self.before.as_ref()
    }

    pub fn after(&self) -> Option<&serde_json::Value> {
        self.after.as_ref()
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    /// Stable type identifier, e.g. `"invoice.payment_applied"`.
    pub fn event_type(&self) -> String {
        format!("{}.{}", self.entity, self.action.as_str())
    }
}
