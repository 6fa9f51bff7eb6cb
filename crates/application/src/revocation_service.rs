use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use warden_core::{AppError, AppResult};
use warden_domain::{
    AssignmentKind, AuditAction, AuditEntry, AuditRecordId, Decision, DenialReason, EntityKind,
    GovernanceDecision, GovernanceOperation, GovernanceTarget, PermissionId, Revocation, RoleId,
    SoftDeletion, UserId, cascade_rules, decide,
};

use crate::audit_log_writer::append_entry;
use crate::lookups::{live_permission, live_role, live_user};
use crate::{AssignmentStore, AuditLogWriter, MutationContext, resolver};

/// Dependents revoked by one soft delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeReport {
    /// Deleted entity kind.
    pub entity_kind: EntityKind,
    /// Deleted entity id.
    pub entity_id: Uuid,
    /// Revoked rows per assignment kind.
    pub revoked: BTreeMap<AssignmentKind, u64>,
    /// Revoked rows in total.
    pub revoked_total: u64,
    /// Audit record of the deletion.
    pub audit_record_id: AuditRecordId,
    /// True when an earlier outcome was replayed for the idempotency key.
    #[serde(default)]
    pub replayed: bool,
}

/// Soft-deletes users, roles and permissions together with every dependent assignment.
#[derive(Clone)]
pub struct RevocationService {
    store: Arc<dyn AssignmentStore>,
    audit: AuditLogWriter,
}

impl RevocationService {
    /// Creates a revocation service over the assignment store.
    #[must_use]
    pub fn new(store: Arc<dyn AssignmentStore>, audit: AuditLogWriter) -> Self {
        Self { store, audit }
    }

    /// Soft-deletes an entity and revokes its dependents in one transaction.
    ///
    /// Any failure rolls back the deletion and every revocation.
    pub async fn soft_delete(
        &self,
        context: &MutationContext,
        kind: EntityKind,
        entity_id: Uuid,
    ) -> AppResult<CascadeReport> {
        let mut transaction = self.store.begin().await?;

        if let Some(key) = context.idempotency_key()
            && let Some(record) = transaction.find_audit_by_idempotency_key(key).await?
        {
            return replay(record.entry, record.id);
        }

        let actor_id = context.actor_id();
        let at = context.at();
        let target = match kind {
            EntityKind::User => {
                let user = live_user(transaction.as_mut(), UserId::from_uuid(entity_id)).await?;
                GovernanceTarget::UserLifecycle {
                    holds_protected_role: resolver::holds_protected_role(
                        transaction.as_mut(),
                        user.id(),
                        at,
                    )
                    .await?,
                }
            }
            EntityKind::Role => {
                let role = live_role(transaction.as_mut(), RoleId::from_uuid(entity_id)).await?;
                GovernanceTarget::Definition(Some(role.tier))
            }
            EntityKind::Permission => {
                let permission =
                    live_permission(transaction.as_mut(), PermissionId::from_uuid(entity_id))
                        .await?;
                GovernanceTarget::Definition(Some(permission.tier))
            }
        };

        let attempted = AuditEntry::granted(
            at,
            Some(actor_id),
            AuditAction::EntitySoftDeleted,
            kind.as_str(),
            entity_id.to_string(),
        )
        .with_idempotency_key(context.idempotency_key().map(str::to_owned));

        let capabilities = resolver::capabilities(transaction.as_mut(), actor_id, at).await?;
        if let GovernanceDecision::Denied(reason) =
            decide(&capabilities, target, GovernanceOperation::Delete)
        {
            drop(transaction);
            return Err(self.deny(reason, attempted, kind, entity_id).await);
        }

        let deletion = SoftDeletion {
            deleted_at: at,
            deleted_by: actor_id,
        };
        if !transaction.mark_deleted(kind, entity_id, deletion).await? {
            return Err(AppError::Conflict(format!(
                "{} '{entity_id}' was deleted concurrently",
                kind.as_str()
            )));
        }

        let revocation = Revocation {
            revoked_at: at,
            revoked_by: actor_id,
        };
        let mut revoked = BTreeMap::new();
        for rule in cascade_rules(kind) {
            let count = transaction
                .revoke_referencing(rule, entity_id, revocation)
                .await?;
            *revoked.entry(rule.assignment).or_insert(0) += count;
        }
        let revoked_total = revoked.values().sum();

        let mut report = CascadeReport {
            entity_kind: kind,
            entity_id,
            revoked,
            revoked_total,
            audit_record_id: AuditRecordId::new(),
            replayed: false,
        };
        let record = append_entry(
            transaction.as_mut(),
            attempted.with_context(json!({ "target_id": entity_id, "cascade": report })),
        )
        .await?;
        transaction.commit().await?;
        report.audit_record_id = record.id;

        info!(
            entity_kind = kind.as_str(),
            %entity_id,
            revoked_total,
            "entity soft-deleted with dependents"
        );

        Ok(report)
    }

    async fn deny(
        &self,
        reason: DenialReason,
        attempted: AuditEntry,
        kind: EntityKind,
        entity_id: Uuid,
    ) -> AppError {
        warn!(
            entity_kind = kind.as_str(),
            %entity_id,
            reason = reason.as_str(),
            "soft delete denied"
        );

        match self.audit.record(attempted.denied(reason.as_str())).await {
            Ok(_) => AppError::Forbidden(
                reason.as_str().to_owned(),
                format!("deleting {} '{entity_id}' denied", kind.as_str()),
            ),
            Err(error) => error,
        }
    }
}

fn replay(entry: AuditEntry, record_id: AuditRecordId) -> AppResult<CascadeReport> {
    match entry.decision {
        Decision::Granted => {
            let cascade = entry.context.get("cascade").cloned().ok_or_else(|| {
                AppError::Internal(format!("audit record '{record_id}' has no cascade report"))
            })?;
            let mut report: CascadeReport = serde_json::from_value(cascade).map_err(|error| {
                AppError::Internal(format!(
                    "failed to decode cascade report of audit record '{record_id}': {error}"
                ))
            })?;
            report.audit_record_id = record_id;
            report.replayed = true;
            Ok(report)
        }
        Decision::Denied => Err(AppError::Forbidden(
            entry.reason.unwrap_or_default(),
            format!("replayed denial of audit record '{record_id}'"),
        )),
    }
}
