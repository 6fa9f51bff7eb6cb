use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use tracing::{info, warn};
use uuid::Uuid;

use warden_core::{ActorIdentity, AppError, AppResult};
use warden_domain::{
    AssignmentKey, AuditAction, AuditEntry, AuditRecordId, Decision, DenialReason,
    GovernanceDecision, GovernanceOperation, GovernanceTarget, UnrevokedAssignment, UserId,
    decide,
};

use crate::audit_log_writer::append_entry;
use crate::{AssignmentStore, AssignmentTransaction, AuditLogWriter, EngineConfig, resolver};

mod audit_access;
mod definitions;
mod delegations;
mod identity_sync;
mod resource_grants;
mod role_grants;

pub use delegations::DelegationInput;
pub use resource_grants::ResourceGrantInput;

/// Caller, instant and optional idempotency key shared by governed mutations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationContext {
    actor: ActorIdentity,
    at: DateTime<Utc>,
    idempotency_key: Option<String>,
}

impl MutationContext {
    /// Creates a context for an authenticated actor at an explicit instant.
    #[must_use]
    pub fn new(actor: ActorIdentity, at: DateTime<Utc>) -> Self {
        Self {
            actor,
            at,
            idempotency_key: None,
        }
    }

    /// Makes the mutation idempotent: a retry with the same key replays the first outcome.
    #[must_use]
    pub fn with_idempotency_key(mut self, idempotency_key: impl Into<String>) -> Self {
        self.idempotency_key = Some(idempotency_key.into());
        self
    }

    /// Returns the acting user.
    #[must_use]
    pub fn actor_id(&self) -> UserId {
        UserId::from_uuid(self.actor.user_id())
    }

    /// Returns the operation instant.
    #[must_use]
    pub fn at(&self) -> DateTime<Utc> {
        self.at
    }

    /// Returns the idempotency key, if any.
    #[must_use]
    pub fn idempotency_key(&self) -> Option<&str> {
        self.idempotency_key.as_deref()
    }

    fn entry(
        &self,
        action: AuditAction,
        resource_type: &str,
        target_id: Uuid,
        detail: Value,
    ) -> AuditEntry {
        AuditEntry::granted(
            self.at,
            Some(self.actor_id()),
            action,
            resource_type,
            target_id.to_string(),
        )
        .with_context(json!({
            "target_id": target_id,
            "subject": self.actor.subject(),
            "detail": detail,
        }))
        .with_idempotency_key(self.idempotency_key.clone())
    }
}

/// Outcome of an applied governed mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationReceipt {
    /// Created or revoked row, or the created definition.
    pub target_id: Uuid,
    /// Audit record of the mutation.
    pub audit_record_id: AuditRecordId,
    /// True when an earlier outcome was replayed for the idempotency key.
    pub replayed: bool,
}

/// Applies governed mutations to roles, permissions and assignments.
///
/// The actor's capabilities are read inside the mutation's own transaction.
/// Denials roll the transaction back and are audited on their own.
#[derive(Clone)]
pub struct GovernanceService {
    store: Arc<dyn AssignmentStore>,
    audit: AuditLogWriter,
    config: EngineConfig,
}

impl GovernanceService {
    /// Creates a governance service over the assignment store.
    #[must_use]
    pub fn new(store: Arc<dyn AssignmentStore>, audit: AuditLogWriter, config: EngineConfig) -> Self {
        Self {
            store,
            audit,
            config,
        }
    }

    /// Checks whether the actor may perform an operation on a target at `at`.
    ///
    /// A denial writes one audit record; an allowed check writes none.
    pub async fn authorize_grant(
        &self,
        actor: &ActorIdentity,
        target: GovernanceTarget,
        operation: GovernanceOperation,
        at: DateTime<Utc>,
    ) -> AppResult<GovernanceDecision> {
        let actor_id = UserId::from_uuid(actor.user_id());
        let capabilities = {
            let mut snapshot = self.store.snapshot().await?;
            resolver::capabilities(snapshot.as_mut(), actor_id, at).await?
        };

        let decision = decide(&capabilities, target, operation);
        if let GovernanceDecision::Denied(reason) = decision {
            self.audit
                .record(
                    AuditEntry::granted(
                        at,
                        Some(actor_id),
                        AuditAction::GovernanceChecked,
                        "governance",
                        operation.as_str(),
                    )
                    .denied(reason.as_str())
                    .with_context(json!({ "target": format!("{target:?}") })),
                )
                .await?;
            warn!(%actor_id, reason = reason.as_str(), "governance check denied");
        }

        Ok(decision)
    }

    async fn begin(
        &self,
        context: &MutationContext,
    ) -> AppResult<Result<Box<dyn AssignmentTransaction>, MutationReceipt>> {
        let mut transaction = self.store.begin().await?;
        match replayed_outcome(transaction.as_mut(), context).await? {
            Some(receipt) => Ok(Err(receipt)),
            None => Ok(Ok(transaction)),
        }
    }

    /// Runs the governance check inside the open transaction.
    ///
    /// Hands the transaction back when allowed; rolls it back and audits the denial otherwise.
    async fn authorize(
        &self,
        mut transaction: Box<dyn AssignmentTransaction>,
        context: &MutationContext,
        target: GovernanceTarget,
        operation: GovernanceOperation,
        attempted: AuditEntry,
    ) -> AppResult<Box<dyn AssignmentTransaction>> {
        let capabilities =
            resolver::capabilities(transaction.as_mut(), context.actor_id(), context.at).await?;

        match decide(&capabilities, target, operation) {
            GovernanceDecision::Allowed => Ok(transaction),
            GovernanceDecision::Denied(reason) => {
                drop(transaction);
                Err(self.deny(reason, attempted).await)
            }
        }
    }

    /// Audits a denial and returns the error surfaced to the caller.
    async fn deny(&self, reason: DenialReason, attempted: AuditEntry) -> AppError {
        let message = format!(
            "{} on {} '{}' denied",
            attempted.action.as_str(),
            attempted.resource_type,
            attempted.resource_id
        );
        warn!(
            action = attempted.action.as_str(),
            reason = reason.as_str(),
            "governed mutation denied"
        );

        match self.audit.record(attempted.denied(reason.as_str())).await {
            Ok(_) => denial_error(reason, message),
            Err(error) => error,
        }
    }

    async fn finish(
        &self,
        mut transaction: Box<dyn AssignmentTransaction>,
        entry: AuditEntry,
        target_id: Uuid,
    ) -> AppResult<MutationReceipt> {
        let action = entry.action;
        let record = append_entry(transaction.as_mut(), entry).await?;
        transaction.commit().await?;

        info!(
            action = action.as_str(),
            %target_id,
            record_id = %record.id,
            "governed mutation applied"
        );

        Ok(MutationReceipt {
            target_id,
            audit_record_id: record.id,
            replayed: false,
        })
    }
}

fn denial_error(reason: DenialReason, message: String) -> AppError {
    match reason {
        DenialReason::CyclicRoleParent => {
            AppError::InvariantViolation(format!("{}: {message}", reason.as_str()))
        }
        DenialReason::ProtectedRole | DenialReason::InsufficientCapability => {
            AppError::Forbidden(reason.as_str().to_owned(), message)
        }
    }
}

/// Replays the outcome recorded under the context's idempotency key, if any.
async fn replayed_outcome(
    transaction: &mut dyn AssignmentTransaction,
    context: &MutationContext,
) -> AppResult<Option<MutationReceipt>> {
    let Some(key) = context.idempotency_key.as_deref() else {
        return Ok(None);
    };
    let Some(record) = transaction.find_audit_by_idempotency_key(key).await? else {
        return Ok(None);
    };

    match record.entry.decision {
        Decision::Granted => {
            let target_id = record
                .entry
                .context
                .get("target_id")
                .and_then(Value::as_str)
                .and_then(|value| Uuid::parse_str(value).ok())
                .ok_or_else(|| {
                    AppError::Internal(format!(
                        "audit record '{}' has no target id to replay",
                        record.id
                    ))
                })?;

            Ok(Some(MutationReceipt {
                target_id,
                audit_record_id: record.id,
                replayed: true,
            }))
        }
        Decision::Denied => {
            let code = record.entry.reason.unwrap_or_default();
            let message = format!("replayed denial for idempotency key '{key}'");
            Err(match DenialReason::from_str(&code) {
                Ok(reason) => denial_error(reason, message),
                Err(_) => AppError::Forbidden(code, message),
            })
        }
    }
}

/// Frees a unique key for a new row, sealing a lapsed predecessor.
async fn claim_key(
    transaction: &mut dyn AssignmentTransaction,
    key: &AssignmentKey,
    context: &MutationContext,
) -> AppResult<()> {
    let Some(existing) = transaction.find_unrevoked(key).await? else {
        return Ok(());
    };

    match existing.window.seal(context.actor_id()) {
        Some(seal) if existing.window.is_lapsed_at(context.at) => {
            if transaction
                .revoke_assignment(key.kind(), existing.id, seal)
                .await?
            {
                Ok(())
            } else {
                Err(AppError::Conflict(format!(
                    "{} '{}' changed concurrently",
                    key.kind().as_str(),
                    existing.id
                )))
            }
        }
        _ => Err(AppError::Conflict(format!(
            "an unrevoked {} already holds this key",
            key.kind().as_str()
        ))),
    }
}

/// Finds the unrevoked row holding a key.
async fn unrevoked(
    transaction: &mut dyn AssignmentTransaction,
    key: &AssignmentKey,
) -> AppResult<UnrevokedAssignment> {
    transaction.find_unrevoked(key).await?.ok_or_else(|| {
        AppError::NotFound(format!(
            "no unrevoked {} holds this key",
            key.kind().as_str()
        ))
    })
}

/// Stamps the revocation of an unrevoked row at the context instant.
async fn revoke(
    transaction: &mut dyn AssignmentTransaction,
    key: &AssignmentKey,
    existing: &UnrevokedAssignment,
    context: &MutationContext,
) -> AppResult<()> {
    let revocation = existing
        .window
        .revocation_at(context.at, context.actor_id())?;

    if transaction
        .revoke_assignment(key.kind(), existing.id, revocation)
        .await?
    {
        Ok(())
    } else {
        Err(AppError::Conflict(format!(
            "{} '{}' changed concurrently",
            key.kind().as_str(),
            existing.id
        )))
    }
}

#[cfg(test)]
mod tests;
