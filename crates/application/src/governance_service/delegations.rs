use super::*;

use warden_domain::{Delegation, DelegationScope, GrantId, TemporalAssignment, ValidityWindow};

use crate::lookups::live_user;

/// Delegation request from one user to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegationInput {
    /// Delegating user.
    pub delegator_id: UserId,
    /// Receiving user.
    pub delegatee_id: UserId,
    /// Scope tag: `full`, `read_only` or `actions:<a>,<b>`.
    pub scope_tag: String,
    /// Optional resource-type restriction.
    pub resource_type: Option<String>,
    /// Optional resource-instance restriction.
    pub resource_ids: Option<Vec<String>>,
    /// Start of the delegation.
    pub valid_from: DateTime<Utc>,
    /// Optional end of the delegation.
    pub valid_until: Option<DateTime<Utc>>,
}

impl GovernanceService {
    /// Delegates a scoped subset of the delegator's direct access.
    ///
    /// Actors may delegate their own access; delegating on someone else's
    /// behalf needs the elevated-assignment capability.
    pub async fn delegate(
        &self,
        context: &MutationContext,
        input: DelegationInput,
    ) -> AppResult<MutationReceipt> {
        if !self.config.delegations_enabled() {
            return Err(AppError::Validation(
                "delegations are disabled by configuration".to_owned(),
            ));
        }
        if input.delegator_id == input.delegatee_id {
            return Err(AppError::Validation(
                "a user cannot delegate to itself".to_owned(),
            ));
        }
        if input.resource_ids.as_ref().is_some_and(Vec::is_empty) {
            return Err(AppError::Validation(
                "resource id restriction must list at least one id".to_owned(),
            ));
        }

        let mut transaction = match self.begin(context).await? {
            Ok(transaction) => transaction,
            Err(receipt) => return Ok(receipt),
        };

        live_user(transaction.as_mut(), input.delegator_id).await?;
        live_user(transaction.as_mut(), input.delegatee_id).await?;

        let delegation = Delegation {
            id: GrantId::new(),
            delegator_id: input.delegator_id,
            delegatee_id: input.delegatee_id,
            scope: DelegationScope::parse(&input.scope_tag)?,
            resource_type: input.resource_type,
            resource_ids: input.resource_ids,
            window: ValidityWindow::new(input.valid_from, input.valid_until)?,
            granted_by: context.actor_id(),
        };

        let attempted = context.entry(
            AuditAction::DelegationCreated,
            "delegation",
            delegation.id.as_uuid(),
            json!({
                "delegator_id": delegation.delegator_id,
                "delegatee_id": delegation.delegatee_id,
                "scope": delegation.scope.tag(),
                "resource_type": delegation.resource_type,
                "resource_ids": delegation.resource_ids,
                "valid_from": delegation.window.granted_at,
                "valid_until": delegation.window.expires_at,
            }),
        );
        transaction = self
            .authorize(
                transaction,
                context,
                GovernanceTarget::Delegation {
                    on_own_behalf: context.actor_id() == delegation.delegator_id,
                },
                GovernanceOperation::Grant,
                attempted.clone(),
            )
            .await?;

        claim_key(transaction.as_mut(), &delegation.key(), context).await?;
        transaction.insert_delegation(&delegation).await?;
        self.finish(transaction, attempted, delegation.id.as_uuid())
            .await
    }

    /// Revokes a delegation identified by its delegator, delegatee and scope tag.
    pub async fn revoke_delegation(
        &self,
        context: &MutationContext,
        delegator_id: UserId,
        delegatee_id: UserId,
        scope_tag: &str,
    ) -> AppResult<MutationReceipt> {
        let mut transaction = match self.begin(context).await? {
            Ok(transaction) => transaction,
            Err(receipt) => return Ok(receipt),
        };

        let key = AssignmentKey::Delegation {
            delegator_id,
            delegatee_id,
            scope_tag: DelegationScope::parse(scope_tag)?.tag(),
        };
        let existing = unrevoked(transaction.as_mut(), &key).await?;

        let attempted = context.entry(
            AuditAction::DelegationRevoked,
            "delegation",
            existing.id.as_uuid(),
            json!({
                "delegator_id": delegator_id,
                "delegatee_id": delegatee_id,
                "scope": scope_tag,
            }),
        );
        transaction = self
            .authorize(
                transaction,
                context,
                GovernanceTarget::Delegation {
                    on_own_behalf: context.actor_id() == delegator_id,
                },
                GovernanceOperation::Revoke,
                attempted.clone(),
            )
            .await?;

        revoke(transaction.as_mut(), &key, &existing, context).await?;
        self.finish(transaction, attempted, existing.id.as_uuid())
            .await
    }
}
