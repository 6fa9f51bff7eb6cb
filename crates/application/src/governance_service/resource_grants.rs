use super::*;

use warden_core::NonEmptyString;
use warden_domain::{
    GOVERNANCE_RESOURCE_TYPE, GovernanceTier, GrantId, PermissionKey, ResourceGrant,
    TemporalAssignment, ValidityWindow,
};

use crate::lookups::live_user;

/// Fine-grained grant request on one resource instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceGrantInput {
    /// Receiving user.
    pub user_id: UserId,
    /// Resource type.
    pub resource_type: String,
    /// Resource instance id.
    pub resource_id: String,
    /// Action.
    pub action: String,
    /// Optional expiry.
    pub expires_at: Option<DateTime<Utc>>,
    /// Justification kept with the grant.
    pub reason: Option<String>,
}

/// Resource grants are basic-tier, except grants on governance resources.
fn resource_grant_tier(resource_type: &str) -> GovernanceTier {
    if resource_type == GOVERNANCE_RESOURCE_TYPE {
        GovernanceTier::Elevated
    } else {
        GovernanceTier::Basic
    }
}

impl GovernanceService {
    /// Grants one action on one resource instance to a user.
    pub async fn grant_resource_access(
        &self,
        context: &MutationContext,
        input: ResourceGrantInput,
    ) -> AppResult<MutationReceipt> {
        let mut transaction = match self.begin(context).await? {
            Ok(transaction) => transaction,
            Err(receipt) => return Ok(receipt),
        };

        let key = PermissionKey::new(input.resource_type, input.action)?;
        let resource_id = NonEmptyString::new(input.resource_id)?;
        live_user(transaction.as_mut(), input.user_id).await?;

        let grant = ResourceGrant {
            id: GrantId::new(),
            user_id: input.user_id,
            resource_type: key.resource_type().to_owned(),
            resource_id: resource_id.into(),
            action: key.action().to_owned(),
            window: ValidityWindow::new(context.at, input.expires_at)?,
            granted_by: context.actor_id(),
            reason: input.reason,
        };

        let attempted = context.entry(
            AuditAction::ResourceAccessGranted,
            "resource_grant",
            grant.id.as_uuid(),
            json!({
                "user_id": grant.user_id,
                "resource_type": grant.resource_type,
                "resource_id": grant.resource_id,
                "action": grant.action,
                "expires_at": grant.window.expires_at,
                "reason": grant.reason,
            }),
        );
        transaction = self
            .authorize(
                transaction,
                context,
                GovernanceTarget::Assignment(resource_grant_tier(&grant.resource_type)),
                GovernanceOperation::Grant,
                attempted.clone(),
            )
            .await?;

        claim_key(transaction.as_mut(), &grant.key(), context).await?;
        transaction.insert_resource_grant(&grant).await?;
        self.finish(transaction, attempted, grant.id.as_uuid()).await
    }

    /// Revokes a user's grant on one resource instance.
    pub async fn revoke_resource_access(
        &self,
        context: &MutationContext,
        user_id: UserId,
        resource_type: &str,
        resource_id: &str,
        action: &str,
    ) -> AppResult<MutationReceipt> {
        let mut transaction = match self.begin(context).await? {
            Ok(transaction) => transaction,
            Err(receipt) => return Ok(receipt),
        };

        let permission_key = PermissionKey::new(resource_type, action)?;
        let resource_id = String::from(NonEmptyString::new(resource_id)?);
        let key = AssignmentKey::Resource {
            user_id,
            resource_type: permission_key.resource_type().to_owned(),
            resource_id: resource_id.clone(),
            action: permission_key.action().to_owned(),
        };
        let existing = unrevoked(transaction.as_mut(), &key).await?;

        let attempted = context.entry(
            AuditAction::ResourceAccessRevoked,
            "resource_grant",
            existing.id.as_uuid(),
            json!({
                "user_id": user_id,
                "resource_type": permission_key.resource_type(),
                "resource_id": resource_id,
                "action": permission_key.action(),
            }),
        );
        transaction = self
            .authorize(
                transaction,
                context,
                GovernanceTarget::Assignment(resource_grant_tier(
                    permission_key.resource_type(),
                )),
                GovernanceOperation::Revoke,
                attempted.clone(),
            )
            .await?;

        revoke(transaction.as_mut(), &key, &existing, context).await?;
        self.finish(transaction, attempted, existing.id.as_uuid())
            .await
    }
}
