use super::*;

use warden_core::NonEmptyString;
use warden_domain::{
    GOVERNANCE_RESOURCE_TYPE, GovernanceTier, GrantId, Permission, PermissionId, PermissionKey,
    ROOT_ROLE_NAME, Role, RoleHierarchy, RoleId, RoleParentLink, TemporalAssignment,
    ValidityWindow,
};

use crate::lookups::live_role;

impl GovernanceService {
    /// Creates a role definition. Protected roles are only ever seeded out-of-band.
    pub async fn create_role(
        &self,
        context: &MutationContext,
        name: &str,
        tier: GovernanceTier,
    ) -> AppResult<MutationReceipt> {
        let mut transaction = match self.begin(context).await? {
            Ok(transaction) => transaction,
            Err(receipt) => return Ok(receipt),
        };

        let name = NonEmptyString::new(name)?;
        let role = Role {
            id: RoleId::new(),
            name,
            tier,
            created_at: context.at,
            created_by: context.actor_id(),
            deletion: None,
        };
        let target_tier = if role.name.as_str() == ROOT_ROLE_NAME {
            GovernanceTier::Protected
        } else {
            tier
        };

        let attempted = context.entry(
            AuditAction::RoleCreated,
            "role",
            role.id.as_uuid(),
            json!({ "name": role.name.as_str(), "tier": tier.as_str() }),
        );
        transaction = self
            .authorize(
                transaction,
                context,
                GovernanceTarget::Definition(Some(target_tier)),
                GovernanceOperation::Define,
                attempted.clone(),
            )
            .await?;

        if transaction
            .find_role_by_name(role.name.as_str())
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(format!(
                "role '{}' already exists",
                role.name
            )));
        }

        transaction.insert_role(&role).await?;
        self.finish(transaction, attempted, role.id.as_uuid()).await
    }

    /// Creates a permission definition from a `resource-type:action` key.
    ///
    /// Governance capability permissions are never below the elevated tier.
    pub async fn create_permission(
        &self,
        context: &MutationContext,
        key: &str,
        tier: GovernanceTier,
    ) -> AppResult<MutationReceipt> {
        let mut transaction = match self.begin(context).await? {
            Ok(transaction) => transaction,
            Err(receipt) => return Ok(receipt),
        };

        let key = PermissionKey::parse(key)?;
        let tier = if key.resource_type() == GOVERNANCE_RESOURCE_TYPE {
            tier.strictest(GovernanceTier::Elevated)
        } else {
            tier
        };
        let permission = Permission {
            id: PermissionId::new(),
            key,
            tier,
            created_at: context.at,
            created_by: context.actor_id(),
            deletion: None,
        };

        let attempted = context.entry(
            AuditAction::PermissionCreated,
            "permission",
            permission.id.as_uuid(),
            json!({ "key": permission.key.to_string(), "tier": tier.as_str() }),
        );
        transaction = self
            .authorize(
                transaction,
                context,
                GovernanceTarget::Definition(Some(tier)),
                GovernanceOperation::Define,
                attempted.clone(),
            )
            .await?;

        if transaction
            .find_permission_by_key(&permission.key)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(format!(
                "permission '{}' already exists",
                permission.key
            )));
        }

        transaction.insert_permission(&permission).await?;
        self.finish(transaction, attempted, permission.id.as_uuid())
            .await
    }

    /// Makes `parent_role_id` the parent of `role_id`, replacing any current parent.
    ///
    /// A parent that would close a cycle is denied, audited and surfaced as an
    /// invariant violation.
    pub async fn set_role_parent(
        &self,
        context: &MutationContext,
        role_id: RoleId,
        parent_role_id: RoleId,
    ) -> AppResult<MutationReceipt> {
        let mut transaction = match self.begin(context).await? {
            Ok(transaction) => transaction,
            Err(receipt) => return Ok(receipt),
        };

        let role = live_role(transaction.as_mut(), role_id).await?;
        let parent = live_role(transaction.as_mut(), parent_role_id).await?;
        let link = RoleParentLink {
            id: GrantId::new(),
            role_id,
            parent_role_id,
            window: ValidityWindow::new(context.at, None)?,
            granted_by: context.actor_id(),
        };

        let attempted = context.entry(
            AuditAction::RoleParentSet,
            "role_parent_link",
            link.id.as_uuid(),
            json!({ "role_id": role_id, "parent_role_id": parent_role_id }),
        );
        transaction = self
            .authorize(
                transaction,
                context,
                GovernanceTarget::Composition(role.tier.strictest(parent.tier)),
                GovernanceOperation::Define,
                attempted.clone(),
            )
            .await?;

        if parent.tier > role.tier {
            return Err(AppError::Validation(format!(
                "{} role '{}' cannot inherit from {} role '{}'",
                role.tier.as_str(),
                role.name,
                parent.tier.as_str(),
                parent.name
            )));
        }

        let links = transaction.role_parent_links().await?;
        if RoleHierarchy::unrevoked(&links)?.would_create_cycle(role_id, parent_role_id) {
            drop(transaction);
            return Err(self
                .deny(DenialReason::CyclicRoleParent, attempted)
                .await);
        }

        let key = link.key();
        if let Some(existing) = transaction.find_unrevoked(&key).await? {
            revoke(transaction.as_mut(), &key, &existing, context).await?;
        }

        transaction.insert_role_parent_link(&link).await?;
        self.finish(transaction, attempted, link.id.as_uuid()).await
    }

    /// Detaches a role from its current parent.
    pub async fn clear_role_parent(
        &self,
        context: &MutationContext,
        role_id: RoleId,
    ) -> AppResult<MutationReceipt> {
        let mut transaction = match self.begin(context).await? {
            Ok(transaction) => transaction,
            Err(receipt) => return Ok(receipt),
        };

        let role = live_role(transaction.as_mut(), role_id).await?;
        let key = AssignmentKey::RoleParent { role_id };
        let existing = unrevoked(transaction.as_mut(), &key).await?;
        let parent_tier = transaction
            .role_parent_links()
            .await?
            .into_iter()
            .find(|link| link.id == existing.id)
            .map(|link| link.parent_role_id);
        let parent_tier = match parent_tier {
            Some(parent_role_id) => transaction
                .find_role(parent_role_id)
                .await?
                .map_or(role.tier, |parent| parent.tier),
            None => role.tier,
        };

        let attempted = context.entry(
            AuditAction::RoleParentCleared,
            "role_parent_link",
            existing.id.as_uuid(),
            json!({ "role_id": role_id }),
        );
        transaction = self
            .authorize(
                transaction,
                context,
                GovernanceTarget::Composition(role.tier.strictest(parent_tier)),
                GovernanceOperation::Revoke,
                attempted.clone(),
            )
            .await?;

        revoke(transaction.as_mut(), &key, &existing, context).await?;
        self.finish(transaction, attempted, existing.id.as_uuid())
            .await
    }
}
