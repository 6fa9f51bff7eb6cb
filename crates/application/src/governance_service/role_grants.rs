use super::*;

use warden_domain::{
    GrantId, PermissionId, RoleGrant, RoleId, TemporalAssignment, UserRoleGrant, ValidityWindow,
};

use crate::lookups::{live_permission, live_role, live_user};

impl GovernanceService {
    /// Attaches a permission to a role.
    pub async fn grant_permission_to_role(
        &self,
        context: &MutationContext,
        role_id: RoleId,
        permission_id: PermissionId,
    ) -> AppResult<MutationReceipt> {
        let mut transaction = match self.begin(context).await? {
            Ok(transaction) => transaction,
            Err(receipt) => return Ok(receipt),
        };

        let role = live_role(transaction.as_mut(), role_id).await?;
        let permission = live_permission(transaction.as_mut(), permission_id).await?;
        let grant = RoleGrant {
            id: GrantId::new(),
            role_id,
            permission_id,
            window: ValidityWindow::new(context.at, None)?,
            granted_by: context.actor_id(),
        };

        let attempted = context.entry(
            AuditAction::PermissionGrantedToRole,
            "role_grant",
            grant.id.as_uuid(),
            json!({
                "role_id": role_id,
                "permission": permission.key.to_string(),
            }),
        );
        transaction = self
            .authorize(
                transaction,
                context,
                GovernanceTarget::Composition(role.tier.strictest(permission.tier)),
                GovernanceOperation::Grant,
                attempted.clone(),
            )
            .await?;

        if permission.tier > role.tier {
            return Err(AppError::Validation(format!(
                "{} role '{}' cannot carry {} permission '{}'",
                role.tier.as_str(),
                role.name,
                permission.tier.as_str(),
                permission.key
            )));
        }

        claim_key(transaction.as_mut(), &grant.key(), context).await?;
        transaction.insert_role_grant(&grant).await?;
        self.finish(transaction, attempted, grant.id.as_uuid()).await
    }

    /// Detaches a permission from a role.
    pub async fn revoke_permission_from_role(
        &self,
        context: &MutationContext,
        role_id: RoleId,
        permission_id: PermissionId,
    ) -> AppResult<MutationReceipt> {
        let mut transaction = match self.begin(context).await? {
            Ok(transaction) => transaction,
            Err(receipt) => return Ok(receipt),
        };

        let role = live_role(transaction.as_mut(), role_id).await?;
        let permission = live_permission(transaction.as_mut(), permission_id).await?;
        let key = AssignmentKey::RolePermission {
            role_id,
            permission_id,
        };
        let existing = unrevoked(transaction.as_mut(), &key).await?;

        let attempted = context.entry(
            AuditAction::PermissionRevokedFromRole,
            "role_grant",
            existing.id.as_uuid(),
            json!({
                "role_id": role_id,
                "permission": permission.key.to_string(),
            }),
        );
        transaction = self
            .authorize(
                transaction,
                context,
                GovernanceTarget::Composition(role.tier.strictest(permission.tier)),
                GovernanceOperation::Revoke,
                attempted.clone(),
            )
            .await?;

        revoke(transaction.as_mut(), &key, &existing, context).await?;
        self.finish(transaction, attempted, existing.id.as_uuid())
            .await
    }

    /// Grants a role to a user, optionally scoped to one resource instance and with an expiry.
    pub async fn grant_role_to_user(
        &self,
        context: &MutationContext,
        user_id: UserId,
        role_id: RoleId,
        scope_id: Option<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> AppResult<MutationReceipt> {
        let mut transaction = match self.begin(context).await? {
            Ok(transaction) => transaction,
            Err(receipt) => return Ok(receipt),
        };

        live_user(transaction.as_mut(), user_id).await?;
        let role = live_role(transaction.as_mut(), role_id).await?;
        let grant = UserRoleGrant {
            id: GrantId::new(),
            user_id,
            role_id,
            scope_id: normalize_scope(scope_id)?,
            window: ValidityWindow::new(context.at, expires_at)?,
            granted_by: context.actor_id(),
        };

        let attempted = context.entry(
            AuditAction::RoleGrantedToUser,
            "user_role_grant",
            grant.id.as_uuid(),
            json!({
                "user_id": user_id,
                "role": role.name.as_str(),
                "scope_id": grant.scope_id,
                "expires_at": expires_at,
            }),
        );
        transaction = self
            .authorize(
                transaction,
                context,
                GovernanceTarget::Assignment(role.tier),
                GovernanceOperation::Grant,
                attempted.clone(),
            )
            .await?;

        claim_key(transaction.as_mut(), &grant.key(), context).await?;
        transaction.insert_user_role_grant(&grant).await?;
        self.finish(transaction, attempted, grant.id.as_uuid()).await
    }

    /// Revokes a user's role grant.
    pub async fn revoke_role_from_user(
        &self,
        context: &MutationContext,
        user_id: UserId,
        role_id: RoleId,
        scope_id: Option<String>,
    ) -> AppResult<MutationReceipt> {
        let mut transaction = match self.begin(context).await? {
            Ok(transaction) => transaction,
            Err(receipt) => return Ok(receipt),
        };

        let role = transaction
            .find_role(role_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("role '{role_id}' does not exist")))?;
        let key = AssignmentKey::UserRole {
            user_id,
            role_id,
            scope_id: normalize_scope(scope_id)?,
        };
        let existing = unrevoked(transaction.as_mut(), &key).await?;

        let attempted = context.entry(
            AuditAction::RoleRevokedFromUser,
            "user_role_grant",
            existing.id.as_uuid(),
            json!({ "user_id": user_id, "role": role.name.as_str() }),
        );
        transaction = self
            .authorize(
                transaction,
                context,
                GovernanceTarget::Assignment(role.tier),
                GovernanceOperation::Revoke,
                attempted.clone(),
            )
            .await?;

        revoke(transaction.as_mut(), &key, &existing, context).await?;
        self.finish(transaction, attempted, existing.id.as_uuid())
            .await
    }
}

fn normalize_scope(scope_id: Option<String>) -> AppResult<Option<String>> {
    scope_id
        .map(|scope_id| warden_core::NonEmptyString::new(scope_id).map(String::from))
        .transpose()
}
