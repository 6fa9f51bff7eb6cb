use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::info;

use warden_application::AssignmentTransaction;
use warden_core::{AppError, AppResult, NonEmptyString};
use warden_domain::{
    AssignmentKey, AuditAction, AuditEntry, AuditRecord, AuditRecordId, Capability,
    GOVERNANCE_RESOURCE_TYPE, GovernanceTier, GrantId, Permission, PermissionId, PermissionKey,
    ROOT_ROLE_NAME, Role, RoleGrant, RoleId, User, UserId, UserRoleGrant, ValidityWindow,
};

/// Result of seeding the protected root role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RootSeed {
    /// User holding the root role.
    pub user_id: UserId,
    /// The root role.
    pub role_id: RoleId,
    /// Rows written by this run. Zero when everything was already in place.
    pub rows_written: usize,
}

/// Ensures the protected root role exists, carries every governance
/// capability and is held by the user bound to `external_ref`.
///
/// Runs outside governance. Re-running it is a no-op once everything is in place.
pub async fn seed_root_role(
    transaction: &mut dyn AssignmentTransaction,
    external_ref: &str,
    at: DateTime<Utc>,
) -> AppResult<RootSeed> {
    let external_ref = NonEmptyString::new(external_ref)?;
    let mut rows_written = 0;

    let user = match transaction
        .find_user_by_external_ref(external_ref.as_str())
        .await?
    {
        Some(user) => user,
        None => {
            let user = User::new(UserId::new(), external_ref.clone(), at);
            transaction.insert_user(&user).await?;
            rows_written += 1;
            user
        }
    };
    let user_id = user.id();

    let role = match transaction.find_role_by_name(ROOT_ROLE_NAME).await? {
        Some(role) if role.tier != GovernanceTier::Protected => {
            return Err(AppError::InvariantViolation(format!(
                "role '{ROOT_ROLE_NAME}' exists with tier '{}'",
                role.tier.as_str()
            )));
        }
        Some(role) => role,
        None => {
            let role = Role {
                id: RoleId::new(),
                name: NonEmptyString::new(ROOT_ROLE_NAME)?,
                tier: GovernanceTier::Protected,
                created_at: at,
                created_by: user_id,
                deletion: None,
            };
            transaction.insert_role(&role).await?;
            rows_written += 1;
            role
        }
    };

    for capability in Capability::all() {
        let permission_id =
            ensure_capability_permission(transaction, *capability, user_id, at, &mut rows_written)
                .await?;
        let key = AssignmentKey::RolePermission {
            role_id: role.id,
            permission_id,
        };
        if transaction.find_unrevoked(&key).await?.is_none() {
            transaction
                .insert_role_grant(&RoleGrant {
                    id: GrantId::new(),
                    role_id: role.id,
                    permission_id,
                    window: ValidityWindow::new(at, None)?,
                    granted_by: user_id,
                })
                .await?;
            rows_written += 1;
        }
    }

    let holder_key = AssignmentKey::UserRole {
        user_id,
        role_id: role.id,
        scope_id: None,
    };
    if transaction.find_unrevoked(&holder_key).await?.is_none() {
        transaction
            .insert_user_role_grant(&UserRoleGrant {
                id: GrantId::new(),
                user_id,
                role_id: role.id,
                scope_id: None,
                window: ValidityWindow::new(at, None)?,
                granted_by: user_id,
            })
            .await?;
        rows_written += 1;
    }

    if rows_written > 0 {
        let entry = AuditEntry::granted(
            at,
            None,
            AuditAction::RootSeeded,
            "role",
            role.id.to_string(),
        )
        .with_context(json!({
            "target_id": role.id,
            "user_id": user_id,
            "subject": external_ref.as_str(),
            "rows_written": rows_written,
        }));
        transaction
            .append_audit(&AuditRecord {
                id: AuditRecordId::new(),
                entry,
            })
            .await?;
    }

    info!(%user_id, role_id = %role.id, rows_written, "root role seeded");

    Ok(RootSeed {
        user_id,
        role_id: role.id,
        rows_written,
    })
}

async fn ensure_capability_permission(
    transaction: &mut dyn AssignmentTransaction,
    capability: Capability,
    seeded_by: UserId,
    at: DateTime<Utc>,
    rows_written: &mut usize,
) -> AppResult<PermissionId> {
    let key = PermissionKey::new(GOVERNANCE_RESOURCE_TYPE, capability.action())?;
    if let Some(permission) = transaction.find_permission_by_key(&key).await? {
        return Ok(permission.id);
    }

    let permission = Permission {
        id: PermissionId::new(),
        key,
        tier: GovernanceTier::Elevated,
        created_at: at,
        created_by: seeded_by,
        deletion: None,
    };
    transaction.insert_permission(&permission).await?;
    *rows_written += 1;
    Ok(permission.id)
}
