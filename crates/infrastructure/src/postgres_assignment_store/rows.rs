use super::*;

#[derive(Debug, FromRow)]
pub(super) struct WindowColumns {
    granted_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    revoked_at: Option<DateTime<Utc>>,
    revoked_by: Option<Uuid>,
}

impl WindowColumns {
    fn into_window(self) -> AppResult<ValidityWindow> {
        let revocation = match (self.revoked_at, self.revoked_by) {
            (Some(revoked_at), Some(revoked_by)) => Some(Revocation {
                revoked_at,
                revoked_by: UserId::from_uuid(revoked_by),
            }),
            (None, None) => None,
            _ => {
                return Err(AppError::InvariantViolation(
                    "stored revocation stamp is incomplete".to_owned(),
                ));
            }
        };

        Ok(ValidityWindow {
            granted_at: self.granted_at,
            expires_at: self.expires_at,
            revocation,
        })
    }
}

fn soft_deletion(
    deleted_at: Option<DateTime<Utc>>,
    deleted_by: Option<Uuid>,
) -> AppResult<Option<SoftDeletion>> {
    match (deleted_at, deleted_by) {
        (Some(deleted_at), Some(deleted_by)) => Ok(Some(SoftDeletion {
            deleted_at,
            deleted_by: UserId::from_uuid(deleted_by),
        })),
        (None, None) => Ok(None),
        _ => Err(AppError::InvariantViolation(
            "stored deletion stamp is incomplete".to_owned(),
        )),
    }
}

#[derive(Debug, FromRow)]
pub(super) struct UserRow {
    id: Uuid,
    external_ref: String,
    created_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
    deleted_by: Option<Uuid>,
}

impl UserRow {
    pub(super) fn into_domain(self) -> AppResult<User> {
        Ok(User::from_storage(
            UserId::from_uuid(self.id),
            NonEmptyString::new(self.external_ref)?,
            self.created_at,
            soft_deletion(self.deleted_at, self.deleted_by)?,
        ))
    }
}

#[derive(Debug, FromRow)]
pub(super) struct RoleRow {
    id: Uuid,
    name: String,
    tier: String,
    created_at: DateTime<Utc>,
    created_by: Uuid,
    deleted_at: Option<DateTime<Utc>>,
    deleted_by: Option<Uuid>,
}

impl RoleRow {
    pub(super) fn into_domain(self) -> AppResult<Role> {
        Ok(Role {
            id: RoleId::from_uuid(self.id),
            name: NonEmptyString::new(self.name)?,
            tier: stored::<GovernanceTier>(&self.tier, "role tier")?,
            created_at: self.created_at,
            created_by: UserId::from_uuid(self.created_by),
            deletion: soft_deletion(self.deleted_at, self.deleted_by)?,
        })
    }
}

#[derive(Debug, FromRow)]
pub(super) struct PermissionRow {
    id: Uuid,
    resource_type: String,
    action: String,
    tier: String,
    created_at: DateTime<Utc>,
    created_by: Uuid,
    deleted_at: Option<DateTime<Utc>>,
    deleted_by: Option<Uuid>,
}

impl PermissionRow {
    pub(super) fn into_domain(self) -> AppResult<Permission> {
        Ok(Permission {
            id: PermissionId::from_uuid(self.id),
            key: PermissionKey::new(self.resource_type, self.action)?,
            tier: stored::<GovernanceTier>(&self.tier, "permission tier")?,
            created_at: self.created_at,
            created_by: UserId::from_uuid(self.created_by),
            deletion: soft_deletion(self.deleted_at, self.deleted_by)?,
        })
    }
}

#[derive(Debug, FromRow)]
pub(super) struct RoleParentLinkRow {
    id: Uuid,
    role_id: Uuid,
    parent_role_id: Uuid,
    granted_by: Uuid,
    #[sqlx(flatten)]
    window: WindowColumns,
}

impl RoleParentLinkRow {
    pub(super) fn into_domain(self) -> AppResult<RoleParentLink> {
        Ok(RoleParentLink {
            id: GrantId::from_uuid(self.id),
            role_id: RoleId::from_uuid(self.role_id),
            parent_role_id: RoleId::from_uuid(self.parent_role_id),
            window: self.window.into_window()?,
            granted_by: UserId::from_uuid(self.granted_by),
        })
    }
}

#[derive(Debug, FromRow)]
pub(super) struct RoleGrantRow {
    id: Uuid,
    role_id: Uuid,
    permission_id: Uuid,
    granted_by: Uuid,
    #[sqlx(flatten)]
    window: WindowColumns,
}

impl RoleGrantRow {
    pub(super) fn into_domain(self) -> AppResult<RoleGrant> {
        Ok(RoleGrant {
            id: GrantId::from_uuid(self.id),
            role_id: RoleId::from_uuid(self.role_id),
            permission_id: PermissionId::from_uuid(self.permission_id),
            window: self.window.into_window()?,
            granted_by: UserId::from_uuid(self.granted_by),
        })
    }
}

#[derive(Debug, FromRow)]
pub(super) struct UserRoleGrantRow {
    id: Uuid,
    user_id: Uuid,
    role_id: Uuid,
    scope_id: Option<String>,
    granted_by: Uuid,
    #[sqlx(flatten)]
    window: WindowColumns,
}

impl UserRoleGrantRow {
    pub(super) fn into_domain(self) -> AppResult<UserRoleGrant> {
        Ok(UserRoleGrant {
            id: GrantId::from_uuid(self.id),
            user_id: UserId::from_uuid(self.user_id),
            role_id: RoleId::from_uuid(self.role_id),
            scope_id: self.scope_id,
            window: self.window.into_window()?,
            granted_by: UserId::from_uuid(self.granted_by),
        })
    }
}

#[derive(Debug, FromRow)]
pub(super) struct ResourceGrantRow {
    id: Uuid,
    user_id: Uuid,
    resource_type: String,
    resource_id: String,
    action: String,
    granted_by: Uuid,
    reason: Option<String>,
    #[sqlx(flatten)]
    window: WindowColumns,
}

impl ResourceGrantRow {
    pub(super) fn into_domain(self) -> AppResult<ResourceGrant> {
        Ok(ResourceGrant {
            id: GrantId::from_uuid(self.id),
            user_id: UserId::from_uuid(self.user_id),
            resource_type: self.resource_type,
            resource_id: self.resource_id,
            action: self.action,
            window: self.window.into_window()?,
            granted_by: UserId::from_uuid(self.granted_by),
            reason: self.reason,
        })
    }
}

#[derive(Debug, FromRow)]
pub(super) struct DelegationRow {
    id: Uuid,
    delegator_id: Uuid,
    delegatee_id: Uuid,
    scope_tag: String,
    resource_type: Option<String>,
    resource_ids: Option<Vec<String>>,
    granted_by: Uuid,
    #[sqlx(flatten)]
    window: WindowColumns,
}

impl DelegationRow {
    pub(super) fn into_domain(self) -> AppResult<Delegation> {
        let scope = DelegationScope::parse(&self.scope_tag).map_err(|error| {
            AppError::InvariantViolation(format!("stored delegation scope is invalid: {error}"))
        })?;

        Ok(Delegation {
            id: GrantId::from_uuid(self.id),
            delegator_id: UserId::from_uuid(self.delegator_id),
            delegatee_id: UserId::from_uuid(self.delegatee_id),
            scope,
            resource_type: self.resource_type,
            resource_ids: self.resource_ids,
            window: self.window.into_window()?,
            granted_by: UserId::from_uuid(self.granted_by),
        })
    }
}

#[derive(Debug, FromRow)]
pub(super) struct UnrevokedRow {
    id: Uuid,
    #[sqlx(flatten)]
    window: WindowColumns,
}

impl UnrevokedRow {
    pub(super) fn into_domain(self) -> AppResult<UnrevokedAssignment> {
        Ok(UnrevokedAssignment {
            id: GrantId::from_uuid(self.id),
            window: self.window.into_window()?,
        })
    }
}

#[derive(Debug, FromRow)]
pub(super) struct AuditRecordRow {
    id: Uuid,
    recorded_at: DateTime<Utc>,
    actor_id: Option<Uuid>,
    action: String,
    resource_type: String,
    resource_id: String,
    decision: String,
    reason: Option<String>,
    context: Value,
    idempotency_key: Option<String>,
}

impl AuditRecordRow {
    pub(super) fn into_domain(self) -> AppResult<AuditRecord> {
        Ok(AuditRecord {
            id: AuditRecordId::from_uuid(self.id),
            entry: AuditEntry {
                recorded_at: self.recorded_at,
                actor: self.actor_id.map(UserId::from_uuid),
                action: stored::<AuditAction>(&self.action, "audit action")?,
                resource_type: self.resource_type,
                resource_id: self.resource_id,
                decision: stored::<Decision>(&self.decision, "audit decision")?,
                reason: self.reason,
                context: self.context,
                idempotency_key: self.idempotency_key,
            },
        })
    }
}

/// Converts fetched rows, failing on the first corrupted one.
pub(super) fn convert<R, T>(
    rows: Vec<R>,
    into_domain: impl Fn(R) -> AppResult<T>,
) -> AppResult<Vec<T>> {
    rows.into_iter().map(into_domain).collect()
}
