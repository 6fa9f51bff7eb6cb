use super::*;

use rows::convert;

#[async_trait]
impl AssignmentReader for PostgresSession {
    async fn find_user(&mut self, user_id: UserId) -> AppResult<Option<User>> {
        sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, external_ref, created_at, deleted_at, deleted_by
            FROM authz_users
            WHERE id = $1
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&mut *self.transaction)
        .await
        .map_err(|error| map_store_error(error, "find user"))?
        .map(UserRow::into_domain)
        .transpose()
    }

    async fn find_user_by_external_ref(&mut self, external_ref: &str) -> AppResult<Option<User>> {
        sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, external_ref, created_at, deleted_at, deleted_by
            FROM authz_users
            WHERE external_ref = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(external_ref)
        .fetch_optional(&mut *self.transaction)
        .await
        .map_err(|error| map_store_error(error, "find user by external reference"))?
        .map(UserRow::into_domain)
        .transpose()
    }

    async fn find_role(&mut self, role_id: RoleId) -> AppResult<Option<Role>> {
        sqlx::query_as::<_, RoleRow>(
            r#"
            SELECT id, name, tier, created_at, created_by, deleted_at, deleted_by
            FROM authz_roles
            WHERE id = $1
            "#,
        )
        .bind(role_id.as_uuid())
        .fetch_optional(&mut *self.transaction)
        .await
        .map_err(|error| map_store_error(error, "find role"))?
        .map(RoleRow::into_domain)
        .transpose()
    }

    async fn find_role_by_name(&mut self, name: &str) -> AppResult<Option<Role>> {
        sqlx::query_as::<_, RoleRow>(
            r#"
            SELECT id, name, tier, created_at, created_by, deleted_at, deleted_by
            FROM authz_roles
            WHERE name = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(name)
        .fetch_optional(&mut *self.transaction)
        .await
        .map_err(|error| map_store_error(error, "find role by name"))?
        .map(RoleRow::into_domain)
        .transpose()
    }

    async fn find_permission(
        &mut self,
        permission_id: PermissionId,
    ) -> AppResult<Option<Permission>> {
        sqlx::query_as::<_, PermissionRow>(
            r#"
            SELECT id, resource_type, action, tier, created_at, created_by, deleted_at, deleted_by
            FROM authz_permissions
            WHERE id = $1
            "#,
        )
        .bind(permission_id.as_uuid())
        .fetch_optional(&mut *self.transaction)
        .await
        .map_err(|error| map_store_error(error, "find permission"))?
        .map(PermissionRow::into_domain)
        .transpose()
    }

    async fn find_permission_by_key(
        &mut self,
        key: &PermissionKey,
    ) -> AppResult<Option<Permission>> {
        sqlx::query_as::<_, PermissionRow>(
            r#"
            SELECT id, resource_type, action, tier, created_at, created_by, deleted_at, deleted_by
            FROM authz_permissions
            WHERE resource_type = $1 AND action = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(key.resource_type())
        .bind(key.action())
        .fetch_optional(&mut *self.transaction)
        .await
        .map_err(|error| map_store_error(error, "find permission by key"))?
        .map(PermissionRow::into_domain)
        .transpose()
    }

    async fn permissions_by_ids(
        &mut self,
        permission_ids: &[PermissionId],
    ) -> AppResult<Vec<Permission>> {
        let ids = permission_ids
            .iter()
            .map(PermissionId::as_uuid)
            .collect::<Vec<_>>();
        let rows = sqlx::query_as::<_, PermissionRow>(
            r#"
            SELECT id, resource_type, action, tier, created_at, created_by, deleted_at, deleted_by
            FROM authz_permissions
            WHERE id = ANY($1)
            "#,
        )
        .bind(ids)
        .fetch_all(&mut *self.transaction)
        .await
        .map_err(|error| map_store_error(error, "load permissions"))?;

        convert(rows, PermissionRow::into_domain)
    }

    async fn role_parent_links(&mut self) -> AppResult<Vec<RoleParentLink>> {
        let rows = sqlx::query_as::<_, RoleParentLinkRow>(
            r#"
            SELECT id, role_id, parent_role_id, granted_by,
                granted_at, expires_at, revoked_at, revoked_by
            FROM authz_role_parent_links
            ORDER BY granted_at, id
            "#,
        )
        .fetch_all(&mut *self.transaction)
        .await
        .map_err(|error| map_store_error(error, "list role parent links"))?;

        convert(rows, RoleParentLinkRow::into_domain)
    }

    async fn role_grants_for_roles(&mut self, role_ids: &[RoleId]) -> AppResult<Vec<RoleGrant>> {
        let ids = role_ids.iter().map(RoleId::as_uuid).collect::<Vec<_>>();
        let rows = sqlx::query_as::<_, RoleGrantRow>(
            r#"
            SELECT id, role_id, permission_id, granted_by,
                granted_at, expires_at, revoked_at, revoked_by
            FROM authz_role_grants
            WHERE role_id = ANY($1)
            ORDER BY granted_at, id
            "#,
        )
        .bind(ids)
        .fetch_all(&mut *self.transaction)
        .await
        .map_err(|error| map_store_error(error, "list role grants"))?;

        convert(rows, RoleGrantRow::into_domain)
    }

    async fn user_role_grants_for_user(
        &mut self,
        user_id: UserId,
    ) -> AppResult<Vec<UserRoleGrant>> {
        let rows = sqlx::query_as::<_, UserRoleGrantRow>(
            r#"
            SELECT id, user_id, role_id, scope_id, granted_by,
                granted_at, expires_at, revoked_at, revoked_by
            FROM authz_user_role_grants
            WHERE user_id = $1
            ORDER BY granted_at, id
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_all(&mut *self.transaction)
        .await
        .map_err(|error| map_store_error(error, "list user role grants"))?;

        convert(rows, UserRoleGrantRow::into_domain)
    }

    async fn resource_grants_for_user(
        &mut self,
        user_id: UserId,
    ) -> AppResult<Vec<ResourceGrant>> {
        let rows = sqlx::query_as::<_, ResourceGrantRow>(
            r#"
            SELECT id, user_id, resource_type, resource_id, action, granted_by, reason,
                granted_at, expires_at, revoked_at, revoked_by
            FROM authz_resource_grants
            WHERE user_id = $1
            ORDER BY granted_at, id
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_all(&mut *self.transaction)
        .await
        .map_err(|error| map_store_error(error, "list resource grants"))?;

        convert(rows, ResourceGrantRow::into_domain)
    }

    async fn delegations_involving(&mut self, user_id: UserId) -> AppResult<Vec<Delegation>> {
        let rows = sqlx::query_as::<_, DelegationRow>(
            r#"
            SELECT id, delegator_id, delegatee_id, scope_tag, resource_type, resource_ids,
                granted_by, granted_at, expires_at, revoked_at, revoked_by
            FROM authz_delegations
            WHERE delegator_id = $1 OR delegatee_id = $1
            ORDER BY granted_at, id
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_all(&mut *self.transaction)
        .await
        .map_err(|error| map_store_error(error, "list delegations"))?;

        convert(rows, DelegationRow::into_domain)
    }

    async fn find_unrevoked(
        &mut self,
        key: &AssignmentKey,
    ) -> AppResult<Option<UnrevokedAssignment>> {
        let query = match key {
            AssignmentKey::RoleParent { role_id } => sqlx::query_as::<_, UnrevokedRow>(
                r#"
                SELECT id, granted_at, expires_at, revoked_at, revoked_by
                FROM authz_role_parent_links
                WHERE role_id = $1 AND revoked_at IS NULL
                "#,
            )
            .bind(role_id.as_uuid()),
            AssignmentKey::RolePermission {
                role_id,
                permission_id,
            } => sqlx::query_as::<_, UnrevokedRow>(
                r#"
                SELECT id, granted_at, expires_at, revoked_at, revoked_by
                FROM authz_role_grants
                WHERE role_id = $1 AND permission_id = $2 AND revoked_at IS NULL
                "#,
            )
            .bind(role_id.as_uuid())
            .bind(permission_id.as_uuid()),
            AssignmentKey::UserRole {
                user_id,
                role_id,
                scope_id,
            } => sqlx::query_as::<_, UnrevokedRow>(
                r#"
                SELECT id, granted_at, expires_at, revoked_at, revoked_by
                FROM authz_user_role_grants
                WHERE user_id = $1
                    AND role_id = $2
                    AND scope_id IS NOT DISTINCT FROM $3
                    AND revoked_at IS NULL
                "#,
            )
            .bind(user_id.as_uuid())
            .bind(role_id.as_uuid())
            .bind(scope_id.clone()),
            AssignmentKey::Resource {
                user_id,
                resource_type,
                resource_id,
                action,
            } => sqlx::query_as::<_, UnrevokedRow>(
                r#"
                SELECT id, granted_at, expires_at, revoked_at, revoked_by
                FROM authz_resource_grants
                WHERE user_id = $1
                    AND resource_type = $2
                    AND resource_id = $3
                    AND action = $4
                    AND revoked_at IS NULL
                "#,
            )
            .bind(user_id.as_uuid())
            .bind(resource_type.clone())
            .bind(resource_id.clone())
            .bind(action.clone()),
            AssignmentKey::Delegation {
                delegator_id,
                delegatee_id,
                scope_tag,
            } => sqlx::query_as::<_, UnrevokedRow>(
                r#"
                SELECT id, granted_at, expires_at, revoked_at, revoked_by
                FROM authz_delegations
                WHERE delegator_id = $1
                    AND delegatee_id = $2
                    AND scope_tag = $3
                    AND revoked_at IS NULL
                "#,
            )
            .bind(delegator_id.as_uuid())
            .bind(delegatee_id.as_uuid())
            .bind(scope_tag.clone()),
        };

        query
            .fetch_optional(&mut *self.transaction)
            .await
            .map_err(|error| map_store_error(error, "find unrevoked assignment"))?
            .map(UnrevokedRow::into_domain)
            .transpose()
    }

    async fn find_audit_by_idempotency_key(
        &mut self,
        idempotency_key: &str,
    ) -> AppResult<Option<AuditRecord>> {
        sqlx::query_as::<_, AuditRecordRow>(
            r#"
            SELECT id, recorded_at, actor_id, action, resource_type, resource_id,
                decision, reason, context, idempotency_key
            FROM authz_audit_records
            WHERE idempotency_key = $1
            "#,
        )
        .bind(idempotency_key)
        .fetch_optional(&mut *self.transaction)
        .await
        .map_err(|error| map_store_error(error, "find audit record by idempotency key"))?
        .map(AuditRecordRow::into_domain)
        .transpose()
    }

    async fn list_audit_records(&mut self, query: &AuditQuery) -> AppResult<Vec<AuditRecord>> {
        let rows = sqlx::query_as::<_, AuditRecordRow>(
            r#"
            SELECT id, recorded_at, actor_id, action, resource_type, resource_id,
                decision, reason, context, idempotency_key
            FROM authz_audit_records
            WHERE ($1::uuid IS NULL OR actor_id = $1)
                AND ($2::text IS NULL OR action = $2)
                AND ($3::timestamptz IS NULL OR recorded_at >= $3)
                AND ($4::timestamptz IS NULL OR recorded_at < $4)
            ORDER BY sequence DESC
            LIMIT $5
            "#,
        )
        .bind(query.actor.map(|actor| actor.as_uuid()))
        .bind(query.action.map(|action| action.as_str()))
        .bind(query.from)
        .bind(query.until)
        .bind(i64::try_from(query.limit).unwrap_or(i64::MAX))
        .fetch_all(&mut *self.transaction)
        .await
        .map_err(|error| map_store_error(error, "list audit records"))?;

        convert(rows, AuditRecordRow::into_domain)
    }
}
