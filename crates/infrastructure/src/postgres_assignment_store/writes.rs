use super::*;

#[async_trait]
impl AssignmentTransaction for PostgresSession {
    async fn insert_user(&mut self, user: &User) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO authz_users (id, external_ref, created_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(user.id().as_uuid())
        .bind(user.external_ref().as_str())
        .bind(user.created_at())
        .execute(&mut *self.transaction)
        .await
        .map_err(|error| map_store_error(error, "insert user"))?;

        Ok(())
    }

    async fn insert_role(&mut self, role: &Role) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO authz_roles (id, name, tier, created_at, created_by)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(role.id.as_uuid())
        .bind(role.name.as_str())
        .bind(role.tier.as_str())
        .bind(role.created_at)
        .bind(role.created_by.as_uuid())
        .execute(&mut *self.transaction)
        .await
        .map_err(|error| map_store_error(error, "insert role"))?;

        Ok(())
    }

    async fn insert_permission(&mut self, permission: &Permission) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO authz_permissions (id, resource_type, action, tier, created_at, created_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(permission.id.as_uuid())
        .bind(permission.key.resource_type())
        .bind(permission.key.action())
        .bind(permission.tier.as_str())
        .bind(permission.created_at)
        .bind(permission.created_by.as_uuid())
        .execute(&mut *self.transaction)
        .await
        .map_err(|error| map_store_error(error, "insert permission"))?;

        Ok(())
    }

    async fn mark_deleted(
        &mut self,
        kind: EntityKind,
        entity_id: Uuid,
        deletion: SoftDeletion,
    ) -> AppResult<bool> {
        let statement = format!(
            "UPDATE {} SET deleted_at = $2, deleted_by = $3 WHERE id = $1 AND deleted_at IS NULL",
            entity_table(kind)
        );
        let result = sqlx::query(&statement)
            .bind(entity_id)
            .bind(deletion.deleted_at)
            .bind(deletion.deleted_by.as_uuid())
            .execute(&mut *self.transaction)
            .await
            .map_err(|error| map_store_error(error, "soft-delete entity"))?;

        Ok(result.rows_affected() == 1)
    }

    async fn insert_role_parent_link(&mut self, link: &RoleParentLink) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO authz_role_parent_links (
                id, role_id, parent_role_id, granted_at, expires_at, granted_by
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(link.id.as_uuid())
        .bind(link.role_id.as_uuid())
        .bind(link.parent_role_id.as_uuid())
        .bind(link.window.granted_at)
        .bind(link.window.expires_at)
        .bind(link.granted_by.as_uuid())
        .execute(&mut *self.transaction)
        .await
        .map_err(|error| map_store_error(error, "insert role parent link"))?;

        Ok(())
    }

    async fn insert_role_grant(&mut self, grant: &RoleGrant) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO authz_role_grants (
                id, role_id, permission_id, granted_at, expires_at, granted_by
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(grant.id.as_uuid())
        .bind(grant.role_id.as_uuid())
        .bind(grant.permission_id.as_uuid())
        .bind(grant.window.granted_at)
        .bind(grant.window.expires_at)
        .bind(grant.granted_by.as_uuid())
        .execute(&mut *self.transaction)
        .await
        .map_err(|error| map_store_error(error, "insert role grant"))?;

        Ok(())
    }

    async fn insert_user_role_grant(&mut self, grant: &UserRoleGrant) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO authz_user_role_grants (
                id, user_id, role_id, scope_id, granted_at, expires_at, granted_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(grant.id.as_uuid())
        .bind(grant.user_id.as_uuid())
        .bind(grant.role_id.as_uuid())
        .bind(grant.scope_id.as_deref())
        .bind(grant.window.granted_at)
        .bind(grant.window.expires_at)
        .bind(grant.granted_by.as_uuid())
        .execute(&mut *self.transaction)
        .await
        .map_err(|error| map_store_error(error, "insert user role grant"))?;

        Ok(())
    }

    async fn insert_resource_grant(&mut self, grant: &ResourceGrant) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO authz_resource_grants (
                id, user_id, resource_type, resource_id, action,
                granted_at, expires_at, granted_by, reason
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(grant.id.as_uuid())
        .bind(grant.user_id.as_uuid())
        .bind(grant.resource_type.as_str())
        .bind(grant.resource_id.as_str())
        .bind(grant.action.as_str())
        .bind(grant.window.granted_at)
        .bind(grant.window.expires_at)
        .bind(grant.granted_by.as_uuid())
        .bind(grant.reason.as_deref())
        .execute(&mut *self.transaction)
        .await
        .map_err(|error| map_store_error(error, "insert resource grant"))?;

        Ok(())
    }

    async fn insert_delegation(&mut self, delegation: &Delegation) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO authz_delegations (
                id, delegator_id, delegatee_id, scope_tag, resource_type, resource_ids,
                granted_at, expires_at, granted_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(delegation.id.as_uuid())
        .bind(delegation.delegator_id.as_uuid())
        .bind(delegation.delegatee_id.as_uuid())
        .bind(delegation.scope.tag())
        .bind(delegation.resource_type.as_deref())
        .bind(delegation.resource_ids.clone())
        .bind(delegation.window.granted_at)
        .bind(delegation.window.expires_at)
        .bind(delegation.granted_by.as_uuid())
        .execute(&mut *self.transaction)
        .await
        .map_err(|error| map_store_error(error, "insert delegation"))?;

        Ok(())
    }

    async fn revoke_assignment(
        &mut self,
        kind: AssignmentKind,
        grant_id: GrantId,
        revocation: Revocation,
    ) -> AppResult<bool> {
        let statement = format!(
            "UPDATE {} SET revoked_at = $2, revoked_by = $3 WHERE id = $1 AND revoked_at IS NULL",
            assignment_table(kind)
        );
        let result = sqlx::query(&statement)
            .bind(grant_id.as_uuid())
            .bind(revocation.revoked_at)
            .bind(revocation.revoked_by.as_uuid())
            .execute(&mut *self.transaction)
            .await
            .map_err(|error| map_store_error(error, "revoke assignment"))?;

        Ok(result.rows_affected() == 1)
    }

    async fn revoke_referencing(
        &mut self,
        rule: &CascadeRule,
        entity_id: Uuid,
        revocation: Revocation,
    ) -> AppResult<u64> {
        let table = assignment_table(rule.assignment);
        let column = reference_column(rule.assignment, rule.column)?;

        let seal = format!(
            "UPDATE {table} \
             SET revoked_at = expires_at, revoked_by = $3 \
             WHERE {column} = $1 AND revoked_at IS NULL AND expires_at <= $2"
        );
        sqlx::query(&seal)
            .bind(entity_id)
            .bind(revocation.revoked_at)
            .bind(revocation.revoked_by.as_uuid())
            .execute(&mut *self.transaction)
            .await
            .map_err(|error| map_store_error(error, "cascade sealing"))?;

        let statement = format!(
            "UPDATE {table} \
             SET revoked_at = GREATEST($2, granted_at), revoked_by = $3 \
             WHERE {column} = $1 AND revoked_at IS NULL"
        );
        let result = sqlx::query(&statement)
            .bind(entity_id)
            .bind(revocation.revoked_at)
            .bind(revocation.revoked_by.as_uuid())
            .execute(&mut *self.transaction)
            .await
            .map_err(|error| map_store_error(error, "cascade revocation"))?;

        Ok(result.rows_affected())
    }

    async fn append_audit(&mut self, record: &AuditRecord) -> AppResult<()> {
        let entry = &record.entry;
        sqlx::query(
            r#"
            INSERT INTO authz_audit_records (
                id, recorded_at, actor_id, action, resource_type, resource_id,
                decision, reason, context, idempotency_key
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(entry.recorded_at)
        .bind(entry.actor.map(|actor| actor.as_uuid()))
        .bind(entry.action.as_str())
        .bind(entry.resource_type.as_str())
        .bind(entry.resource_id.as_str())
        .bind(entry.decision.as_str())
        .bind(entry.reason.as_deref())
        .bind(&entry.context)
        .bind(entry.idempotency_key.as_deref())
        .execute(&mut *self.transaction)
        .await
        .map_err(|error| map_store_error(error, "append audit record"))?;

        Ok(())
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let session = *self;
        session
            .transaction
            .commit()
            .await
            .map_err(|error| map_store_error(error, "commit transaction"))
    }
}
