use super::*;

/// One committed (or in-flight) version of entities and assignments.
#[derive(Debug, Clone, Default)]
pub(super) struct StoreState {
    users: Vec<User>,
    roles: Vec<Role>,
    permissions: Vec<Permission>,
    parent_links: AssignmentTable<RoleParentLink>,
    role_grants: AssignmentTable<RoleGrant>,
    user_role_grants: AssignmentTable<UserRoleGrant>,
    resource_grants: AssignmentTable<ResourceGrant>,
    delegations: AssignmentTable<Delegation>,
}

impl StoreState {
    pub(super) fn user(&self, user_id: UserId) -> Option<User> {
        self.users.iter().find(|user| user.id() == user_id).cloned()
    }

    pub(super) fn live_user_by_external_ref(&self, external_ref: &str) -> Option<User> {
        self.users
            .iter()
            .find(|user| !user.is_deleted() && user.external_ref().as_str() == external_ref)
            .cloned()
    }

    pub(super) fn role(&self, role_id: RoleId) -> Option<Role> {
        self.roles.iter().find(|role| role.id == role_id).cloned()
    }

    pub(super) fn live_role_by_name(&self, name: &str) -> Option<Role> {
        self.roles
            .iter()
            .find(|role| !role.is_deleted() && role.name.as_str() == name)
            .cloned()
    }

    pub(super) fn permission(&self, permission_id: PermissionId) -> Option<Permission> {
        self.permissions
            .iter()
            .find(|permission| permission.id == permission_id)
            .cloned()
    }

    pub(super) fn live_permission_by_key(&self, key: &PermissionKey) -> Option<Permission> {
        self.permissions
            .iter()
            .find(|permission| !permission.is_deleted() && permission.key == *key)
            .cloned()
    }

    pub(super) fn permissions_by_ids(&self, permission_ids: &[PermissionId]) -> Vec<Permission> {
        self.permissions
            .iter()
            .filter(|permission| permission_ids.contains(&permission.id))
            .cloned()
            .collect()
    }

    pub(super) fn role_parent_links(&self) -> Vec<RoleParentLink> {
        self.parent_links.rows_where(|_| true)
    }

    pub(super) fn role_grants_for_roles(&self, role_ids: &[RoleId]) -> Vec<RoleGrant> {
        self.role_grants
            .rows_where(|grant| role_ids.contains(&grant.role_id))
    }

    pub(super) fn user_role_grants_for_user(&self, user_id: UserId) -> Vec<UserRoleGrant> {
        self.user_role_grants
            .rows_where(|grant| grant.user_id == user_id)
    }

    pub(super) fn resource_grants_for_user(&self, user_id: UserId) -> Vec<ResourceGrant> {
        self.resource_grants
            .rows_where(|grant| grant.user_id == user_id)
    }

    pub(super) fn delegations_involving(&self, user_id: UserId) -> Vec<Delegation> {
        self.delegations.rows_where(|delegation| {
            delegation.delegator_id == user_id || delegation.delegatee_id == user_id
        })
    }

    pub(super) fn find_unrevoked(&self, key: &AssignmentKey) -> Option<UnrevokedAssignment> {
        match key.kind() {
            AssignmentKind::RoleParentLink => self.parent_links.find_unrevoked(key),
            AssignmentKind::RoleGrant => self.role_grants.find_unrevoked(key),
            AssignmentKind::UserRoleGrant => self.user_role_grants.find_unrevoked(key),
            AssignmentKind::ResourceGrant => self.resource_grants.find_unrevoked(key),
            AssignmentKind::Delegation => self.delegations.find_unrevoked(key),
        }
    }

    pub(super) fn insert_user(&mut self, user: &User) -> AppResult<()> {
        if self.user(user.id()).is_some() {
            return Err(AppError::Conflict(format!("user '{}' already exists", user.id())));
        }

        if self
            .live_user_by_external_ref(user.external_ref().as_str())
            .is_some()
        {
            return Err(AppError::Conflict(format!(
                "external reference '{}' is already bound to a user",
                user.external_ref()
            )));
        }

        self.users.push(user.clone());
        Ok(())
    }

    pub(super) fn insert_role(&mut self, role: &Role) -> AppResult<()> {
        if self.role(role.id).is_some() || self.live_role_by_name(role.name.as_str()).is_some() {
            return Err(AppError::Conflict(format!(
                "role '{}' already exists",
                role.name
            )));
        }

        self.roles.push(role.clone());
        Ok(())
    }

    pub(super) fn insert_permission(&mut self, permission: &Permission) -> AppResult<()> {
        if self.permission(permission.id).is_some()
            || self.live_permission_by_key(&permission.key).is_some()
        {
            return Err(AppError::Conflict(format!(
                "permission '{}' already exists",
                permission.key
            )));
        }

        self.permissions.push(permission.clone());
        Ok(())
    }

    pub(super) fn mark_deleted(
        &mut self,
        kind: EntityKind,
        entity_id: Uuid,
        deletion: SoftDeletion,
    ) -> bool {
        match kind {
            EntityKind::User => {
                let Some(user) = self
                    .users
                    .iter_mut()
                    .find(|user| user.id().as_uuid() == entity_id && !user.is_deleted())
                else {
                    return false;
                };
                *user = User::from_storage(
                    user.id(),
                    user.external_ref().clone(),
                    user.created_at(),
                    Some(deletion),
                );
            }
            EntityKind::Role => {
                let Some(role) = self
                    .roles
                    .iter_mut()
                    .find(|role| role.id.as_uuid() == entity_id && !role.is_deleted())
                else {
                    return false;
                };
                role.deletion = Some(deletion);
            }
            EntityKind::Permission => {
                let Some(permission) = self.permissions.iter_mut().find(|permission| {
                    permission.id.as_uuid() == entity_id && !permission.is_deleted()
                }) else {
                    return false;
                };
                permission.deletion = Some(deletion);
            }
        }

        true
    }

    pub(super) fn insert_role_parent_link(&mut self, link: &RoleParentLink) -> AppResult<()> {
        if link.role_id == link.parent_role_id {
            return Err(AppError::InvariantViolation(format!(
                "role '{}' cannot be its own parent",
                link.role_id
            )));
        }

        self.parent_links.insert(link)
    }

    pub(super) fn insert_role_grant(&mut self, grant: &RoleGrant) -> AppResult<()> {
        self.role_grants.insert(grant)
    }

    pub(super) fn insert_user_role_grant(&mut self, grant: &UserRoleGrant) -> AppResult<()> {
        self.user_role_grants.insert(grant)
    }

    pub(super) fn insert_resource_grant(&mut self, grant: &ResourceGrant) -> AppResult<()> {
        self.resource_grants.insert(grant)
    }

    pub(super) fn insert_delegation(&mut self, delegation: &Delegation) -> AppResult<()> {
        self.delegations.insert(delegation)
    }

    pub(super) fn revoke_assignment(
        &mut self,
        kind: AssignmentKind,
        grant_id: GrantId,
        revocation: Revocation,
    ) -> AppResult<bool> {
        match kind {
            AssignmentKind::RoleParentLink => self.parent_links.revoke(grant_id, revocation),
            AssignmentKind::RoleGrant => self.role_grants.revoke(grant_id, revocation),
            AssignmentKind::UserRoleGrant => self.user_role_grants.revoke(grant_id, revocation),
            AssignmentKind::ResourceGrant => self.resource_grants.revoke(grant_id, revocation),
            AssignmentKind::Delegation => self.delegations.revoke(grant_id, revocation),
        }
    }

    pub(super) fn revoke_referencing(
        &mut self,
        rule: &CascadeRule,
        entity_id: Uuid,
        revocation: Revocation,
    ) -> AppResult<u64> {
        let column = rule.column;
        match rule.assignment {
            AssignmentKind::RoleParentLink => {
                self.parent_links
                    .revoke_referencing(column, entity_id, revocation)
            }
            AssignmentKind::RoleGrant => {
                self.role_grants
                    .revoke_referencing(column, entity_id, revocation)
            }
            AssignmentKind::UserRoleGrant => {
                self.user_role_grants
                    .revoke_referencing(column, entity_id, revocation)
            }
            AssignmentKind::ResourceGrant => {
                self.resource_grants
                    .revoke_referencing(column, entity_id, revocation)
            }
            AssignmentKind::Delegation => {
                self.delegations
                    .revoke_referencing(column, entity_id, revocation)
            }
        }
    }
}
