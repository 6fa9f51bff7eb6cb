use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use warden_core::{ActorIdentity, AppError, AppResult, NonEmptyString};
use warden_domain::{
    AssignmentKey, AssignmentKind, AuditQuery, AuditRecord, CascadeRule, Delegation, EntityKind,
    GOVERNANCE_RESOURCE_TYPE, GovernanceTier, GrantId, Permission, PermissionId, PermissionKey,
    ResourceGrant, Revocation, Role, RoleGrant, RoleId, RoleParentLink, SoftDeletion,
    TemporalAssignment, UnrevokedAssignment, User, UserId, UserRoleGrant, ValidityWindow,
};

use crate::{AssignmentReader, AssignmentStore, AssignmentTransaction};

pub(crate) fn instant(offset_days: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_else(|| panic!("fixed instant is valid"))
        + Duration::days(offset_days)
}

#[derive(Debug, Clone, Default)]
pub(crate) struct FakeState {
    pub users: Vec<User>,
    pub roles: Vec<Role>,
    pub permissions: Vec<Permission>,
    pub parent_links: Vec<RoleParentLink>,
    pub role_grants: Vec<RoleGrant>,
    pub user_role_grants: Vec<UserRoleGrant>,
    pub resource_grants: Vec<ResourceGrant>,
    pub delegations: Vec<Delegation>,
    pub audit: Vec<AuditRecord>,
}

#[derive(Clone, Default)]
pub(crate) struct FakeStore {
    state: Arc<Mutex<FakeState>>,
    fail_commit: Arc<Mutex<bool>>,
}

impl FakeStore {
    pub async fn audit_records(&self) -> Vec<AuditRecord> {
        self.state.lock().await.audit.clone()
    }

    pub async fn state(&self) -> FakeState {
        self.state.lock().await.clone()
    }

    pub async fn replace_state(&self, state: FakeState) {
        *self.state.lock().await = state;
    }

    pub async fn fail_next_commit(&self) {
        *self.fail_commit.lock().await = true;
    }

    pub async fn add_user(&self, external_ref: &str) -> UserId {
        let user = User::new(
            UserId::new(),
            NonEmptyString::new(external_ref).unwrap_or_else(|error| panic!("{error}")),
            instant(0),
        );
        let id = user.id();
        self.state.lock().await.users.push(user);
        id
    }

    pub async fn add_role(&self, name: &str, tier: GovernanceTier) -> RoleId {
        let role = Role {
            id: RoleId::new(),
            name: NonEmptyString::new(name).unwrap_or_else(|error| panic!("{error}")),
            tier,
            created_at: instant(0),
            created_by: UserId::new(),
            deletion: None,
        };
        let id = role.id;
        self.state.lock().await.roles.push(role);
        id
    }

    pub async fn add_permission(&self, key: &str, tier: GovernanceTier) -> PermissionId {
        let permission = Permission {
            id: PermissionId::new(),
            key: PermissionKey::parse(key).unwrap_or_else(|error| panic!("{error}")),
            tier,
            created_at: instant(0),
            created_by: UserId::new(),
            deletion: None,
        };
        let id = permission.id;
        self.state.lock().await.permissions.push(permission);
        id
    }

    pub async fn attach(&self, role_id: RoleId, permission_id: PermissionId) {
        self.state.lock().await.role_grants.push(RoleGrant {
            id: GrantId::new(),
            role_id,
            permission_id,
            window: open_window(0),
            granted_by: UserId::new(),
        });
    }

    pub async fn link_parent(&self, role_id: RoleId, parent_role_id: RoleId) {
        self.state.lock().await.parent_links.push(RoleParentLink {
            id: GrantId::new(),
            role_id,
            parent_role_id,
            window: open_window(0),
            granted_by: UserId::new(),
        });
    }

    pub async fn assign(&self, user_id: UserId, role_id: RoleId) -> GrantId {
        let id = GrantId::new();
        self.state.lock().await.user_role_grants.push(UserRoleGrant {
            id,
            user_id,
            role_id,
            scope_id: None,
            window: open_window(0),
            granted_by: UserId::new(),
        });
        id
    }

    /// Creates a user holding a role with the given governance capabilities.
    pub async fn add_governor(&self, external_ref: &str, capabilities: &[&str]) -> ActorIdentity {
        let user_id = self.add_user(external_ref).await;
        let role_id = self
            .add_role(&format!("{external_ref}-governance"), GovernanceTier::Elevated)
            .await;
        for capability in capabilities {
            let permission_id = self
                .add_permission(
                    &format!("{GOVERNANCE_RESOURCE_TYPE}:{capability}"),
                    GovernanceTier::Elevated,
                )
                .await;
            self.attach(role_id, permission_id).await;
        }
        self.assign(user_id, role_id).await;

        ActorIdentity::new(user_id.as_uuid(), external_ref)
    }
}

pub(crate) fn open_window(offset_days: i64) -> ValidityWindow {
    ValidityWindow::new(instant(offset_days), None).unwrap_or_else(|error| panic!("{error}"))
}

#[async_trait]
impl AssignmentStore for FakeStore {
    async fn snapshot(&self) -> AppResult<Box<dyn AssignmentReader>> {
        Ok(Box::new(FakeTransaction {
            working: self.state.lock().await.clone(),
            store: self.clone(),
        }))
    }

    async fn begin(&self) -> AppResult<Box<dyn AssignmentTransaction>> {
        Ok(Box::new(FakeTransaction {
            working: self.state.lock().await.clone(),
            store: self.clone(),
        }))
    }
}

struct FakeTransaction {
    working: FakeState,
    store: FakeStore,
}

fn find_unrevoked<T: TemporalAssignment>(
    rows: &[T],
    key: &AssignmentKey,
) -> Option<UnrevokedAssignment> {
    rows.iter()
        .find(|row| row.window().is_unrevoked() && row.key() == *key)
        .map(|row| UnrevokedAssignment {
            id: row.id(),
            window: *row.window(),
        })
}

fn insert_row<T: TemporalAssignment + Clone>(rows: &mut Vec<T>, row: &T) -> AppResult<()> {
    if find_unrevoked(rows, &row.key()).is_some() {
        return Err(AppError::Conflict(format!(
            "an unrevoked {} already holds this key",
            row.key().kind().as_str()
        )));
    }
    rows.push(row.clone());
    Ok(())
}

fn revoke_row<T: TemporalAssignment>(rows: &mut [T], id: GrantId, revocation: Revocation) -> bool {
    match rows
        .iter_mut()
        .find(|row| row.id() == id && row.window().is_unrevoked())
    {
        Some(row) => {
            row.window_mut().revocation = Some(revocation);
            true
        }
        None => false,
    }
}

fn revoke_referencing_rows<T: TemporalAssignment>(
    rows: &mut [T],
    rule: &CascadeRule,
    entity_id: Uuid,
    revocation: Revocation,
) -> u64 {
    let mut revoked = 0;
    for row in rows.iter_mut().filter(|row| {
        row.window().is_unrevoked() && row.reference(rule.column) == Some(entity_id)
    }) {
        let (stamp, cut_short) = row.window().cascade_stamp(revocation);
        row.window_mut().revocation = Some(stamp);
        if cut_short {
            revoked += 1;
        }
    }
    revoked
}

#[async_trait]
impl AssignmentReader for FakeTransaction {
    async fn find_user(&mut self, user_id: UserId) -> AppResult<Option<User>> {
        Ok(self.working.users.iter().find(|user| user.id() == user_id).cloned())
    }

    async fn find_user_by_external_ref(&mut self, external_ref: &str) -> AppResult<Option<User>> {
        Ok(self
            .working
            .users
            .iter()
            .find(|user| !user.is_deleted() && user.external_ref().as_str() == external_ref)
            .cloned())
    }

    async fn find_role(&mut self, role_id: RoleId) -> AppResult<Option<Role>> {
        Ok(self.working.roles.iter().find(|role| role.id == role_id).cloned())
    }

    async fn find_role_by_name(&mut self, name: &str) -> AppResult<Option<Role>> {
        Ok(self
            .working
            .roles
            .iter()
            .find(|role| !role.is_deleted() && role.name.as_str() == name)
            .cloned())
    }

    async fn find_permission(
        &mut self,
        permission_id: PermissionId,
    ) -> AppResult<Option<Permission>> {
        Ok(self
            .working
            .permissions
            .iter()
            .find(|permission| permission.id == permission_id)
            .cloned())
    }

    async fn find_permission_by_key(
        &mut self,
        key: &PermissionKey,
    ) -> AppResult<Option<Permission>> {
        Ok(self
            .working
            .permissions
            .iter()
            .find(|permission| !permission.is_deleted() && permission.key == *key)
            .cloned())
    }

    async fn permissions_by_ids(
        &mut self,
        permission_ids: &[PermissionId],
    ) -> AppResult<Vec<Permission>> {
        Ok(self
            .working
            .permissions
            .iter()
            .filter(|permission| permission_ids.contains(&permission.id))
            .cloned()
            .collect())
    }

    async fn role_parent_links(&mut self) -> AppResult<Vec<RoleParentLink>> {
        Ok(self.working.parent_links.clone())
    }

    async fn role_grants_for_roles(&mut self, role_ids: &[RoleId]) -> AppResult<Vec<RoleGrant>> {
        Ok(self
            .working
            .role_grants
            .iter()
            .filter(|grant| role_ids.contains(&grant.role_id))
            .cloned()
            .collect())
    }

    async fn user_role_grants_for_user(
        &mut self,
        user_id: UserId,
    ) -> AppResult<Vec<UserRoleGrant>> {
        Ok(self
            .working
            .user_role_grants
            .iter()
            .filter(|grant| grant.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn resource_grants_for_user(
        &mut self,
        user_id: UserId,
    ) -> AppResult<Vec<ResourceGrant>> {
        Ok(self
            .working
            .resource_grants
            .iter()
            .filter(|grant| grant.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn delegations_involving(&mut self, user_id: UserId) -> AppResult<Vec<Delegation>> {
        Ok(self
            .working
            .delegations
            .iter()
            .filter(|delegation| {
                delegation.delegator_id == user_id || delegation.delegatee_id == user_id
            })
            .cloned()
            .collect())
    }

    async fn find_unrevoked(
        &mut self,
        key: &AssignmentKey,
    ) -> AppResult<Option<UnrevokedAssignment>> {
        Ok(match key.kind() {
            AssignmentKind::RoleParentLink => find_unrevoked(&self.working.parent_links, key),
            AssignmentKind::RoleGrant => find_unrevoked(&self.working.role_grants, key),
            AssignmentKind::UserRoleGrant => find_unrevoked(&self.working.user_role_grants, key),
            AssignmentKind::ResourceGrant => find_unrevoked(&self.working.resource_grants, key),
            AssignmentKind::Delegation => find_unrevoked(&self.working.delegations, key),
        })
    }

    async fn find_audit_by_idempotency_key(
        &mut self,
        idempotency_key: &str,
    ) -> AppResult<Option<AuditRecord>> {
        Ok(self
            .working
            .audit
            .iter()
            .find(|record| record.entry.idempotency_key.as_deref() == Some(idempotency_key))
            .cloned())
    }

    async fn list_audit_records(&mut self, query: &AuditQuery) -> AppResult<Vec<AuditRecord>> {
        Ok(self
            .working
            .audit
            .iter()
            .rev()
            .filter(|record| query.matches(record))
            .take(query.limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AssignmentTransaction for FakeTransaction {
    async fn insert_user(&mut self, user: &User) -> AppResult<()> {
        self.working.users.push(user.clone());
        Ok(())
    }

    async fn insert_role(&mut self, role: &Role) -> AppResult<()> {
        self.working.roles.push(role.clone());
        Ok(())
    }

    async fn insert_permission(&mut self, permission: &Permission) -> AppResult<()> {
        self.working.permissions.push(permission.clone());
        Ok(())
    }

    async fn mark_deleted(
        &mut self,
        kind: EntityKind,
        entity_id: Uuid,
        deletion: SoftDeletion,
    ) -> AppResult<bool> {
        let marked = match kind {
            EntityKind::User => {
                match self
                    .working
                    .users
                    .iter_mut()
                    .find(|user| user.id().as_uuid() == entity_id && !user.is_deleted())
                {
                    Some(user) => {
                        *user = User::from_storage(
                            user.id(),
                            user.external_ref().clone(),
                            user.created_at(),
                            Some(deletion),
                        );
                        true
                    }
                    None => false,
                }
            }
            EntityKind::Role => {
                match self
                    .working
                    .roles
                    .iter_mut()
                    .find(|role| role.id.as_uuid() == entity_id && !role.is_deleted())
                {
                    Some(role) => {
                        role.deletion = Some(deletion);
                        true
                    }
                    None => false,
                }
            }
            EntityKind::Permission => {
                match self.working.permissions.iter_mut().find(|permission| {
                    permission.id.as_uuid() == entity_id && !permission.is_deleted()
                }) {
                    Some(permission) => {
                        permission.deletion = Some(deletion);
                        true
                    }
                    None => false,
                }
            }
        };
        Ok(marked)
    }

    async fn insert_role_parent_link(&mut self, link: &RoleParentLink) -> AppResult<()> {
        insert_row(&mut self.working.parent_links, link)
    }

    async fn insert_role_grant(&mut self, grant: &RoleGrant) -> AppResult<()> {
        insert_row(&mut self.working.role_grants, grant)
    }

    async fn insert_user_role_grant(&mut self, grant: &UserRoleGrant) -> AppResult<()> {
        insert_row(&mut self.working.user_role_grants, grant)
    }

    async fn insert_resource_grant(&mut self, grant: &ResourceGrant) -> AppResult<()> {
        insert_row(&mut self.working.resource_grants, grant)
    }

    async fn insert_delegation(&mut self, delegation: &Delegation) -> AppResult<()> {
        insert_row(&mut self.working.delegations, delegation)
    }

    async fn revoke_assignment(
        &mut self,
        kind: AssignmentKind,
        grant_id: GrantId,
        revocation: Revocation,
    ) -> AppResult<bool> {
        Ok(match kind {
            AssignmentKind::RoleParentLink => {
                revoke_row(&mut self.working.parent_links, grant_id, revocation)
            }
            AssignmentKind::RoleGrant => {
                revoke_row(&mut self.working.role_grants, grant_id, revocation)
            }
            AssignmentKind::UserRoleGrant => {
                revoke_row(&mut self.working.user_role_grants, grant_id, revocation)
            }
            AssignmentKind::ResourceGrant => {
                revoke_row(&mut self.working.resource_grants, grant_id, revocation)
            }
            AssignmentKind::Delegation => {
                revoke_row(&mut self.working.delegations, grant_id, revocation)
            }
        })
    }

    async fn revoke_referencing(
        &mut self,
        rule: &CascadeRule,
        entity_id: Uuid,
        revocation: Revocation,
    ) -> AppResult<u64> {
        let state = &mut self.working;
        Ok(match rule.assignment {
            AssignmentKind::RoleParentLink => {
                revoke_referencing_rows(&mut state.parent_links, rule, entity_id, revocation)
            }
            AssignmentKind::RoleGrant => {
                revoke_referencing_rows(&mut state.role_grants, rule, entity_id, revocation)
            }
            AssignmentKind::UserRoleGrant => {
                revoke_referencing_rows(&mut state.user_role_grants, rule, entity_id, revocation)
            }
            AssignmentKind::ResourceGrant => {
                revoke_referencing_rows(&mut state.resource_grants, rule, entity_id, revocation)
            }
            AssignmentKind::Delegation => {
                revoke_referencing_rows(&mut state.delegations, rule, entity_id, revocation)
            }
        })
    }

    async fn append_audit(&mut self, record: &AuditRecord) -> AppResult<()> {
        if let Some(key) = record.entry.idempotency_key.as_deref()
            && self
                .working
                .audit
                .iter()
                .any(|existing| existing.entry.idempotency_key.as_deref() == Some(key))
        {
            return Err(AppError::Conflict(format!(
                "idempotency key '{key}' already recorded"
            )));
        }

        self.working.audit.push(record.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let FakeTransaction { working, store } = *self;
        {
            let mut fail_commit = store.fail_commit.lock().await;
            if *fail_commit {
                *fail_commit = false;
                return Err(AppError::Unavailable("injected commit failure".to_owned()));
            }
        }

        *store.state.lock().await = working;
        Ok(())
    }
}

/// Distinct `(resource type, action)` pairs, for compact assertions.
pub(crate) fn pairs(values: &[(&str, &str)]) -> BTreeSet<(String, String)> {
    values
        .iter()
        .map(|(resource_type, action)| ((*resource_type).to_owned(), (*action).to_owned()))
        .collect()
}
