use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use warden_core::AppResult;
use warden_domain::{
    AssignmentKey, AssignmentKind, AuditQuery, AuditRecord, CascadeRule, Delegation, EntityKind,
    GrantId, Permission, PermissionId, PermissionKey, ResourceGrant, Revocation, Role, RoleGrant,
    RoleId, RoleParentLink, SoftDeletion, UnrevokedAssignment, User, UserId, UserRoleGrant,
};

/// Entry point to the temporal assignment store.
#[async_trait]
pub trait AssignmentStore: Send + Sync {
    /// Opens a consistent read-only view of committed state.
    async fn snapshot(&self) -> AppResult<Box<dyn AssignmentReader>>;

    /// Opens a write transaction. Dropping it without commit rolls back.
    async fn begin(&self) -> AppResult<Box<dyn AssignmentTransaction>>;
}

/// Queries against one consistent view of the store.
///
/// Assignment queries return full history; activeness is decided by callers.
#[async_trait]
pub trait AssignmentReader: Send {
    /// Finds a user, including soft-deleted ones.
    async fn find_user(&mut self, user_id: UserId) -> AppResult<Option<User>>;

    /// Finds the live user bound to an external identity reference.
    async fn find_user_by_external_ref(&mut self, external_ref: &str) -> AppResult<Option<User>>;

    /// Finds a role, including soft-deleted ones.
    async fn find_role(&mut self, role_id: RoleId) -> AppResult<Option<Role>>;

    /// Finds the live role with the given name.
    async fn find_role_by_name(&mut self, name: &str) -> AppResult<Option<Role>>;

    /// Finds a permission, including soft-deleted ones.
    async fn find_permission(&mut self, permission_id: PermissionId)
    -> AppResult<Option<Permission>>;

    /// Finds the live permission with the given key.
    async fn find_permission_by_key(
        &mut self,
        key: &PermissionKey,
    ) -> AppResult<Option<Permission>>;

    /// Loads permissions by id, including soft-deleted ones.
    async fn permissions_by_ids(
        &mut self,
        permission_ids: &[PermissionId],
    ) -> AppResult<Vec<Permission>>;

    /// Lists every role parent link.
    async fn role_parent_links(&mut self) -> AppResult<Vec<RoleParentLink>>;

    /// Lists every role grant of the given roles.
    async fn role_grants_for_roles(&mut self, role_ids: &[RoleId]) -> AppResult<Vec<RoleGrant>>;

    /// Lists every user-role grant of a user.
    async fn user_role_grants_for_user(&mut self, user_id: UserId)
    -> AppResult<Vec<UserRoleGrant>>;

    /// Lists every resource grant of a user.
    async fn resource_grants_for_user(&mut self, user_id: UserId)
    -> AppResult<Vec<ResourceGrant>>;

    /// Lists every delegation where the user is delegator or delegatee.
    async fn delegations_involving(&mut self, user_id: UserId) -> AppResult<Vec<Delegation>>;

    /// Finds the unrevoked row holding a unique key.
    async fn find_unrevoked(
        &mut self,
        key: &AssignmentKey,
    ) -> AppResult<Option<UnrevokedAssignment>>;

    /// Finds the audit record written under an idempotency key.
    async fn find_audit_by_idempotency_key(
        &mut self,
        idempotency_key: &str,
    ) -> AppResult<Option<AuditRecord>>;

    /// Lists audit records newest first.
    async fn list_audit_records(&mut self, query: &AuditQuery) -> AppResult<Vec<AuditRecord>>;
}

/// Write transaction over the store. Reads observe the transaction's own writes.
#[async_trait]
pub trait AssignmentTransaction: AssignmentReader {
    /// Inserts a user. Conflicts on a live duplicate external reference.
    async fn insert_user(&mut self, user: &User) -> AppResult<()>;

    /// Inserts a role. Conflicts on a live duplicate name.
    async fn insert_role(&mut self, role: &Role) -> AppResult<()>;

    /// Inserts a permission. Conflicts on a live duplicate key.
    async fn insert_permission(&mut self, permission: &Permission) -> AppResult<()>;

    /// Stamps a live entity as deleted. Returns false when it is missing or already deleted.
    async fn mark_deleted(
        &mut self,
        kind: EntityKind,
        entity_id: Uuid,
        deletion: SoftDeletion,
    ) -> AppResult<bool>;

    /// Inserts a role parent link. Conflicts when the key is already held.
    async fn insert_role_parent_link(&mut self, link: &RoleParentLink) -> AppResult<()>;

    /// Inserts a role grant. Conflicts when the key is already held.
    async fn insert_role_grant(&mut self, grant: &RoleGrant) -> AppResult<()>;

    /// Inserts a user-role grant. Conflicts when the key is already held.
    async fn insert_user_role_grant(&mut self, grant: &UserRoleGrant) -> AppResult<()>;

    /// Inserts a resource grant. Conflicts when the key is already held.
    async fn insert_resource_grant(&mut self, grant: &ResourceGrant) -> AppResult<()>;

    /// Inserts a delegation. Conflicts when the key is already held.
    async fn insert_delegation(&mut self, delegation: &Delegation) -> AppResult<()>;

    /// Revokes one unrevoked row. Returns false when the row is missing or already revoked.
    async fn revoke_assignment(
        &mut self,
        kind: AssignmentKind,
        grant_id: GrantId,
        revocation: Revocation,
    ) -> AppResult<bool>;

    /// Revokes every unrevoked row matched by a cascade rule.
    ///
    /// Rows granted after the revocation instant are closed at their own grant instant.
    async fn revoke_referencing(
        &mut self,
        rule: &CascadeRule,
        entity_id: Uuid,
        revocation: Revocation,
    ) -> AppResult<u64>;

    /// Appends an audit record. Conflicts on a duplicate idempotency key.
    async fn append_audit(&mut self, record: &AuditRecord) -> AppResult<()>;

    /// Commits every write of the transaction atomically.
    async fn commit(self: Box<Self>) -> AppResult<()>;
}

/// Every assignment row touching a user, for compliance review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentHistory {
    /// The user, possibly soft-deleted.
    pub user: User,
    /// Roles held over time.
    pub user_role_grants: Vec<UserRoleGrant>,
    /// Resource grants over time.
    pub resource_grants: Vec<ResourceGrant>,
    /// Delegations given or received over time.
    pub delegations: Vec<Delegation>,
}
