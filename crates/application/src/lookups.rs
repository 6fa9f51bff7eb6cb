use warden_core::{AppError, AppResult};
use warden_domain::{Permission, PermissionId, Role, RoleId, User, UserId};

use crate::AssignmentReader;

/// Loads a user that has not been soft-deleted.
pub(crate) async fn live_user<R>(reader: &mut R, user_id: UserId) -> AppResult<User>
where
    R: AssignmentReader + ?Sized,
{
    reader
        .find_user(user_id)
        .await?
        .filter(|user| !user.is_deleted())
        .ok_or_else(|| AppError::NotFound(format!("user '{user_id}' does not exist")))
}

/// Loads a role that has not been soft-deleted.
pub(crate) async fn live_role<R>(reader: &mut R, role_id: RoleId) -> AppResult<Role>
where
    R: AssignmentReader + ?Sized,
{
    reader
        .find_role(role_id)
        .await?
        .filter(|role| !role.is_deleted())
        .ok_or_else(|| AppError::NotFound(format!("role '{role_id}' does not exist")))
}

/// Loads a permission that has not been soft-deleted.
pub(crate) async fn live_permission<R>(
    reader: &mut R,
    permission_id: PermissionId,
) -> AppResult<Permission>
where
    R: AssignmentReader + ?Sized,
{
    reader
        .find_permission(permission_id)
        .await?
        .filter(|permission| !permission.is_deleted())
        .ok_or_else(|| {
            AppError::NotFound(format!("permission '{permission_id}' does not exist"))
        })
}
