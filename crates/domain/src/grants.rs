//! Temporal assignment rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use warden_core::AppError;

use crate::{GrantId, PermissionId, ReferenceColumn, RoleId, UserId, ValidityWindow};

/// Kinds of temporal assignment tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentKind {
    /// Role to parent role.
    RoleParentLink,
    /// Role to permission.
    RoleGrant,
    /// User to role.
    UserRoleGrant,
    /// User to one resource instance.
    ResourceGrant,
    /// User to user.
    Delegation,
}

impl AssignmentKind {
    /// Returns a stable storage value for this kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoleParentLink => "role_parent_link",
            Self::RoleGrant => "role_grant",
            Self::UserRoleGrant => "user_role_grant",
            Self::ResourceGrant => "resource_grant",
            Self::Delegation => "delegation",
        }
    }
}

impl std::str::FromStr for AssignmentKind {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "role_parent_link" => Ok(Self::RoleParentLink),
            "role_grant" => Ok(Self::RoleGrant),
            "user_role_grant" => Ok(Self::UserRoleGrant),
            "resource_grant" => Ok(Self::ResourceGrant),
            "delegation" => Ok(Self::Delegation),
            _ => Err(AppError::Validation(format!(
                "unknown assignment kind '{value}'"
            ))),
        }
    }
}

/// Unique key of a temporal assignment. At most one unrevoked row exists per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssignmentKey {
    /// One active parent per role.
    RoleParent {
        /// Child role.
        role_id: RoleId,
    },
    /// Role holds permission.
    RolePermission {
        /// Role.
        role_id: RoleId,
        /// Permission.
        permission_id: PermissionId,
    },
    /// User holds role, optionally scoped to one resource instance.
    UserRole {
        /// User.
        user_id: UserId,
        /// Role.
        role_id: RoleId,
        /// Optional resource-instance scope.
        scope_id: Option<String>,
    },
    /// User may perform one action on one resource instance.
    Resource {
        /// User.
        user_id: UserId,
        /// Resource type.
        resource_type: String,
        /// Resource instance id.
        resource_id: String,
        /// Action.
        action: String,
    },
    /// Delegator shares a scoped subset of its access with the delegatee.
    Delegation {
        /// Delegating user.
        delegator_id: UserId,
        /// Receiving user.
        delegatee_id: UserId,
        /// Scope tag.
        scope_tag: String,
    },
}

impl AssignmentKey {
    /// Returns the table the key belongs to.
    #[must_use]
    pub fn kind(&self) -> AssignmentKind {
        match self {
            Self::RoleParent { .. } => AssignmentKind::RoleParentLink,
            Self::RolePermission { .. } => AssignmentKind::RoleGrant,
            Self::UserRole { .. } => AssignmentKind::UserRoleGrant,
            Self::Resource { .. } => AssignmentKind::ResourceGrant,
            Self::Delegation { .. } => AssignmentKind::Delegation,
        }
    }
}

/// Common accessors over assignment rows.
pub trait TemporalAssignment {
    /// Row id.
    fn id(&self) -> GrantId;
    /// Validity window.
    fn window(&self) -> &ValidityWindow;
    /// Mutable validity window, for store adapters stamping revocations.
    fn window_mut(&mut self) -> &mut ValidityWindow;
    /// Unique key.
    fn key(&self) -> AssignmentKey;
    /// Entity id held in a reference column, when the row has that column.
    fn reference(&self, column: ReferenceColumn) -> Option<Uuid>;

    /// Returns whether the row applies at `at`.
    fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        self.window().is_active_at(at)
    }
}

/// Temporal link from a role to its parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleParentLink {
    /// Row id.
    pub id: GrantId,
    /// Child role.
    pub role_id: RoleId,
    /// Parent role.
    pub parent_role_id: RoleId,
    /// Validity window. Never expires on its own.
    pub window: ValidityWindow,
    /// Granting actor.
    pub granted_by: UserId,
}

/// Temporal link: role has permission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleGrant {
    /// Row id.
    pub id: GrantId,
    /// Role.
    pub role_id: RoleId,
    /// Permission.
    pub permission_id: PermissionId,
    /// Validity window. Never expires on its own.
    pub window: ValidityWindow,
    /// Granting actor.
    pub granted_by: UserId,
}

/// Temporal link: user holds role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRoleGrant {
    /// Row id.
    pub id: GrantId,
    /// User.
    pub user_id: UserId,
    /// Role.
    pub role_id: RoleId,
    /// Optional resource-instance scope restricting the inherited permissions.
    pub scope_id: Option<String>,
    /// Validity window.
    pub window: ValidityWindow,
    /// Granting actor.
    pub granted_by: UserId,
}

/// Fine-grained grant on one resource instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceGrant {
    /// Row id.
    pub id: GrantId,
    /// User.
    pub user_id: UserId,
    /// Resource type.
    pub resource_type: String,
    /// Resource instance id.
    pub resource_id: String,
    /// Action.
    pub action: String,
    /// Validity window.
    pub window: ValidityWindow,
    /// Granting actor.
    pub granted_by: UserId,
    /// Justification captured at grant time.
    pub reason: Option<String>,
}

impl TemporalAssignment for RoleParentLink {
    fn id(&self) -> GrantId {
        self.id
    }

    fn window(&self) -> &ValidityWindow {
        &self.window
    }

    fn window_mut(&mut self) -> &mut ValidityWindow {
        &mut self.window
    }

    fn key(&self) -> AssignmentKey {
        AssignmentKey::RoleParent {
            role_id: self.role_id,
        }
    }

    fn reference(&self, column: ReferenceColumn) -> Option<Uuid> {
        match column {
            ReferenceColumn::Role => Some(self.role_id.as_uuid()),
            ReferenceColumn::ParentRole => Some(self.parent_role_id.as_uuid()),
            _ => None,
        }
    }
}

impl TemporalAssignment for RoleGrant {
    fn id(&self) -> GrantId {
        self.id
    }

    fn window(&self) -> &ValidityWindow {
        &self.window
    }

    fn window_mut(&mut self) -> &mut ValidityWindow {
        &mut self.window
    }

    fn key(&self) -> AssignmentKey {
        AssignmentKey::RolePermission {
            role_id: self.role_id,
            permission_id: self.permission_id,
        }
    }

    fn reference(&self, column: ReferenceColumn) -> Option<Uuid> {
        match column {
            ReferenceColumn::Role => Some(self.role_id.as_uuid()),
            ReferenceColumn::Permission => Some(self.permission_id.as_uuid()),
            _ => None,
        }
    }
}

impl TemporalAssignment for UserRoleGrant {
    fn id(&self) -> GrantId {
        self.id
    }

    fn window(&self) -> &ValidityWindow {
        &self.window
    }

    fn window_mut(&mut self) -> &mut ValidityWindow {
        &mut self.window
    }

    fn key(&self) -> AssignmentKey {
        AssignmentKey::UserRole {
            user_id: self.user_id,
            role_id: self.role_id,
            scope_id: self.scope_id.clone(),
        }
    }

    fn reference(&self, column: ReferenceColumn) -> Option<Uuid> {
        match column {
            ReferenceColumn::User => Some(self.user_id.as_uuid()),
            ReferenceColumn::Role => Some(self.role_id.as_uuid()),
            _ => None,
        }
    }
}

impl TemporalAssignment for ResourceGrant {
    fn id(&self) -> GrantId {
        self.id
    }

    fn window(&self) -> &ValidityWindow {
        &self.window
    }

    fn window_mut(&mut self) -> &mut ValidityWindow {
        &mut self.window
    }

    fn key(&self) -> AssignmentKey {
        AssignmentKey::Resource {
            user_id: self.user_id,
            resource_type: self.resource_type.clone(),
            resource_id: self.resource_id.clone(),
            action: self.action.clone(),
        }
    }

    fn reference(&self, column: ReferenceColumn) -> Option<Uuid> {
        match column {
            ReferenceColumn::User => Some(self.user_id.as_uuid()),
            _ => None,
        }
    }
}

/// Unrevoked row found under a key, used for conflict checks and sealing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnrevokedAssignment {
    /// Row id.
    pub id: GrantId,
    /// Row window.
    pub window: ValidityWindow,
}
