//! Dependent assignments revoked when an entity is soft-deleted.

use serde::{Deserialize, Serialize};
use warden_core::AppError;

use crate::AssignmentKind;

/// Entities that support soft deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Authorization subject.
    User,
    /// Role definition.
    Role,
    /// Permission definition.
    Permission,
}

impl EntityKind {
    /// Returns a stable storage value for this kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Role => "role",
            Self::Permission => "permission",
        }
    }
}

impl std::str::FromStr for EntityKind {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "user" => Ok(Self::User),
            "role" => Ok(Self::Role),
            "permission" => Ok(Self::Permission),
            _ => Err(AppError::Validation(format!(
                "unknown entity kind '{value}'"
            ))),
        }
    }
}

/// Assignment column referencing a soft-deletable entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceColumn {
    /// `user_id`.
    User,
    /// `role_id`.
    Role,
    /// `parent_role_id`.
    ParentRole,
    /// `permission_id`.
    Permission,
    /// `delegator_id`.
    Delegator,
    /// `delegatee_id`.
    Delegatee,
}

/// One dependent relationship: rows of `assignment` whose `column` points at the entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CascadeRule {
    /// Entity being deleted.
    pub entity: EntityKind,
    /// Dependent table.
    pub assignment: AssignmentKind,
    /// Referencing column.
    pub column: ReferenceColumn,
}

const CASCADE_RULES: &[CascadeRule] = &[
    CascadeRule {
        entity: EntityKind::User,
        assignment: AssignmentKind::UserRoleGrant,
        column: ReferenceColumn::User,
    },
    CascadeRule {
        entity: EntityKind::User,
        assignment: AssignmentKind::ResourceGrant,
        column: ReferenceColumn::User,
    },
    CascadeRule {
        entity: EntityKind::User,
        assignment: AssignmentKind::Delegation,
        column: ReferenceColumn::Delegator,
    },
    CascadeRule {
        entity: EntityKind::User,
        assignment: AssignmentKind::Delegation,
        column: ReferenceColumn::Delegatee,
    },
    CascadeRule {
        entity: EntityKind::Role,
        assignment: AssignmentKind::UserRoleGrant,
        column: ReferenceColumn::Role,
    },
    CascadeRule {
        entity: EntityKind::Role,
        assignment: AssignmentKind::RoleGrant,
        column: ReferenceColumn::Role,
    },
    CascadeRule {
        entity: EntityKind::Role,
        assignment: AssignmentKind::RoleParentLink,
        column: ReferenceColumn::Role,
    },
    CascadeRule {
        entity: EntityKind::Role,
        assignment: AssignmentKind::RoleParentLink,
        column: ReferenceColumn::ParentRole,
    },
    CascadeRule {
        entity: EntityKind::Permission,
        assignment: AssignmentKind::RoleGrant,
        column: ReferenceColumn::Permission,
    },
];

/// Returns the dependent relationships revoked when an entity of `kind` is deleted.
pub fn cascade_rules(kind: EntityKind) -> impl Iterator<Item = &'static CascadeRule> {
    CASCADE_RULES.iter().filter(move |rule| rule.entity == kind)
}
