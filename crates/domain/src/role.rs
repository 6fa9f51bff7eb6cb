//! Role and permission definitions.

use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use warden_core::{AppError, AppResult, NonEmptyString};

use crate::{GovernanceTier, PermissionId, RoleId, SoftDeletion, UserId};

/// Named bundle of permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Role id.
    pub id: RoleId,
    /// Unique name among non-deleted roles.
    pub name: NonEmptyString,
    /// Governance tier.
    pub tier: GovernanceTier,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
    /// Creating actor. Seeded roles carry the bootstrap user.
    pub created_by: UserId,
    /// Soft-delete stamp.
    pub deletion: Option<SoftDeletion>,
}

impl Role {
    /// Returns whether the role is soft-deleted.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deletion.is_some()
    }
}

/// `resource-type:action` pair naming an atomic capability.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PermissionKey {
    resource_type: String,
    action: String,
}

impl PermissionKey {
    /// Creates a validated permission key.
    pub fn new(resource_type: impl Into<String>, action: impl Into<String>) -> AppResult<Self> {
        let resource_type = normalize_segment(resource_type.into(), "resource type")?;
        let action = normalize_segment(action.into(), "action")?;

        Ok(Self {
            resource_type,
            action,
        })
    }

    /// Parses the `resource-type:action` transport form.
    pub fn parse(value: &str) -> AppResult<Self> {
        let Some((resource_type, action)) = value.split_once(':') else {
            return Err(AppError::Validation(format!(
                "permission '{value}' must have the form 'resource_type:action'"
            )));
        };

        Self::new(resource_type, action)
    }

    /// Returns the resource type.
    #[must_use]
    pub fn resource_type(&self) -> &str {
        self.resource_type.as_str()
    }

    /// Returns the action.
    #[must_use]
    pub fn action(&self) -> &str {
        self.action.as_str()
    }
}

impl Display for PermissionKey {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}:{}", self.resource_type, self.action)
    }
}

fn normalize_segment(value: String, label: &str) -> AppResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{label} must not be empty")));
    }

    if trimmed.contains(':') || trimmed.chars().any(char::is_whitespace) {
        return Err(AppError::Validation(format!(
            "{label} '{trimmed}' must not contain ':' or whitespace"
        )));
    }

    Ok(trimmed.to_owned())
}

/// Atomic capability definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    /// Permission id.
    pub id: PermissionId,
    /// Resource type and action.
    pub key: PermissionKey,
    /// Governance tier. Never protected.
    pub tier: GovernanceTier,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
    /// Creating actor. Seeded permissions carry the bootstrap user.
    pub created_by: UserId,
    /// Soft-delete stamp.
    pub deletion: Option<SoftDeletion>,
}

impl Permission {
    /// Returns whether the permission is soft-deleted.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deletion.is_some()
    }
}
