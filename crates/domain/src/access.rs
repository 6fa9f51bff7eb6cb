//! Access requests, effective permissions and their provenance.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AuditRecordId, Decision, Delegation, GrantId, PermissionId, RoleId, UserId};

/// One access-control question at an explicit instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRequest {
    /// Subject.
    pub user_id: UserId,
    /// Resource type.
    pub resource_type: String,
    /// Resource instance. `None` for type-level actions such as `create`.
    pub resource_id: Option<String>,
    /// Action.
    pub action: String,
    /// Instant the question is asked for.
    pub at: DateTime<Utc>,
}

/// Grant that made a permission effective.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ContributingGrant {
    /// Permission inherited through a user-role grant.
    Role {
        /// User-role grant row.
        user_role_grant_id: GrantId,
        /// Role the user holds.
        role_id: RoleId,
        /// Role holding the permission: the held role or one of its ancestors.
        granting_role_id: RoleId,
        /// Role grant row.
        role_grant_id: GrantId,
        /// Permission.
        permission_id: PermissionId,
    },
    /// Fine-grained grant on one resource instance.
    Resource {
        /// Resource grant row.
        resource_grant_id: GrantId,
    },
    /// Delegator's direct grant passed on through a delegation.
    Delegated {
        /// Delegation row.
        delegation_id: GrantId,
        /// Delegating user.
        delegator_id: UserId,
        /// Delegator's own grant.
        grant: Box<ContributingGrant>,
    },
}

impl ContributingGrant {
    /// Returns whether the grant came through a delegation.
    #[must_use]
    pub fn is_delegated(&self) -> bool {
        matches!(self, Self::Delegated { .. })
    }
}

/// Resource instances a permission applies to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "resource_ids", rename_all = "snake_case")]
pub enum ResourceScope {
    /// Every instance of the resource type.
    Any,
    /// Only the listed instances.
    Only(BTreeSet<String>),
}

impl ResourceScope {
    /// Scope restricted to one instance.
    #[must_use]
    pub fn single(resource_id: impl Into<String>) -> Self {
        Self::Only(BTreeSet::from([resource_id.into()]))
    }

    /// Returns whether the scope admits the requested instance.
    #[must_use]
    pub fn admits(&self, resource_id: Option<&str>) -> bool {
        match self {
            Self::Any => true,
            Self::Only(ids) => resource_id.is_some_and(|id| ids.contains(id)),
        }
    }

    /// Narrows the scope to an optional instance list. `None` when nothing remains.
    #[must_use]
    pub fn narrow(&self, restriction: Option<&[String]>) -> Option<Self> {
        let Some(restriction) = restriction else {
            return Some(self.clone());
        };

        let narrowed = match self {
            Self::Any => restriction.iter().cloned().collect::<BTreeSet<_>>(),
            Self::Only(ids) => restriction
                .iter()
                .filter(|id| ids.contains(id.as_str()))
                .cloned()
                .collect(),
        };

        (!narrowed.is_empty()).then_some(Self::Only(narrowed))
    }
}

/// One effective `(resource type, action, scope)` with the grant behind it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EffectivePermission {
    /// Resource type.
    pub resource_type: String,
    /// Action.
    pub action: String,
    /// Instances covered.
    pub scope: ResourceScope,
    /// Provenance.
    pub source: ContributingGrant,
}

impl EffectivePermission {
    /// Returns whether this permission answers the request shape.
    #[must_use]
    pub fn answers(&self, resource_type: &str, resource_id: Option<&str>, action: &str) -> bool {
        self.resource_type == resource_type && self.action == action && self.scope.admits(resource_id)
    }

    /// Passes this direct permission on through a delegation, if the delegation admits it.
    #[must_use]
    pub fn delegated_through(&self, delegation: &Delegation) -> Option<Self> {
        if self.source.is_delegated() || !delegation.admits(&self.resource_type, &self.action) {
            return None;
        }

        let scope = self.scope.narrow(delegation.resource_ids.as_deref())?;
        Some(Self {
            resource_type: self.resource_type.clone(),
            action: self.action.clone(),
            scope,
            source: ContributingGrant::Delegated {
                delegation_id: delegation.id,
                delegator_id: delegation.delegator_id,
                grant: Box::new(self.source.clone()),
            },
        })
    }
}

/// Deterministically ordered set of effective permissions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EffectivePermissionSet(Vec<EffectivePermission>);

impl EffectivePermissionSet {
    /// Builds a sorted, deduplicated set.
    #[must_use]
    pub fn from_permissions(permissions: impl IntoIterator<Item = EffectivePermission>) -> Self {
        let mut permissions = permissions.into_iter().collect::<Vec<_>>();
        permissions.sort();
        permissions.dedup();
        Self(permissions)
    }

    /// Returns every grant answering the request shape.
    #[must_use]
    pub fn contributing(
        &self,
        resource_type: &str,
        resource_id: Option<&str>,
        action: &str,
    ) -> Vec<ContributingGrant> {
        self.0
            .iter()
            .filter(|permission| permission.answers(resource_type, resource_id, action))
            .map(|permission| permission.source.clone())
            .collect()
    }

    /// Returns the distinct `(resource type, action)` pairs.
    #[must_use]
    pub fn keys(&self) -> BTreeSet<(String, String)> {
        self.0
            .iter()
            .map(|permission| (permission.resource_type.clone(), permission.action.clone()))
            .collect()
    }

    /// Iterates permissions in order.
    pub fn iter(&self) -> impl Iterator<Item = &EffectivePermission> {
        self.0.iter()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Outcome of an evaluated access request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDecision {
    /// Granted when at least one grant answers the request.
    pub decision: Decision,
    /// Every grant that answered the request.
    pub contributing_grants: Vec<ContributingGrant>,
    /// Audit record written for this evaluation.
    pub audit_record_id: AuditRecordId,
}

impl AccessDecision {
    /// Returns whether access was granted.
    #[must_use]
    pub fn is_granted(&self) -> bool {
        self.decision == Decision::Granted
    }
}
