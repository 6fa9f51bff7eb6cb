//! Governance tiers, capabilities and the rules deciding governed mutations.

use std::collections::BTreeSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use warden_core::AppError;

/// Resource type reserved for governance capabilities.
pub const GOVERNANCE_RESOURCE_TYPE: &str = "governance";

/// Name of the single reserved root role.
pub const ROOT_ROLE_NAME: &str = "root";

/// Classification controlling who may grant or revoke a role or permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GovernanceTier {
    /// Ordinary assignments.
    Basic,
    /// Assignments that require the elevated-assignment capability.
    Elevated,
    /// The reserved root role. Never mutable through the engine.
    Protected,
}

impl GovernanceTier {
    /// Returns a stable storage value for this tier.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Elevated => "elevated",
            Self::Protected => "protected",
        }
    }

    /// Returns the stricter of two tiers.
    #[must_use]
    pub fn strictest(self, other: Self) -> Self {
        self.max(other)
    }
}

impl FromStr for GovernanceTier {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "basic" => Ok(Self::Basic),
            "elevated" => Ok(Self::Elevated),
            "protected" => Ok(Self::Protected),
            _ => Err(AppError::Validation(format!(
                "unknown governance tier '{value}'"
            ))),
        }
    }
}

/// Governance capabilities, held as `governance:<action>` permissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Allows granting and revoking basic-tier assignments.
    AssignBasic,
    /// Allows granting and revoking elevated-tier assignments. Implies basic.
    AssignElevated,
    /// Allows creating, modifying and deleting role and permission definitions.
    DefineRoles,
    /// Allows soft-deleting users.
    ManageUsers,
    /// Allows reading the audit log.
    ReadAudit,
}

impl Capability {
    /// Returns the permission action carrying this capability.
    #[must_use]
    pub fn action(&self) -> &'static str {
        match self {
            Self::AssignBasic => "assign_basic",
            Self::AssignElevated => "assign_elevated",
            Self::DefineRoles => "define_roles",
            Self::ManageUsers => "manage_users",
            Self::ReadAudit => "read_audit",
        }
    }

    /// Returns every capability.
    #[must_use]
    pub fn all() -> &'static [Self] {
        const ALL: &[Capability] = &[
            Capability::AssignBasic,
            Capability::AssignElevated,
            Capability::DefineRoles,
            Capability::ManageUsers,
            Capability::ReadAudit,
        ];

        ALL
    }

    /// Maps a permission to the capability it carries, if any.
    #[must_use]
    pub fn from_permission(resource_type: &str, action: &str) -> Option<Self> {
        if resource_type != GOVERNANCE_RESOURCE_TYPE {
            return None;
        }

        Self::all()
            .iter()
            .copied()
            .find(|capability| capability.action() == action)
    }
}

/// Capabilities an actor holds at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilitySet(BTreeSet<Capability>);

impl CapabilitySet {
    /// Builds a set from capabilities.
    #[must_use]
    pub fn from_capabilities(capabilities: impl IntoIterator<Item = Capability>) -> Self {
        Self(capabilities.into_iter().collect())
    }

    /// Returns whether the set carries the capability directly.
    #[must_use]
    pub fn contains(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    /// Returns whether assignments of the given non-protected tier are allowed.
    #[must_use]
    pub fn can_assign(&self, tier: GovernanceTier) -> bool {
        match tier {
            GovernanceTier::Basic => {
                self.contains(Capability::AssignBasic) || self.contains(Capability::AssignElevated)
            }
            GovernanceTier::Elevated => self.contains(Capability::AssignElevated),
            GovernanceTier::Protected => false,
        }
    }
}

/// Mutation kinds checked by governance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GovernanceOperation {
    /// Creates an assignment.
    Grant,
    /// Revokes an assignment.
    Revoke,
    /// Creates or modifies a definition.
    Define,
    /// Soft-deletes an entity.
    Delete,
    /// Reads governed data such as the audit log.
    Read,
}

impl GovernanceOperation {
    /// Returns a stable storage value for this operation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Grant => "grant",
            Self::Revoke => "revoke",
            Self::Define => "define",
            Self::Delete => "delete",
            Self::Read => "read",
        }
    }
}

/// What a governed mutation touches, already resolved to its tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GovernanceTarget {
    /// A role or permission assignment of the given tier.
    Assignment(GovernanceTier),
    /// A role or permission definition. `None` for definitions that do not exist yet.
    Definition(Option<GovernanceTier>),
    /// Role composition: attaching a permission to a role or linking a role to a
    /// parent. The tier is the strictest of both sides.
    Composition(GovernanceTier),
    /// A user lifecycle change. `holds_protected_role` is evaluated at the operation instant.
    UserLifecycle {
        /// Whether the user currently holds the protected role.
        holds_protected_role: bool,
    },
    /// A delegation. `on_own_behalf` is true when the actor is the delegator.
    Delegation {
        /// Whether the actor delegates its own access.
        on_own_behalf: bool,
    },
    /// A read of the audit log.
    AuditRead,
}

/// Stable reason codes for governance denials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    /// The target is the protected root role.
    ProtectedRole,
    /// The actor lacks the required capability.
    InsufficientCapability,
    /// The role parent assignment would create a cycle.
    CyclicRoleParent,
}

impl DenialReason {
    /// Returns the stable reason code.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProtectedRole => "protected_role",
            Self::InsufficientCapability => "insufficient_capability",
            Self::CyclicRoleParent => "cyclic_role_parent",
        }
    }
}

impl FromStr for DenialReason {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "protected_role" => Ok(Self::ProtectedRole),
            "insufficient_capability" => Ok(Self::InsufficientCapability),
            "cyclic_role_parent" => Ok(Self::CyclicRoleParent),
            _ => Err(AppError::Validation(format!(
                "unknown denial reason '{value}'"
            ))),
        }
    }
}

/// Outcome of a governance check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GovernanceDecision {
    /// The mutation may proceed.
    Allowed,
    /// The mutation is rejected.
    Denied(DenialReason),
}

impl GovernanceDecision {
    /// Returns whether the decision allows the mutation.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Decides a governance check from the actor's capabilities and the resolved target.
///
/// The operation does not change the outcome: granting and revoking the same
/// target need the same capability. Elevated definitions and compositions also
/// need the elevated-assignment capability, so defining roles never widens what
/// an actor may assign.
#[must_use]
pub fn decide(
    capabilities: &CapabilitySet,
    target: GovernanceTarget,
    _operation: GovernanceOperation,
) -> GovernanceDecision {
    let allowed = match target {
        GovernanceTarget::Assignment(GovernanceTier::Protected)
        | GovernanceTarget::Definition(Some(GovernanceTier::Protected))
        | GovernanceTarget::Composition(GovernanceTier::Protected)
        | GovernanceTarget::UserLifecycle {
            holds_protected_role: true,
        } => return GovernanceDecision::Denied(DenialReason::ProtectedRole),
        GovernanceTarget::Assignment(tier) => capabilities.can_assign(tier),
        GovernanceTarget::Definition(Some(GovernanceTier::Elevated))
        | GovernanceTarget::Composition(GovernanceTier::Elevated) => {
            capabilities.contains(Capability::DefineRoles)
                && capabilities.contains(Capability::AssignElevated)
        }
        GovernanceTarget::Definition(_) | GovernanceTarget::Composition(_) => {
            capabilities.contains(Capability::DefineRoles)
        }
        GovernanceTarget::UserLifecycle { .. } => capabilities.contains(Capability::ManageUsers),
        GovernanceTarget::Delegation { on_own_behalf } => {
            on_own_behalf || capabilities.contains(Capability::AssignElevated)
        }
        GovernanceTarget::AuditRead => capabilities.contains(Capability::ReadAudit),
    };

    if allowed {
        GovernanceDecision::Allowed
    } else {
        GovernanceDecision::Denied(DenialReason::InsufficientCapability)
    }
}
