//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod access;
mod audit;
mod cascade;
mod delegation;
mod governance;
mod grants;
mod hierarchy;
mod ids;
mod role;
mod temporal;
mod user;

pub use access::{
    AccessDecision, AccessRequest, ContributingGrant, EffectivePermission,
    EffectivePermissionSet, ResourceScope,
};
pub use audit::{AuditAction, AuditEntry, AuditQuery, AuditRecord, Decision};
pub use cascade::{CascadeRule, EntityKind, ReferenceColumn, cascade_rules};
pub use delegation::{Delegation, DelegationScope, READ_ONLY_ACTIONS};
pub use governance::{
    Capability, CapabilitySet, DenialReason, GOVERNANCE_RESOURCE_TYPE, GovernanceDecision,
    GovernanceOperation, GovernanceTarget, GovernanceTier, ROOT_ROLE_NAME, decide,
};
pub use grants::{
    AssignmentKey, AssignmentKind, ResourceGrant, RoleGrant, RoleParentLink, TemporalAssignment,
    UnrevokedAssignment, UserRoleGrant,
};
pub use hierarchy::RoleHierarchy;
pub use ids::{AuditRecordId, GrantId, PermissionId, RoleId, UserId};
pub use role::{Permission, PermissionKey, Role};
pub use temporal::{Revocation, SoftDeletion, ValidityWindow};
pub use user::User;
