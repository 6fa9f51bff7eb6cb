//! Append-only audit vocabulary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use warden_core::AppError;

use crate::{AuditRecordId, UserId};

/// Audited action names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditAction {
    /// An access-control decision was evaluated.
    #[serde(rename = "access.evaluated")]
    AccessEvaluated,
    /// A standalone governance check was evaluated.
    #[serde(rename = "governance.checked")]
    GovernanceChecked,
    /// A role definition was created.
    #[serde(rename = "role.created")]
    RoleCreated,
    /// A role was attached to a parent role.
    #[serde(rename = "role.parent_set")]
    RoleParentSet,
    /// A role was detached from its parent role.
    #[serde(rename = "role.parent_cleared")]
    RoleParentCleared,
    /// A permission definition was created.
    #[serde(rename = "permission.created")]
    PermissionCreated,
    /// A permission was attached to a role.
    #[serde(rename = "role_grant.granted")]
    PermissionGrantedToRole,
    /// A permission was detached from a role.
    #[serde(rename = "role_grant.revoked")]
    PermissionRevokedFromRole,
    /// A role was granted to a user.
    #[serde(rename = "user_role_grant.granted")]
    RoleGrantedToUser,
    /// A role was revoked from a user.
    #[serde(rename = "user_role_grant.revoked")]
    RoleRevokedFromUser,
    /// A resource-instance grant was created.
    #[serde(rename = "resource_grant.granted")]
    ResourceAccessGranted,
    /// A resource-instance grant was revoked.
    #[serde(rename = "resource_grant.revoked")]
    ResourceAccessRevoked,
    /// A delegation was created.
    #[serde(rename = "delegation.granted")]
    DelegationCreated,
    /// A delegation was revoked.
    #[serde(rename = "delegation.revoked")]
    DelegationRevoked,
    /// A user was created or resolved from the identity provider.
    #[serde(rename = "user.synced")]
    UserSynced,
    /// A user, role or permission was soft-deleted with its dependents.
    #[serde(rename = "entity.soft_deleted")]
    EntitySoftDeleted,
    /// The audit log was read.
    #[serde(rename = "audit.read")]
    AuditRead,
    /// The protected root role was seeded out-of-band.
    #[serde(rename = "root.seeded")]
    RootSeeded,
}

impl AuditAction {
    /// Returns a stable storage value for this action.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccessEvaluated => "access.evaluated",
            Self::GovernanceChecked => "governance.checked",
            Self::RoleCreated => "role.created",
            Self::RoleParentSet => "role.parent_set",
            Self::RoleParentCleared => "role.parent_cleared",
            Self::PermissionCreated => "permission.created",
            Self::PermissionGrantedToRole => "role_grant.granted",
            Self::PermissionRevokedFromRole => "role_grant.revoked",
            Self::RoleGrantedToUser => "user_role_grant.granted",
            Self::RoleRevokedFromUser => "user_role_grant.revoked",
            Self::ResourceAccessGranted => "resource_grant.granted",
            Self::ResourceAccessRevoked => "resource_grant.revoked",
            Self::DelegationCreated => "delegation.granted",
            Self::DelegationRevoked => "delegation.revoked",
            Self::UserSynced => "user.synced",
            Self::EntitySoftDeleted => "entity.soft_deleted",
            Self::AuditRead => "audit.read",
            Self::RootSeeded => "root.seeded",
        }
    }

    fn all() -> &'static [Self] {
        const ALL: &[AuditAction] = &[
            AuditAction::AccessEvaluated,
            AuditAction::GovernanceChecked,
            AuditAction::RoleCreated,
            AuditAction::RoleParentSet,
            AuditAction::RoleParentCleared,
            AuditAction::PermissionCreated,
            AuditAction::PermissionGrantedToRole,
            AuditAction::PermissionRevokedFromRole,
            AuditAction::RoleGrantedToUser,
            AuditAction::RoleRevokedFromUser,
            AuditAction::ResourceAccessGranted,
            AuditAction::ResourceAccessRevoked,
            AuditAction::DelegationCreated,
            AuditAction::DelegationRevoked,
            AuditAction::UserSynced,
            AuditAction::EntitySoftDeleted,
            AuditAction::AuditRead,
            AuditAction::RootSeeded,
        ];

        ALL
    }
}

impl std::str::FromStr for AuditAction {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|action| action.as_str() == value)
            .ok_or_else(|| AppError::Validation(format!("unknown audit action '{value}'")))
    }
}

/// Outcome recorded on an audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Access granted or mutation applied.
    Granted,
    /// Access denied or mutation rejected.
    Denied,
}

impl Decision {
    /// Returns a stable storage value for this decision.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Granted => "granted",
            Self::Denied => "denied",
        }
    }
}

impl std::str::FromStr for Decision {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "granted" => Ok(Self::Granted),
            "denied" => Ok(Self::Denied),
            _ => Err(AppError::Validation(format!(
                "unknown decision '{value}'"
            ))),
        }
    }
}

/// Audit entry submitted for recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Instant the audited event happened.
    pub recorded_at: DateTime<Utc>,
    /// Acting user. `None` for system actions.
    pub actor: Option<UserId>,
    /// Audited action.
    pub action: AuditAction,
    /// Resource type touched.
    pub resource_type: String,
    /// Resource id touched.
    pub resource_id: String,
    /// Outcome.
    pub decision: Decision,
    /// Stable reason code for denials.
    pub reason: Option<String>,
    /// Structured detail such as contributing grants or cascade counts.
    pub context: Value,
    /// Caller-supplied key making the entry idempotent.
    pub idempotency_key: Option<String>,
}

impl AuditEntry {
    /// Creates a granted entry with an empty context.
    #[must_use]
    pub fn granted(
        recorded_at: DateTime<Utc>,
        actor: Option<UserId>,
        action: AuditAction,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        Self {
            recorded_at,
            actor,
            action,
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
            decision: Decision::Granted,
            reason: None,
            context: Value::Null,
            idempotency_key: None,
        }
    }

    /// Turns the entry into a denial with the given reason code.
    #[must_use]
    pub fn denied(mut self, reason: impl Into<String>) -> Self {
        self.decision = Decision::Denied;
        self.reason = Some(reason.into());
        self
    }

    /// Attaches structured context.
    #[must_use]
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    /// Attaches an idempotency key.
    #[must_use]
    pub fn with_idempotency_key(mut self, idempotency_key: Option<String>) -> Self {
        self.idempotency_key = idempotency_key;
        self
    }
}

/// Committed, immutable audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Record id.
    pub id: AuditRecordId,
    /// Recorded entry.
    #[serde(flatten)]
    pub entry: AuditEntry,
}

/// Filter for reading the audit log, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditQuery {
    /// Only records of this actor.
    pub actor: Option<UserId>,
    /// Only records of this action.
    pub action: Option<AuditAction>,
    /// Only records at or after this instant.
    pub from: Option<DateTime<Utc>>,
    /// Only records before this instant.
    pub until: Option<DateTime<Utc>>,
    /// Maximum number of records.
    pub limit: usize,
}

impl AuditQuery {
    /// Returns whether a record passes every filter except the limit.
    #[must_use]
    pub fn matches(&self, record: &AuditRecord) -> bool {
        let entry = &record.entry;
        self.actor.is_none_or(|actor| entry.actor == Some(actor))
            && self.action.is_none_or(|action| entry.action == action)
            && self.from.is_none_or(|from| entry.recorded_at >= from)
            && self.until.is_none_or(|until| entry.recorded_at < until)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chrono::{Duration, TimeZone, Utc};

    use super::{AuditAction, AuditEntry, AuditQuery, AuditRecord, Decision};
    use crate::{AuditRecordId, UserId};

    #[test]
    fn action_storage_value_matches_serde_name() {
        for action in AuditAction::all() {
            let serialized = serde_json::to_value(action).unwrap_or_default();
            assert_eq!(serialized.as_str(), Some(action.as_str()));
            assert_eq!(AuditAction::from_str(action.as_str()).ok(), Some(*action));
        }
    }

    #[test]
    fn denied_entry_carries_reason_code() {
        let at = Utc::now();
        let entry = AuditEntry::granted(at, None, AuditAction::RoleGrantedToUser, "role", "r-1")
            .denied("protected_role");
        assert_eq!(entry.decision, Decision::Denied);
        assert_eq!(entry.reason.as_deref(), Some("protected_role"));
    }

    #[test]
    fn query_filters_by_actor_and_window() {
        let at = Utc
            .with_ymd_and_hms(2024, 3, 1, 12, 0, 0)
            .single()
            .unwrap_or_else(|| panic!("fixed instant is valid"));
        let actor = UserId::new();
        let record = AuditRecord {
            id: AuditRecordId::new(),
            entry: AuditEntry::granted(
                at,
                Some(actor),
                AuditAction::AccessEvaluated,
                "accounts",
                "acc-1",
            ),
        };

        let mut query = AuditQuery {
            actor: Some(actor),
            from: Some(at),
            until: Some(at + Duration::seconds(1)),
            limit: 10,
            ..AuditQuery::default()
        };
        assert!(query.matches(&record));

        query.until = Some(at);
        assert!(!query.matches(&record));

        query.until = None;
        query.actor = Some(UserId::new());
        assert!(!query.matches(&record));
    }
}
