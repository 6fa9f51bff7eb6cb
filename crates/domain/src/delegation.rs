//! User-to-user delegation of a scoped subset of access.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use warden_core::{AppError, AppResult};

use crate::{AssignmentKey, GrantId, ReferenceColumn, TemporalAssignment, UserId, ValidityWindow};

/// Actions covered by the `read_only` scope tag.
pub const READ_ONLY_ACTIONS: &[&str] = &["read", "list", "view"];

const ACTIONS_TAG_PREFIX: &str = "actions:";

/// Which actions a delegation passes on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DelegationScope {
    /// Every action the delegator holds.
    Full,
    /// Only read-class actions.
    ReadOnly,
    /// An explicit action list.
    Actions(BTreeSet<String>),
}

impl DelegationScope {
    /// Parses a scope tag: `full`, `read_only` or `actions:<a>,<b>`.
    pub fn parse(tag: &str) -> AppResult<Self> {
        match tag.trim() {
            "full" => Ok(Self::Full),
            "read_only" => Ok(Self::ReadOnly),
            other => {
                let Some(list) = other.strip_prefix(ACTIONS_TAG_PREFIX) else {
                    return Err(AppError::Validation(format!(
                        "unknown delegation scope '{other}'"
                    )));
                };

                let actions = list
                    .split(',')
                    .map(str::trim)
                    .filter(|action| !action.is_empty())
                    .map(str::to_owned)
                    .collect::<BTreeSet<_>>();

                if actions.is_empty() {
                    return Err(AppError::Validation(
                        "delegation scope 'actions:' must list at least one action".to_owned(),
                    ));
                }

                Ok(Self::Actions(actions))
            }
        }
    }

    /// Returns the canonical scope tag.
    #[must_use]
    pub fn tag(&self) -> String {
        match self {
            Self::Full => "full".to_owned(),
            Self::ReadOnly => "read_only".to_owned(),
            Self::Actions(actions) => format!(
                "{ACTIONS_TAG_PREFIX}{}",
                actions.iter().cloned().collect::<Vec<_>>().join(",")
            ),
        }
    }

    /// Returns whether the scope passes on the action.
    #[must_use]
    pub fn allows_action(&self, action: &str) -> bool {
        match self {
            Self::Full => true,
            Self::ReadOnly => READ_ONLY_ACTIONS.contains(&action),
            Self::Actions(actions) => actions.contains(action),
        }
    }
}

/// Temporal link: delegator shares part of its own access with delegatee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegation {
    /// Row id.
    pub id: GrantId,
    /// Delegating user.
    pub delegator_id: UserId,
    /// Receiving user.
    pub delegatee_id: UserId,
    /// Actions passed on.
    pub scope: DelegationScope,
    /// Optional resource-type restriction.
    pub resource_type: Option<String>,
    /// Optional resource-instance restriction.
    pub resource_ids: Option<Vec<String>>,
    /// `granted_at` is valid-from, `expires_at` is valid-until.
    pub window: ValidityWindow,
    /// Granting actor.
    pub granted_by: UserId,
}

impl Delegation {
    /// Returns whether the scope tag and type restriction pass the action.
    ///
    /// Activeness and instance restrictions are checked separately.
    #[must_use]
    pub fn admits(&self, resource_type: &str, action: &str) -> bool {
        self.scope.allows_action(action)
            && self
                .resource_type
                .as_deref()
                .is_none_or(|restricted| restricted == resource_type)
    }
}

impl TemporalAssignment for Delegation {
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
        AssignmentKey::Delegation {
            delegator_id: self.delegator_id,
            delegatee_id: self.delegatee_id,
            scope_tag: self.scope.tag(),
        }
    }

    fn reference(&self, column: ReferenceColumn) -> Option<Uuid> {
        match column {
            ReferenceColumn::Delegator => Some(self.delegator_id.as_uuid()),
            ReferenceColumn::Delegatee => Some(self.delegatee_id.as_uuid()),
            _ => None,
        }
    }
}
