//! Role inheritance graph at one instant.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use warden_core::{AppError, AppResult};

use crate::{RoleId, RoleParentLink, TemporalAssignment};

/// Parent links selected by instant or by revocation state. Kept acyclic by write-time checks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleHierarchy {
    parents: HashMap<RoleId, RoleId>,
}

impl RoleHierarchy {
    /// Builds the hierarchy from the links active at `at`.
    pub fn active_at<'a>(
        links: impl IntoIterator<Item = &'a RoleParentLink>,
        at: DateTime<Utc>,
    ) -> AppResult<Self> {
        Self::build(links.into_iter().filter(|link| link.is_active_at(at)))
    }

    /// Builds the hierarchy from every unrevoked link, including future-dated ones.
    pub fn unrevoked<'a>(links: impl IntoIterator<Item = &'a RoleParentLink>) -> AppResult<Self> {
        Self::build(links.into_iter().filter(|link| link.window.is_unrevoked()))
    }

    fn build<'a>(links: impl Iterator<Item = &'a RoleParentLink>) -> AppResult<Self> {
        let mut parents = HashMap::new();
        for link in links {
            if parents.insert(link.role_id, link.parent_role_id).is_some() {
                return Err(AppError::InvariantViolation(format!(
                    "role '{}' has more than one current parent",
                    link.role_id
                )));
            }
        }

        Ok(Self { parents })
    }

    /// Returns the active parent of a role.
    #[must_use]
    pub fn parent_of(&self, role_id: RoleId) -> Option<RoleId> {
        self.parents.get(&role_id).copied()
    }

    /// Returns the role followed by its ancestors, nearest first.
    ///
    /// A cycle here means the store was written around the write-time check.
    pub fn lineage(&self, role_id: RoleId) -> AppResult<Vec<RoleId>> {
        let mut lineage = vec![role_id];
        let mut seen = HashSet::from([role_id]);
        let mut current = role_id;

        while let Some(parent) = self.parent_of(current) {
            if !seen.insert(parent) {
                return Err(AppError::InvariantViolation(format!(
                    "role hierarchy contains a cycle through role '{parent}'"
                )));
            }
            lineage.push(parent);
            current = parent;
        }

        Ok(lineage)
    }

    /// Returns whether making `parent` the parent of `child` would close a cycle.
    #[must_use]
    pub fn would_create_cycle(&self, child: RoleId, parent: RoleId) -> bool {
        if child == parent {
            return true;
        }

        let mut seen = HashSet::from([parent]);
        let mut current = parent;
        while let Some(next) = self.parent_of(current) {
            if next == child {
                return true;
            }
            if !seen.insert(next) {
                return true;
            }
            current = next;
        }

        false
    }
}
