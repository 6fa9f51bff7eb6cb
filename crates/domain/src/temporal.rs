//! Validity windows shared by every temporal assignment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use warden_core::{AppError, AppResult};

use crate::UserId;

/// Revocation stamp. Once set on a row it is never cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revocation {
    /// Instant the row stopped being active.
    pub revoked_at: DateTime<Utc>,
    /// Actor that revoked the row.
    pub revoked_by: UserId,
}

/// Soft-delete stamp on users, roles and permissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftDeletion {
    /// Instant the entity was deleted.
    pub deleted_at: DateTime<Utc>,
    /// Actor that deleted the entity.
    pub deleted_by: UserId,
}

/// Start, optional expiry and optional revocation of a temporal assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidityWindow {
    /// Instant the assignment starts applying.
    pub granted_at: DateTime<Utc>,
    /// Instant the assignment stops applying on its own.
    pub expires_at: Option<DateTime<Utc>>,
    /// Revocation stamp, when revoked.
    pub revocation: Option<Revocation>,
}

impl ValidityWindow {
    /// Creates an unrevoked window.
    pub fn new(granted_at: DateTime<Utc>, expires_at: Option<DateTime<Utc>>) -> AppResult<Self> {
        if let Some(expires_at) = expires_at
            && expires_at <= granted_at
        {
            return Err(AppError::Validation(format!(
                "expires_at '{expires_at}' must be after granted_at '{granted_at}'"
            )));
        }

        Ok(Self {
            granted_at,
            expires_at,
            revocation: None,
        })
    }

    /// Returns whether the assignment applies at `at`.
    ///
    /// Active iff `granted_at <= at`, not revoked at or before `at`, and not
    /// expired at or before `at`.
    #[must_use]
    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        self.granted_at <= at
            && self
                .revocation
                .is_none_or(|revocation| revocation.revoked_at > at)
            && self.expires_at.is_none_or(|expires_at| expires_at > at)
    }

    /// Returns whether the row still counts against the one-unrevoked-row-per-key rule.
    #[must_use]
    pub fn is_unrevoked(&self) -> bool {
        self.revocation.is_none()
    }

    /// Returns whether the row is unrevoked but has run past its expiry at `at`.
    #[must_use]
    pub fn is_lapsed_at(&self, at: DateTime<Utc>) -> bool {
        self.revocation.is_none() && self.expires_at.is_some_and(|expires_at| expires_at <= at)
    }

    /// Builds the revocation stamp for revoking this row at `at`.
    pub fn revocation_at(&self, at: DateTime<Utc>, revoked_by: UserId) -> AppResult<Revocation> {
        if self.revocation.is_some() {
            return Err(AppError::NotFound(
                "assignment is already revoked".to_owned(),
            ));
        }

        if at < self.granted_at {
            return Err(AppError::Validation(format!(
                "revocation instant '{at}' precedes granted_at '{}'",
                self.granted_at
            )));
        }

        Ok(Revocation {
            revoked_at: at,
            revoked_by,
        })
    }

    /// Clamps a cascade revocation so it never precedes the row's grant instant.
    #[must_use]
    pub fn clamp_revocation(&self, revocation: Revocation) -> Revocation {
        Revocation {
            revoked_at: revocation.revoked_at.max(self.granted_at),
            ..revocation
        }
    }

    /// Builds the stamp a cascade writes on this unrevoked row, and whether the
    /// cascade cut the row short.
    ///
    /// Rows already lapsed at the cascade instant are sealed at their own expiry
    /// and are not reported as revoked.
    #[must_use]
    pub fn cascade_stamp(&self, revocation: Revocation) -> (Revocation, bool) {
        if self.is_lapsed_at(revocation.revoked_at)
            && let Some(sealed) = self.seal(revocation.revoked_by)
        {
            return (sealed, false);
        }

        (self.clamp_revocation(revocation), true)
    }

    /// Builds the stamp that closes a lapsed row at its own expiry.
    ///
    /// Sealing leaves the active interval unchanged.
    #[must_use]
    pub fn seal(&self, sealed_by: UserId) -> Option<Revocation> {
        match (self.revocation, self.expires_at) {
            (None, Some(expires_at)) => Some(Revocation {
                revoked_at: expires_at,
                revoked_by: sealed_by,
            }),
            _ => None,
        }
    }
}
