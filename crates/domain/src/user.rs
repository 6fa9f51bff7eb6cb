//! Authorization subjects synced from the identity provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use warden_core::NonEmptyString;

use crate::{SoftDeletion, UserId};

/// Authorization subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    id: UserId,
    external_ref: NonEmptyString,
    created_at: DateTime<Utc>,
    deletion: Option<SoftDeletion>,
}

impl User {
    /// Creates a live user for an external identity reference.
    #[must_use]
    pub fn new(id: UserId, external_ref: NonEmptyString, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            external_ref,
            created_at,
            deletion: None,
        }
    }

    /// Rebuilds a user from stored values.
    #[must_use]
    pub fn from_storage(
        id: UserId,
        external_ref: NonEmptyString,
        created_at: DateTime<Utc>,
        deletion: Option<SoftDeletion>,
    ) -> Self {
        Self {
            id,
            external_ref,
            created_at,
            deletion,
        }
    }

    /// Returns the user id.
    #[must_use]
    pub fn id(&self) -> UserId {
        self.id
    }

    /// Returns the identity provider reference.
    #[must_use]
    pub fn external_ref(&self) -> &NonEmptyString {
        &self.external_ref
    }

    /// Returns the sync instant.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the soft-delete stamp, when deleted.
    #[must_use]
    pub fn deletion(&self) -> Option<SoftDeletion> {
        self.deletion
    }

    /// Returns whether the user is soft-deleted.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deletion.is_some()
    }
}
