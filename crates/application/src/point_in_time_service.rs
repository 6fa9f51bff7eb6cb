use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use warden_core::{AppError, AppResult};
use warden_domain::{EffectivePermissionSet, UserId};

use crate::{AssignmentHistory, AssignmentStore, EngineConfig, resolver};

/// Answers historical questions from stored assignment history.
///
/// Every answer is a pure function of the stored rows and the instant; nothing
/// here writes to the store.
#[derive(Clone)]
pub struct PointInTimeService {
    store: Arc<dyn AssignmentStore>,
    config: EngineConfig,
}

impl PointInTimeService {
    /// Creates a service over the assignment store.
    #[must_use]
    pub fn new(store: Arc<dyn AssignmentStore>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// Returns the permissions the user held at `at`, soft-deleted users included.
    pub async fn effective_permissions_at(
        &self,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> AppResult<EffectivePermissionSet> {
        let mut snapshot = self.store.snapshot().await?;
        if snapshot.find_user(user_id).await?.is_none() {
            return Err(AppError::NotFound(format!("user '{user_id}' does not exist")));
        }

        let permissions =
            resolver::effective_permissions(snapshot.as_mut(), user_id, at, self.config).await?;
        debug!(%user_id, %at, count = permissions.len(), "resolved historical permissions");
        Ok(permissions)
    }

    /// Returns every assignment row that ever touched the user.
    pub async fn assignment_history(&self, user_id: UserId) -> AppResult<AssignmentHistory> {
        let mut snapshot = self.store.snapshot().await?;
        let user = snapshot
            .find_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user '{user_id}' does not exist")))?;

        Ok(AssignmentHistory {
            user,
            user_role_grants: snapshot.user_role_grants_for_user(user_id).await?,
            resource_grants: snapshot.resource_grants_for_user(user_id).await?,
            delegations: snapshot.delegations_involving(user_id).await?,
        })
    }
}
