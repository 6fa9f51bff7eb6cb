use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, info};

use warden_core::{AppError, AppResult};
use warden_domain::{
    AccessDecision, AccessRequest, AuditAction, AuditEntry, Decision, EffectivePermissionSet,
    UserId,
};

use crate::{AssignmentStore, AuditLogWriter, EngineConfig, resolver};

/// Decides access requests from temporal grants.
#[derive(Clone)]
pub struct PermissionEngine {
    store: Arc<dyn AssignmentStore>,
    audit: AuditLogWriter,
    config: EngineConfig,
}

impl PermissionEngine {
    /// Creates an engine over the assignment store.
    #[must_use]
    pub fn new(store: Arc<dyn AssignmentStore>, audit: AuditLogWriter, config: EngineConfig) -> Self {
        Self {
            store,
            audit,
            config,
        }
    }

    /// Evaluates an access request and records exactly one audit entry.
    pub async fn evaluate(&self, request: AccessRequest) -> AppResult<AccessDecision> {
        let contributing_grants = {
            let mut snapshot = self.store.snapshot().await?;
            if snapshot.find_user(request.user_id).await?.is_none() {
                return Err(AppError::NotFound(format!(
                    "user '{}' does not exist",
                    request.user_id
                )));
            }

            resolver::effective_permissions(
                snapshot.as_mut(),
                request.user_id,
                request.at,
                self.config,
            )
            .await?
            .contributing(
                &request.resource_type,
                request.resource_id.as_deref(),
                &request.action,
            )
        };

        let decision = if contributing_grants.is_empty() {
            Decision::Denied
        } else {
            Decision::Granted
        };

        let mut entry = AuditEntry::granted(
            request.at,
            Some(request.user_id),
            AuditAction::AccessEvaluated,
            request.resource_type.clone(),
            request.resource_id.clone().unwrap_or_default(),
        )
        .with_context(json!({
            "action": request.action,
            "contributing_grants": contributing_grants,
        }));
        if decision == Decision::Denied {
            entry = entry.denied("no_matching_grant");
        }

        let record = self.audit.record(entry).await?;

        info!(
            user_id = %request.user_id,
            resource_type = %request.resource_type,
            action = %request.action,
            decision = decision.as_str(),
            grants = contributing_grants.len(),
            "access evaluated"
        );

        Ok(AccessDecision {
            decision,
            contributing_grants,
            audit_record_id: record.id,
        })
    }

    /// Lists a user's effective permissions at an instant. Writes no audit entry.
    pub async fn list_effective_permissions(
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
        debug!(%user_id, %at, count = permissions.len(), "listed effective permissions");
        Ok(permissions)
    }
}
