use super::*;

use warden_domain::{AuditQuery, AuditRecord};

/// Upper bound on records returned by one audit read.
const MAX_AUDIT_PAGE: usize = 500;

impl GovernanceService {
    /// Lists audit records for actors holding the read-audit capability.
    ///
    /// Successful reads are themselves audited.
    pub async fn list_audit_records(
        &self,
        actor: &ActorIdentity,
        mut query: AuditQuery,
        at: DateTime<Utc>,
    ) -> AppResult<Vec<AuditRecord>> {
        query.limit = query.limit.clamp(1, MAX_AUDIT_PAGE);
        let actor_id = UserId::from_uuid(actor.user_id());
        let attempted = AuditEntry::granted(
            at,
            Some(actor_id),
            AuditAction::AuditRead,
            "audit_log",
            "records",
        )
        .with_context(json!({
            "actor_filter": query.actor,
            "action_filter": query.action.map(|action| action.as_str()),
            "limit": query.limit,
        }));

        let mut snapshot = self.store.snapshot().await?;
        let capabilities = resolver::capabilities(snapshot.as_mut(), actor_id, at).await?;
        if let GovernanceDecision::Denied(reason) =
            decide(&capabilities, GovernanceTarget::AuditRead, GovernanceOperation::Read)
        {
            drop(snapshot);
            return Err(self.deny(reason, attempted).await);
        }

        let records = snapshot.list_audit_records(&query).await?;
        drop(snapshot);

        self.audit.record(attempted).await?;
        Ok(records)
    }
}
