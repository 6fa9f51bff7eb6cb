use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use warden_application::{AssignmentReader, AssignmentStore, AssignmentTransaction};
use warden_core::{AppError, AppResult};
use warden_domain::{
    AssignmentKey, AssignmentKind, AuditQuery, AuditRecord, CascadeRule, Delegation, EntityKind,
    GrantId, Permission, PermissionId, PermissionKey, ReferenceColumn, ResourceGrant, Revocation,
    Role, RoleGrant, RoleId, RoleParentLink, SoftDeletion, TemporalAssignment,
    UnrevokedAssignment, User, UserId, UserRoleGrant,
};

mod audit_log;
mod state;
mod table;

use audit_log::AuditLog;
use state::StoreState;
use table::AssignmentTable;

/// Failure armed for the next write transaction, used to exercise rollback paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFault {
    /// Fails the cascade step with this zero-based index with `Unavailable`.
    FailCascadeStep(usize),
    /// Fails the commit with `Unavailable` after every write succeeded.
    FailCommit,
}

/// In-memory assignment store with copy-on-write snapshots.
///
/// Committed state is an immutable `Arc` swapped on commit. Writers are
/// serialized by an async mutex held for the whole transaction, so readers
/// never wait on an open writer. Audit records live in a separate
/// append-only log: a transaction buffers its records and publishes them
/// on commit, and a snapshot reads the prefix that existed when it was taken.
#[derive(Clone, Default)]
pub struct InMemoryAssignmentStore {
    shared: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    committed: RwLock<Arc<StoreState>>,
    audit: RwLock<AuditLog>,
    writer: Arc<Mutex<()>>,
    pending_fault: Mutex<Option<InjectedFault>>,
}

impl InMemoryAssignmentStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms a fault for the next write transaction.
    pub async fn inject_fault(&self, fault: InjectedFault) {
        *self.shared.pending_fault.lock().await = Some(fault);
    }

    async fn committed(&self) -> Arc<StoreState> {
        self.shared.committed.read().await.clone()
    }
}

impl Shared {
    /// Publishes a transaction's state and audit records as one version.
    async fn publish(&self, state: Arc<StoreState>, audit: Vec<AuditRecord>) {
        let mut committed = self.committed.write().await;
        if !audit.is_empty() {
            self.audit.write().await.publish(audit);
        }
        *committed = state;
    }
}

#[async_trait]
impl AssignmentStore for InMemoryAssignmentStore {
    async fn snapshot(&self) -> AppResult<Box<dyn AssignmentReader>> {
        let committed = self.shared.committed.read().await;
        let audit_len = self.shared.audit.read().await.len();

        Ok(Box::new(InMemorySnapshot {
            state: committed.clone(),
            shared: self.shared.clone(),
            audit_len,
        }))
    }

    async fn begin(&self) -> AppResult<Box<dyn AssignmentTransaction>> {
        let writer = self.shared.writer.clone().lock_owned().await;
        let fault = self.shared.pending_fault.lock().await.take();

        Ok(Box::new(InMemoryTransaction {
            state: self.committed().await,
            shared: self.shared.clone(),
            pending_audit: Vec::new(),
            fault,
            cascade_steps: 0,
            _writer: writer,
        }))
    }
}

struct InMemorySnapshot {
    state: Arc<StoreState>,
    shared: Arc<Shared>,
    audit_len: usize,
}

impl InMemorySnapshot {
    async fn audit_by_idempotency_key(&self, idempotency_key: &str) -> Option<AuditRecord> {
        self.shared
            .audit
            .read()
            .await
            .by_idempotency_key(idempotency_key, self.audit_len)
    }

    async fn audit_records(&self, query: &AuditQuery) -> Vec<AuditRecord> {
        self.shared
            .audit
            .read()
            .await
            .newest_first(query, self.audit_len)
            .take(query.limit)
            .cloned()
            .collect()
    }
}

struct InMemoryTransaction {
    state: Arc<StoreState>,
    shared: Arc<Shared>,
    pending_audit: Vec<AuditRecord>,
    fault: Option<InjectedFault>,
    cascade_steps: usize,
    _writer: OwnedMutexGuard<()>,
}

impl InMemoryTransaction {
    fn working(&mut self) -> &mut StoreState {
        Arc::make_mut(&mut self.state)
    }

    async fn audit_by_idempotency_key(&self, idempotency_key: &str) -> Option<AuditRecord> {
        if let Some(record) = self
            .pending_audit
            .iter()
            .find(|record| record.entry.idempotency_key.as_deref() == Some(idempotency_key))
        {
            return Some(record.clone());
        }

        let log = self.shared.audit.read().await;
        log.by_idempotency_key(idempotency_key, log.len())
    }

    async fn audit_records(&self, query: &AuditQuery) -> Vec<AuditRecord> {
        let log = self.shared.audit.read().await;
        self.pending_audit
            .iter()
            .rev()
            .filter(|record| query.matches(record))
            .chain(log.newest_first(query, log.len()))
            .take(query.limit)
            .cloned()
            .collect()
    }
}

macro_rules! delegate_reads {
    ($session:ty) => {
        #[async_trait]
        impl AssignmentReader for $session {
            async fn find_user(&mut self, user_id: UserId) -> AppResult<Option<User>> {
                Ok(self.state.user(user_id))
            }

            async fn find_user_by_external_ref(
                &mut self,
                external_ref: &str,
            ) -> AppResult<Option<User>> {
                Ok(self.state.live_user_by_external_ref(external_ref))
            }

            async fn find_role(&mut self, role_id: RoleId) -> AppResult<Option<Role>> {
                Ok(self.state.role(role_id))
            }

            async fn find_role_by_name(&mut self, name: &str) -> AppResult<Option<Role>> {
                Ok(self.state.live_role_by_name(name))
            }

            async fn find_permission(
                &mut self,
                permission_id: PermissionId,
            ) -> AppResult<Option<Permission>> {
                Ok(self.state.permission(permission_id))
            }

            async fn find_permission_by_key(
                &mut self,
                key: &PermissionKey,
            ) -> AppResult<Option<Permission>> {
                Ok(self.state.live_permission_by_key(key))
            }

            async fn permissions_by_ids(
                &mut self,
                permission_ids: &[PermissionId],
            ) -> AppResult<Vec<Permission>> {
                Ok(self.state.permissions_by_ids(permission_ids))
            }

            async fn role_parent_links(&mut self) -> AppResult<Vec<RoleParentLink>> {
                Ok(self.state.role_parent_links())
            }

            async fn role_grants_for_roles(
                &mut self,
                role_ids: &[RoleId],
            ) -> AppResult<Vec<RoleGrant>> {
                Ok(self.state.role_grants_for_roles(role_ids))
            }

            async fn user_role_grants_for_user(
                &mut self,
                user_id: UserId,
            ) -> AppResult<Vec<UserRoleGrant>> {
                Ok(self.state.user_role_grants_for_user(user_id))
            }

            async fn resource_grants_for_user(
                &mut self,
                user_id: UserId,
            ) -> AppResult<Vec<ResourceGrant>> {
                Ok(self.state.resource_grants_for_user(user_id))
            }

            async fn delegations_involving(
                &mut self,
                user_id: UserId,
            ) -> AppResult<Vec<Delegation>> {
                Ok(self.state.delegations_involving(user_id))
            }

            async fn find_unrevoked(
                &mut self,
                key: &AssignmentKey,
            ) -> AppResult<Option<UnrevokedAssignment>> {
                Ok(self.state.find_unrevoked(key))
            }

            async fn find_audit_by_idempotency_key(
                &mut self,
                idempotency_key: &str,
            ) -> AppResult<Option<AuditRecord>> {
                Ok(self.audit_by_idempotency_key(idempotency_key).await)
            }

            async fn list_audit_records(
                &mut self,
                query: &AuditQuery,
            ) -> AppResult<Vec<AuditRecord>> {
                Ok(self.audit_records(query).await)
            }
        }
    };
}

delegate_reads!(InMemorySnapshot);
delegate_reads!(InMemoryTransaction);

#[async_trait]
impl AssignmentTransaction for InMemoryTransaction {
    async fn insert_user(&mut self, user: &User) -> AppResult<()> {
        self.working().insert_user(user)
    }

    async fn insert_role(&mut self, role: &Role) -> AppResult<()> {
        self.working().insert_role(role)
    }

    async fn insert_permission(&mut self, permission: &Permission) -> AppResult<()> {
        self.working().insert_permission(permission)
    }

    async fn mark_deleted(
        &mut self,
        kind: EntityKind,
        entity_id: Uuid,
        deletion: SoftDeletion,
    ) -> AppResult<bool> {
        Ok(self.working().mark_deleted(kind, entity_id, deletion))
    }

    async fn insert_role_parent_link(&mut self, link: &RoleParentLink) -> AppResult<()> {
        self.working().insert_role_parent_link(link)
    }

    async fn insert_role_grant(&mut self, grant: &RoleGrant) -> AppResult<()> {
        self.working().insert_role_grant(grant)
    }

    async fn insert_user_role_grant(&mut self, grant: &UserRoleGrant) -> AppResult<()> {
        self.working().insert_user_role_grant(grant)
    }

    async fn insert_resource_grant(&mut self, grant: &ResourceGrant) -> AppResult<()> {
        self.working().insert_resource_grant(grant)
    }

    async fn insert_delegation(&mut self, delegation: &Delegation) -> AppResult<()> {
        self.working().insert_delegation(delegation)
    }

    async fn revoke_assignment(
        &mut self,
        kind: AssignmentKind,
        grant_id: GrantId,
        revocation: Revocation,
    ) -> AppResult<bool> {
        self.working().revoke_assignment(kind, grant_id, revocation)
    }

    async fn revoke_referencing(
        &mut self,
        rule: &CascadeRule,
        entity_id: Uuid,
        revocation: Revocation,
    ) -> AppResult<u64> {
        let step = self.cascade_steps;
        self.cascade_steps += 1;
        if self.fault == Some(InjectedFault::FailCascadeStep(step)) {
            warn!(step, assignment = rule.assignment.as_str(), "injected cascade failure");
            return Err(AppError::Unavailable(format!(
                "injected failure at cascade step {step}"
            )));
        }

        self.working().revoke_referencing(rule, entity_id, revocation)
    }

    async fn append_audit(&mut self, record: &AuditRecord) -> AppResult<()> {
        self.shared
            .audit
            .read()
            .await
            .check_unique(record, &self.pending_audit)?;
        self.pending_audit.push(record.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let InMemoryTransaction {
            state,
            shared,
            pending_audit,
            fault,
            _writer,
            ..
        } = *self;

        if fault == Some(InjectedFault::FailCommit) {
            warn!("injected commit failure");
            return Err(AppError::Unavailable("injected commit failure".to_owned()));
        }

        let audit_records = pending_audit.len();
        shared.publish(state, pending_audit).await;
        debug!(audit_records, "in-memory transaction committed");
        Ok(())
    }
}
