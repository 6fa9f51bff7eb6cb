//! End-to-end authorization scenarios over the in-memory store.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use warden_application::{
    AssignmentStore, AuditLogWriter, DelegationInput, EngineConfig, GovernanceService,
    MutationContext, PermissionEngine, PointInTimeService, ResourceGrantInput, RevocationService,
};
use warden_core::{ActorIdentity, AppError};
use warden_domain::{AccessRequest, EntityKind, GovernanceTier, PermissionId, RoleId, UserId};
use warden_infrastructure::{InMemoryAssignmentStore, InjectedFault, seed_root_role};

fn date(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0)
        .single()
        .unwrap_or_else(|| panic!("invalid date {year}-{month}-{day}"))
}

struct Harness {
    store: Arc<InMemoryAssignmentStore>,
    root: ActorIdentity,
    governance: GovernanceService,
    engine: PermissionEngine,
    revocation: RevocationService,
    history: PointInTimeService,
}

impl Harness {
    async fn new() -> Self {
        let store = Arc::new(InMemoryAssignmentStore::new());
        let mut transaction = store
            .begin()
            .await
            .unwrap_or_else(|error| panic!("begin failed: {error}"));
        let seed = seed_root_role(transaction.as_mut(), "root-admin", date(2023, 12, 1))
            .await
            .unwrap_or_else(|error| panic!("root seeding failed: {error}"));
        transaction
            .commit()
            .await
            .unwrap_or_else(|error| panic!("commit failed: {error}"));

        let audit = AuditLogWriter::new(store.clone());
        let config = EngineConfig::default();
        Self {
            root: ActorIdentity::new(seed.user_id.as_uuid(), "root-admin"),
            governance: GovernanceService::new(store.clone(), audit.clone(), config),
            engine: PermissionEngine::new(store.clone(), audit.clone(), config),
            revocation: RevocationService::new(store.clone(), audit),
            history: PointInTimeService::new(store.clone(), config),
            store,
        }
    }

    fn at(&self, at: DateTime<Utc>) -> MutationContext {
        MutationContext::new(self.root.clone(), at)
    }

    async fn user(&self, external_ref: &str) -> UserId {
        self.governance
            .sync_user(external_ref, date(2023, 12, 15))
            .await
            .unwrap_or_else(|error| panic!("sync failed: {error}"))
            .id()
    }

    async fn role_with_permission(
        &self,
        name: &str,
        tier: GovernanceTier,
        key: &str,
        at: DateTime<Utc>,
    ) -> RoleId {
        let role = self
            .governance
            .create_role(&self.at(at), name, tier)
            .await
            .unwrap_or_else(|error| panic!("create role failed: {error}"));
        let permission = self
            .governance
            .create_permission(&self.at(at), key, GovernanceTier::Basic)
            .await
            .unwrap_or_else(|error| panic!("create permission failed: {error}"));
        let role_id = RoleId::from_uuid(role.target_id);
        self.governance
            .grant_permission_to_role(
                &self.at(at),
                role_id,
                PermissionId::from_uuid(permission.target_id),
            )
            .await
            .unwrap_or_else(|error| panic!("attach permission failed: {error}"));
        role_id
    }

    async fn is_granted(
        &self,
        user_id: UserId,
        resource_type: &str,
        resource_id: &str,
        action: &str,
        at: DateTime<Utc>,
    ) -> bool {
        self.engine
            .evaluate(AccessRequest {
                user_id,
                resource_type: resource_type.to_owned(),
                resource_id: Some(resource_id.to_owned()),
                action: action.to_owned(),
                at,
            })
            .await
            .unwrap_or_else(|error| panic!("evaluation failed: {error}"))
            .is_granted()
    }
}

#[tokio::test]
async fn revoked_role_is_visible_only_before_revocation() {
    let harness = Harness::new().await;
    let manager = harness
        .role_with_permission(
            "manager",
            GovernanceTier::Elevated,
            "transactions:approve",
            date(2024, 1, 1),
        )
        .await;
    let user = harness.user("u1").await;

    harness
        .governance
        .grant_role_to_user(&harness.at(date(2024, 2, 1)), user, manager, None, None)
        .await
        .unwrap_or_else(|error| panic!("grant failed: {error}"));
    harness
        .governance
        .revoke_role_from_user(&harness.at(date(2024, 6, 1)), user, manager, None)
        .await
        .unwrap_or_else(|error| panic!("revoke failed: {error}"));

    let key = ("transactions".to_owned(), "approve".to_owned());
    let march = harness
        .history
        .effective_permissions_at(user, date(2024, 3, 1))
        .await
        .unwrap_or_else(|error| panic!("historical query failed: {error}"));
    let july = harness
        .history
        .effective_permissions_at(user, date(2024, 7, 1))
        .await
        .unwrap_or_else(|error| panic!("historical query failed: {error}"));

    assert!(march.keys().contains(&key));
    assert!(!july.keys().contains(&key));
    assert!(
        !harness
            .is_granted(user, "transactions", "*", "approve", date(2024, 7, 1))
            .await
    );
    assert!(
        harness
            .is_granted(user, "transactions", "*", "approve", date(2024, 3, 1))
            .await
    );
}

#[tokio::test]
async fn deleting_a_delegator_revokes_what_it_delegated() {
    let harness = Harness::new().await;
    let delegator = harness.user("u2").await;
    let delegatee = harness.user("u3").await;

    harness
        .governance
        .grant_resource_access(
            &harness.at(date(2024, 1, 1)),
            ResourceGrantInput {
                user_id: delegator,
                resource_type: "ledger".to_owned(),
                resource_id: "L-1".to_owned(),
                action: "read".to_owned(),
                expires_at: None,
                reason: Some("quarterly close".to_owned()),
            },
        )
        .await
        .unwrap_or_else(|error| panic!("resource grant failed: {error}"));
    harness
        .governance
        .delegate(
            &harness.at(date(2024, 1, 1)),
            DelegationInput {
                delegator_id: delegator,
                delegatee_id: delegatee,
                scope_tag: "read_only".to_owned(),
                resource_type: None,
                resource_ids: None,
                valid_from: date(2024, 1, 1),
                valid_until: None,
            },
        )
        .await
        .unwrap_or_else(|error| panic!("delegation failed: {error}"));

    assert!(
        harness
            .is_granted(delegatee, "ledger", "L-1", "read", date(2024, 1, 15))
            .await
    );

    let report = harness
        .revocation
        .soft_delete(
            &harness.at(date(2024, 1, 20)),
            EntityKind::User,
            delegator.as_uuid(),
        )
        .await
        .unwrap_or_else(|error| panic!("soft delete failed: {error}"));
    assert_eq!(report.revoked_total, 2);

    assert!(
        !harness
            .is_granted(delegatee, "ledger", "L-1", "read", date(2024, 2, 1))
            .await
    );
    assert!(
        harness
            .is_granted(delegatee, "ledger", "L-1", "read", date(2024, 1, 15))
            .await
    );

    let history = harness
        .history
        .assignment_history(delegatee)
        .await
        .unwrap_or_else(|error| panic!("history failed: {error}"));
    assert_eq!(history.delegations.len(), 1);
    let revocation = history.delegations[0]
        .window
        .revocation
        .unwrap_or_else(|| panic!("delegation was not revoked"));
    assert_eq!(
        revocation.revoked_by,
        UserId::from_uuid(harness.root.user_id())
    );
    assert_eq!(revocation.revoked_at, date(2024, 1, 20));
}

#[tokio::test]
async fn failed_cascade_step_leaves_every_row_untouched() {
    let harness = Harness::new().await;
    let teller = harness
        .role_with_permission(
            "teller",
            GovernanceTier::Basic,
            "account:view",
            date(2024, 1, 1),
        )
        .await;
    let user = harness.user("u5").await;
    harness
        .governance
        .grant_role_to_user(&harness.at(date(2024, 1, 2)), user, teller, None, None)
        .await
        .unwrap_or_else(|error| panic!("grant failed: {error}"));
    harness
        .governance
        .grant_resource_access(
            &harness.at(date(2024, 1, 2)),
            ResourceGrantInput {
                user_id: user,
                resource_type: "account".to_owned(),
                resource_id: "A-9".to_owned(),
                action: "close".to_owned(),
                expires_at: None,
                reason: None,
            },
        )
        .await
        .unwrap_or_else(|error| panic!("resource grant failed: {error}"));

    harness
        .store
        .inject_fault(InjectedFault::FailCascadeStep(1))
        .await;
    let result = harness
        .revocation
        .soft_delete(&harness.at(date(2024, 3, 1)), EntityKind::User, user.as_uuid())
        .await;
    assert!(matches!(result, Err(AppError::Unavailable(_))));

    let history = harness
        .history
        .assignment_history(user)
        .await
        .unwrap_or_else(|error| panic!("history failed: {error}"));
    assert!(!history.user.is_deleted());
    assert!(
        history
            .user_role_grants
            .iter()
            .all(|grant| grant.window.revocation.is_none())
    );
    assert!(
        history
            .resource_grants
            .iter()
            .all(|grant| grant.window.revocation.is_none())
    );
    assert!(
        harness
            .is_granted(user, "account", "A-1", "view", date(2024, 3, 2))
            .await
    );

    let report = harness
        .revocation
        .soft_delete(&harness.at(date(2024, 3, 1)), EntityKind::User, user.as_uuid())
        .await
        .unwrap_or_else(|error| panic!("retried soft delete failed: {error}"));
    assert_eq!(report.revoked_total, 2);
}

#[tokio::test]
async fn concurrent_grants_leave_one_active_assignment() {
    let harness = Arc::new(Harness::new().await);
    let auditor = harness
        .role_with_permission(
            "auditor",
            GovernanceTier::Basic,
            "report:view",
            date(2024, 1, 1),
        )
        .await;
    let user = harness.user("u6").await;

    let mut handles = Vec::new();
    for _ in 0..4 {
        let harness = harness.clone();
        handles.push(tokio::spawn(async move {
            harness
                .governance
                .grant_role_to_user(&harness.at(date(2024, 2, 1)), user, auditor, None, None)
                .await
        }));
    }

    let mut granted = 0;
    for handle in handles {
        match handle
            .await
            .unwrap_or_else(|error| panic!("task panicked: {error}"))
        {
            Ok(_) => granted += 1,
            Err(AppError::Conflict(_)) => {}
            Err(error) => panic!("unexpected error: {error}"),
        }
    }
    assert_eq!(granted, 1);

    let history = harness
        .history
        .assignment_history(user)
        .await
        .unwrap_or_else(|error| panic!("history failed: {error}"));
    assert_eq!(history.user_role_grants.len(), 1);
}

#[tokio::test]
async fn delegated_access_is_not_delegated_again() {
    let harness = Harness::new().await;
    let owner = harness.user("owner").await;
    let deputy = harness.user("deputy").await;
    let stand_in = harness.user("stand-in").await;

    harness
        .governance
        .grant_resource_access(
            &harness.at(date(2024, 1, 1)),
            ResourceGrantInput {
                user_id: owner,
                resource_type: "vault".to_owned(),
                resource_id: "V-7".to_owned(),
                action: "open".to_owned(),
                expires_at: None,
                reason: None,
            },
        )
        .await
        .unwrap_or_else(|error| panic!("resource grant failed: {error}"));

    for (delegator_id, delegatee_id) in [(owner, deputy), (deputy, stand_in)] {
        harness
            .governance
            .delegate(
                &harness.at(date(2024, 1, 2)),
                DelegationInput {
                    delegator_id,
                    delegatee_id,
                    scope_tag: "full".to_owned(),
                    resource_type: Some("vault".to_owned()),
                    resource_ids: None,
                    valid_from: date(2024, 1, 2),
                    valid_until: Some(date(2024, 12, 31)),
                },
            )
            .await
            .unwrap_or_else(|error| panic!("delegation failed: {error}"));
    }

    assert!(
        harness
            .is_granted(deputy, "vault", "V-7", "open", date(2024, 3, 1))
            .await
    );
    assert!(
        !harness
            .is_granted(stand_in, "vault", "V-7", "open", date(2024, 3, 1))
            .await
    );
}

#[tokio::test]
async fn unknown_soft_delete_target_is_not_found() {
    let harness = Harness::new().await;

    let result = harness
        .revocation
        .soft_delete(
            &harness.at(date(2024, 1, 1)),
            EntityKind::Role,
            Uuid::new_v4(),
        )
        .await;

    assert!(matches!(result, Err(AppError::NotFound(_))));
}
