use std::sync::Arc;

use warden_core::{ActorIdentity, AppError};
use warden_domain::{
    AuditAction, AuditQuery, Decision, DenialReason, GovernanceDecision, GovernanceOperation,
    GovernanceTarget, GovernanceTier, RoleId, UserId,
};

use crate::test_support::{FakeStore, instant};
use crate::{AuditLogWriter, EngineConfig};

use super::{DelegationInput, GovernanceService, MutationContext, ResourceGrantInput};

fn service(store: &FakeStore) -> GovernanceService {
    let store: Arc<FakeStore> = Arc::new(store.clone());
    GovernanceService::new(
        store.clone(),
        AuditLogWriter::new(store),
        EngineConfig::default(),
    )
}

fn at_day(actor: &ActorIdentity, day: i64) -> MutationContext {
    MutationContext::new(actor.clone(), instant(day))
}

#[tokio::test]
async fn basic_assigner_cannot_grant_elevated_role() {
    let store = FakeStore::default();
    let actor = store.add_governor("helpdesk", &["assign_basic"]).await;
    let target = store.add_user("bob").await;
    let manager = store.add_role("manager", GovernanceTier::Elevated).await;
    let before = store.state().await.user_role_grants.len();

    let result = service(&store)
        .grant_role_to_user(&at_day(&actor, 1), target, manager, None, None)
        .await;

    assert_eq!(
        result.err().as_ref().and_then(AppError::reason_code),
        Some("insufficient_capability")
    );
    assert_eq!(store.state().await.user_role_grants.len(), before);

    let records = store.audit_records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].entry.action, AuditAction::RoleGrantedToUser);
    assert_eq!(records[0].entry.decision, Decision::Denied);
    assert_eq!(
        records[0].entry.reason.as_deref(),
        Some("insufficient_capability")
    );
}

#[tokio::test]
async fn elevated_assigner_grants_basic_and_elevated_roles() {
    let store = FakeStore::default();
    let actor = store.add_governor("security", &["assign_elevated"]).await;
    let target = store.add_user("bob").await;
    let teller = store.add_role("teller", GovernanceTier::Basic).await;
    let manager = store.add_role("manager", GovernanceTier::Elevated).await;
    let service = service(&store);

    for role in [teller, manager] {
        let receipt = service
            .grant_role_to_user(&at_day(&actor, 1), target, role, None, None)
            .await
            .unwrap_or_else(|error| panic!("grant failed: {error}"));
        assert!(!receipt.replayed);
    }

    let records = store.audit_records().await;
    assert_eq!(records.len(), 2);
    assert!(
        records
            .iter()
            .all(|record| record.entry.decision == Decision::Granted)
    );
}

#[tokio::test]
async fn root_role_is_immune_to_every_capability() {
    let store = FakeStore::default();
    let actor = store
        .add_governor(
            "everything",
            &[
                "assign_basic",
                "assign_elevated",
                "define_roles",
                "manage_users",
                "read_audit",
            ],
        )
        .await;
    let target = store.add_user("bob").await;
    let root = store.add_role("root", GovernanceTier::Protected).await;
    let service = service(&store);

    let grant = service
        .grant_role_to_user(&at_day(&actor, 1), target, root, None, None)
        .await;
    let create = service
        .create_role(&at_day(&actor, 1), "shadow", GovernanceTier::Protected)
        .await;
    let parent = service
        .set_role_parent(&at_day(&actor, 1), store.add_role("x", GovernanceTier::Basic).await, root)
        .await;

    for result in [grant, create, parent] {
        assert_eq!(
            result.err().as_ref().and_then(AppError::reason_code),
            Some("protected_role")
        );
    }
    assert_eq!(store.audit_records().await.len(), 3);
}

#[tokio::test]
async fn role_named_root_cannot_be_created() {
    let store = FakeStore::default();
    let actor = store.add_governor("architect", &["define_roles"]).await;

    let result = service(&store)
        .create_role(&at_day(&actor, 1), " root ", GovernanceTier::Basic)
        .await;

    assert_eq!(
        result.err().as_ref().and_then(AppError::reason_code),
        Some("protected_role")
    );
}

#[tokio::test]
async fn cyclic_parent_is_an_audited_invariant_violation() {
    let store = FakeStore::default();
    let actor = store.add_governor("architect", &["define_roles"]).await;
    let teller = store.add_role("teller", GovernanceTier::Basic).await;
    let supervisor = store.add_role("supervisor", GovernanceTier::Basic).await;
    let service = service(&store);

    service
        .set_role_parent(&at_day(&actor, 1), teller, supervisor)
        .await
        .unwrap_or_else(|error| panic!("first parent failed: {error}"));
    let result = service
        .set_role_parent(&at_day(&actor, 2), supervisor, teller)
        .await;

    assert!(matches!(result, Err(AppError::InvariantViolation(_))));
    let records = store.audit_records().await;
    assert_eq!(
        records.last().and_then(|record| record.entry.reason.as_deref()),
        Some("cyclic_role_parent")
    );
    assert_eq!(store.state().await.parent_links.len(), 1);
}

#[tokio::test]
async fn replacing_parent_revokes_previous_link() {
    let store = FakeStore::default();
    let actor = store.add_governor("architect", &["define_roles"]).await;
    let teller = store.add_role("teller", GovernanceTier::Basic).await;
    let supervisor = store.add_role("supervisor", GovernanceTier::Basic).await;
    let manager = store.add_role("manager", GovernanceTier::Basic).await;
    let service = service(&store);

    for (day, parent) in [(1, supervisor), (5, manager)] {
        service
            .set_role_parent(&at_day(&actor, day), teller, parent)
            .await
            .unwrap_or_else(|error| panic!("set parent failed: {error}"));
    }
    service
        .clear_role_parent(&at_day(&actor, 9), teller)
        .await
        .unwrap_or_else(|error| panic!("clear parent failed: {error}"));

    let links = store.state().await.parent_links;
    assert_eq!(links.len(), 2);
    assert!(links.iter().all(|link| !link.window.is_unrevoked()));
}

#[tokio::test]
async fn active_key_conflicts_and_regrant_after_revoke_adds_row() {
    let store = FakeStore::default();
    let actor = store.add_governor("helpdesk", &["assign_basic"]).await;
    let target = store.add_user("bob").await;
    let teller = store.add_role("teller", GovernanceTier::Basic).await;
    let service = service(&store);

    service
        .grant_role_to_user(&at_day(&actor, 1), target, teller, None, None)
        .await
        .unwrap_or_else(|error| panic!("grant failed: {error}"));
    let duplicate = service
        .grant_role_to_user(&at_day(&actor, 2), target, teller, None, None)
        .await;
    assert!(matches!(duplicate, Err(AppError::Conflict(_))));

    service
        .revoke_role_from_user(&at_day(&actor, 3), target, teller, None)
        .await
        .unwrap_or_else(|error| panic!("revoke failed: {error}"));
    service
        .grant_role_to_user(&at_day(&actor, 4), target, teller, None, None)
        .await
        .unwrap_or_else(|error| panic!("re-grant failed: {error}"));

    let grants = store
        .state()
        .await
        .user_role_grants
        .into_iter()
        .filter(|grant| grant.user_id == target)
        .collect::<Vec<_>>();
    assert_eq!(grants.len(), 2);
    assert_eq!(
        grants.iter().filter(|grant| grant.window.is_unrevoked()).count(),
        1
    );
}

#[tokio::test]
async fn lapsed_grant_is_sealed_at_its_expiry() {
    let store = FakeStore::default();
    let actor = store.add_governor("helpdesk", &["assign_basic"]).await;
    let target = store.add_user("bob").await;
    let teller = store.add_role("teller", GovernanceTier::Basic).await;
    let service = service(&store);

    service
        .grant_role_to_user(&at_day(&actor, 1), target, teller, None, Some(instant(3)))
        .await
        .unwrap_or_else(|error| panic!("grant failed: {error}"));
    service
        .grant_role_to_user(&at_day(&actor, 10), target, teller, None, None)
        .await
        .unwrap_or_else(|error| panic!("re-grant failed: {error}"));

    let grants = store
        .state()
        .await
        .user_role_grants
        .into_iter()
        .filter(|grant| grant.user_id == target)
        .collect::<Vec<_>>();
    let sealed = grants
        .iter()
        .find(|grant| grant.window.expires_at == Some(instant(3)))
        .and_then(|grant| grant.window.revocation);
    assert_eq!(sealed.map(|stamp| stamp.revoked_at), Some(instant(3)));
}

#[tokio::test]
async fn revocation_before_grant_is_rejected() {
    let store = FakeStore::default();
    let actor = store.add_governor("helpdesk", &["assign_basic"]).await;
    let target = store.add_user("bob").await;
    let service = service(&store);
    let input = ResourceGrantInput {
        user_id: target,
        resource_type: "accounts".to_owned(),
        resource_id: "acc-7".to_owned(),
        action: "read".to_owned(),
        expires_at: None,
        reason: Some("audit support".to_owned()),
    };

    service
        .grant_resource_access(&at_day(&actor, 5), input)
        .await
        .unwrap_or_else(|error| panic!("grant failed: {error}"));
    let result = service
        .revoke_resource_access(&at_day(&actor, 2), target, "accounts", "acc-7", "read")
        .await;

    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn governance_resource_grants_need_elevated_capability() {
    let store = FakeStore::default();
    let actor = store.add_governor("helpdesk", &["assign_basic"]).await;
    let target = store.add_user("bob").await;

    let result = service(&store)
        .grant_resource_access(
            &at_day(&actor, 1),
            ResourceGrantInput {
                user_id: target,
                resource_type: "governance".to_owned(),
                resource_id: "any".to_owned(),
                action: "assign_elevated".to_owned(),
                expires_at: None,
                reason: None,
            },
        )
        .await;

    assert_eq!(
        result.err().as_ref().and_then(AppError::reason_code),
        Some("insufficient_capability")
    );
}

#[tokio::test]
async fn retried_mutation_replays_first_outcome() {
    let store = FakeStore::default();
    let actor = store.add_governor("helpdesk", &["assign_basic"]).await;
    let target = store.add_user("bob").await;
    let teller = store.add_role("teller", GovernanceTier::Basic).await;
    let manager = store.add_role("manager", GovernanceTier::Elevated).await;
    let service = service(&store);

    let context = at_day(&actor, 1).with_idempotency_key("grant-teller-bob");
    let first = service
        .grant_role_to_user(&context, target, teller, None, None)
        .await
        .unwrap_or_else(|error| panic!("grant failed: {error}"));
    let retried = service
        .grant_role_to_user(&context, target, teller, None, None)
        .await
        .unwrap_or_else(|error| panic!("retry failed: {error}"));

    assert!(retried.replayed);
    assert_eq!(first.target_id, retried.target_id);
    assert_eq!(first.audit_record_id, retried.audit_record_id);

    let denied = at_day(&actor, 1).with_idempotency_key("grant-manager-bob");
    for _ in 0..2 {
        let result = service
            .grant_role_to_user(&denied, target, manager, None, None)
            .await;
        assert_eq!(
            result.err().as_ref().and_then(AppError::reason_code),
            Some("insufficient_capability")
        );
    }
    assert_eq!(store.audit_records().await.len(), 2);
}

#[tokio::test]
async fn self_delegation_needs_no_capability() {
    let store = FakeStore::default();
    let manager_id = store.add_user("manager").await;
    let deputy = store.add_user("deputy").await;
    let third = store.add_user("third").await;
    let manager = ActorIdentity::new(manager_id.as_uuid(), "manager");
    let service = service(&store);

    let input = |delegator_id: UserId, delegatee_id: UserId| DelegationInput {
        delegator_id,
        delegatee_id,
        scope_tag: "read_only".to_owned(),
        resource_type: Some("accounts".to_owned()),
        resource_ids: None,
        valid_from: instant(1),
        valid_until: Some(instant(8)),
    };

    let own = service
        .delegate(&at_day(&manager, 1), input(manager_id, deputy))
        .await;
    assert!(own.is_ok());

    let on_behalf = service
        .delegate(&at_day(&manager, 1), input(third, deputy))
        .await;
    assert_eq!(
        on_behalf.err().as_ref().and_then(AppError::reason_code),
        Some("insufficient_capability")
    );

    service
        .revoke_delegation(&at_day(&manager, 4), manager_id, deputy, "read_only")
        .await
        .unwrap_or_else(|error| panic!("revoke failed: {error}"));
}

#[tokio::test]
async fn delegation_is_rejected_when_disabled() {
    let store = FakeStore::default();
    let manager_id = store.add_user("manager").await;
    let deputy = store.add_user("deputy").await;
    let manager = ActorIdentity::new(manager_id.as_uuid(), "manager");
    let store_handle: Arc<FakeStore> = Arc::new(store.clone());
    let service = GovernanceService::new(
        store_handle.clone(),
        AuditLogWriter::new(store_handle),
        EngineConfig::new(0).unwrap_or_else(|error| panic!("{error}")),
    );

    let result = service
        .delegate(
            &at_day(&manager, 1),
            DelegationInput {
                delegator_id: manager_id,
                delegatee_id: deputy,
                scope_tag: "full".to_owned(),
                resource_type: None,
                resource_ids: None,
                valid_from: instant(1),
                valid_until: None,
            },
        )
        .await;

    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn audit_reads_require_capability() {
    let store = FakeStore::default();
    let auditor = store.add_governor("auditor", &["read_audit"]).await;
    let outsider_id = store.add_user("outsider").await;
    let outsider = ActorIdentity::new(outsider_id.as_uuid(), "outsider");
    let service = service(&store);
    let query = AuditQuery {
        limit: 50,
        ..AuditQuery::default()
    };

    let denied = service
        .list_audit_records(&outsider, query.clone(), instant(1))
        .await;
    assert_eq!(
        denied.err().as_ref().and_then(AppError::reason_code),
        Some("insufficient_capability")
    );

    let records = service
        .list_audit_records(&auditor, query, instant(2))
        .await
        .unwrap_or_else(|error| panic!("audit read failed: {error}"));
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].entry.decision, Decision::Denied);
    assert_eq!(store.audit_records().await.len(), 2);
}

#[tokio::test]
async fn authorize_grant_audits_only_denials() {
    let store = FakeStore::default();
    let actor = store.add_governor("helpdesk", &["assign_basic"]).await;
    let service = service(&store);

    let allowed = service
        .authorize_grant(
            &actor,
            GovernanceTarget::Assignment(GovernanceTier::Basic),
            GovernanceOperation::Grant,
            instant(1),
        )
        .await;
    assert_eq!(allowed.ok(), Some(GovernanceDecision::Allowed));
    assert!(store.audit_records().await.is_empty());

    let denied = service
        .authorize_grant(
            &actor,
            GovernanceTarget::Assignment(GovernanceTier::Protected),
            GovernanceOperation::Revoke,
            instant(1),
        )
        .await;
    assert!(matches!(denied, Ok(GovernanceDecision::Denied(_))));
    assert_eq!(store.audit_records().await.len(), 1);
}

#[tokio::test]
async fn sync_user_returns_stable_identity() {
    let store = FakeStore::default();
    let service = service(&store);

    let first = service
        .sync_user("oidc|1234", instant(1))
        .await
        .unwrap_or_else(|error| panic!("sync failed: {error}"));
    let second = service
        .sync_user("oidc|1234", instant(2))
        .await
        .unwrap_or_else(|error| panic!("sync failed: {error}"));

    assert_eq!(first.id(), second.id());
    let records = store.audit_records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].entry.action, AuditAction::UserSynced);
}

#[tokio::test]
async fn missing_role_is_not_found_and_not_audited() {
    let store = FakeStore::default();
    let actor = store.add_governor("helpdesk", &["assign_basic"]).await;
    let target = store.add_user("bob").await;

    let result = service(&store)
        .grant_role_to_user(&at_day(&actor, 1), target, RoleId::new(), None, None)
        .await;

    assert!(matches!(result, Err(AppError::NotFound(_))));
    assert!(store.audit_records().await.is_empty());
}

#[tokio::test]
async fn defining_roles_does_not_unlock_elevated_capabilities() {
    let store = FakeStore::default();
    let actor = store
        .add_governor("architect", &["define_roles", "assign_basic"])
        .await;
    let assign_elevated = store
        .add_permission("governance:assign_elevated", GovernanceTier::Elevated)
        .await;
    let service = service(&store);

    let sneaky = service
        .create_role(&at_day(&actor, 1), "sneaky", GovernanceTier::Basic)
        .await
        .unwrap_or_else(|error| panic!("create role failed: {error}"));
    let sneaky = RoleId::from_uuid(sneaky.target_id);

    let attach = service
        .grant_permission_to_role(&at_day(&actor, 2), sneaky, assign_elevated)
        .await;
    assert_eq!(
        attach.err().as_ref().and_then(AppError::reason_code),
        Some("insufficient_capability")
    );
    assert!(
        store
            .state()
            .await
            .role_grants
            .iter()
            .all(|grant| grant.role_id != sneaky)
    );

    let actor_id = UserId::from_uuid(actor.user_id());
    service
        .grant_role_to_user(&at_day(&actor, 3), actor_id, sneaky, None, None)
        .await
        .unwrap_or_else(|error| panic!("self grant failed: {error}"));
    let escalated = service
        .authorize_grant(
            &actor,
            GovernanceTarget::Assignment(GovernanceTier::Elevated),
            GovernanceOperation::Grant,
            instant(4),
        )
        .await
        .unwrap_or_else(|error| panic!("authorize failed: {error}"));
    assert_eq!(
        escalated,
        GovernanceDecision::Denied(DenialReason::InsufficientCapability)
    );
}

#[tokio::test]
async fn basic_role_cannot_carry_or_inherit_elevated_access() {
    let store = FakeStore::default();
    let architect = store
        .add_governor("architect", &["define_roles", "assign_elevated"])
        .await;
    let teller = store.add_role("teller", GovernanceTier::Basic).await;
    let manager = store.add_role("manager", GovernanceTier::Elevated).await;
    let wire = store
        .add_permission("payments:wire", GovernanceTier::Elevated)
        .await;
    let service = service(&store);

    let attach = service
        .grant_permission_to_role(&at_day(&architect, 1), teller, wire)
        .await;
    assert!(matches!(attach, Err(AppError::Validation(_))));

    let inherit = service
        .set_role_parent(&at_day(&architect, 1), teller, manager)
        .await;
    assert!(matches!(inherit, Err(AppError::Validation(_))));

    service
        .grant_permission_to_role(&at_day(&architect, 2), manager, wire)
        .await
        .unwrap_or_else(|error| panic!("elevated attach failed: {error}"));
    service
        .set_role_parent(&at_day(&architect, 2), manager, teller)
        .await
        .unwrap_or_else(|error| panic!("parent link failed: {error}"));

    let state = store.state().await;
    assert!(state.role_grants.iter().all(|grant| grant.role_id != teller));
    assert_eq!(
        state
            .parent_links
            .iter()
            .filter(|link| link.role_id == teller)
            .count(),
        0
    );
}

#[tokio::test]
async fn elevated_parent_link_needs_elevated_capability() {
    let store = FakeStore::default();
    let architect = store
        .add_governor("architect", &["define_roles", "assign_basic"])
        .await;
    let manager = store.add_role("manager", GovernanceTier::Elevated).await;
    let director = store.add_role("director", GovernanceTier::Elevated).await;

    let result = service(&store)
        .set_role_parent(&at_day(&architect, 1), director, manager)
        .await;

    assert_eq!(
        result.err().as_ref().and_then(AppError::reason_code),
        Some("insufficient_capability")
    );
    assert!(store.state().await.parent_links.is_empty());
}

#[tokio::test]
async fn governance_permissions_are_always_elevated() {
    let store = FakeStore::default();
    let architect = store.add_governor("architect", &["define_roles"]).await;
    let security = store
        .add_governor("security", &["define_roles", "assign_elevated"])
        .await;
    let service = service(&store);

    let basic_attempt = service
        .create_permission(
            &at_day(&architect, 1),
            "governance:assign_elevated",
            GovernanceTier::Basic,
        )
        .await;
    assert_eq!(
        basic_attempt.err().as_ref().and_then(AppError::reason_code),
        Some("insufficient_capability")
    );

    let created = service
        .create_permission(
            &at_day(&security, 1),
            "governance:read_audit",
            GovernanceTier::Basic,
        )
        .await
        .unwrap_or_else(|error| panic!("create permission failed: {error}"));
    let tier = store
        .state()
        .await
        .permissions
        .into_iter()
        .find(|permission| permission.id.as_uuid() == created.target_id)
        .map(|permission| permission.tier);
    assert_eq!(tier, Some(GovernanceTier::Elevated));
}

#[tokio::test]
async fn resource_revocation_normalizes_like_the_grant() {
    let store = FakeStore::default();
    let actor = store.add_governor("helpdesk", &["assign_basic"]).await;
    let target = store.add_user("bob").await;
    let service = service(&store);

    service
        .grant_resource_access(
            &at_day(&actor, 1),
            ResourceGrantInput {
                user_id: target,
                resource_type: " accounts ".to_owned(),
                resource_id: " acc-7 ".to_owned(),
                action: "read ".to_owned(),
                expires_at: None,
                reason: None,
            },
        )
        .await
        .unwrap_or_else(|error| panic!("grant failed: {error}"));
    service
        .revoke_resource_access(
            &at_day(&actor, 2),
            target,
            "accounts ",
            "\tacc-7",
            " read",
        )
        .await
        .unwrap_or_else(|error| panic!("revoke failed: {error}"));

    let grants = store.state().await.resource_grants;
    assert_eq!(grants.len(), 1);
    assert_eq!(grants[0].resource_id, "acc-7");
    assert!(!grants[0].window.is_unrevoked());
}
