//! Effective permission resolution shared by evaluation, listing and governance.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};

use warden_core::AppResult;
use warden_domain::{
    Capability, CapabilitySet, ContributingGrant, EffectivePermission, EffectivePermissionSet,
    GovernanceTier, ResourceScope, RoleHierarchy, TemporalAssignment, UserId,
};

use crate::{AssignmentReader, EngineConfig};

/// Resolves a user's direct permissions at `at`: roles with their ancestors, then resource grants.
pub(crate) async fn direct_permissions<R>(
    reader: &mut R,
    user_id: UserId,
    at: DateTime<Utc>,
) -> AppResult<Vec<EffectivePermission>>
where
    R: AssignmentReader + ?Sized,
{
    let mut permissions = Vec::new();

    let user_role_grants = reader
        .user_role_grants_for_user(user_id)
        .await?
        .into_iter()
        .filter(|grant| grant.is_active_at(at))
        .collect::<Vec<_>>();

    if !user_role_grants.is_empty() {
        let links = reader.role_parent_links().await?;
        let hierarchy = RoleHierarchy::active_at(&links, at)?;

        let mut lineages = Vec::with_capacity(user_role_grants.len());
        let mut role_ids = BTreeSet::new();
        for grant in &user_role_grants {
            let lineage = hierarchy.lineage(grant.role_id)?;
            role_ids.extend(lineage.iter().copied());
            lineages.push(lineage);
        }

        let role_ids = role_ids.into_iter().collect::<Vec<_>>();
        let role_grants = reader
            .role_grants_for_roles(&role_ids)
            .await?
            .into_iter()
            .filter(|grant| grant.is_active_at(at))
            .collect::<Vec<_>>();

        let permission_ids = role_grants
            .iter()
            .map(|grant| grant.permission_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect::<Vec<_>>();
        let definitions = reader
            .permissions_by_ids(&permission_ids)
            .await?
            .into_iter()
            .map(|permission| (permission.id, permission))
            .collect::<HashMap<_, _>>();

        for (user_role_grant, lineage) in user_role_grants.iter().zip(&lineages) {
            let scope = user_role_grant
                .scope_id
                .as_ref()
                .map_or(ResourceScope::Any, ResourceScope::single);

            for granting_role_id in lineage {
                for role_grant in role_grants
                    .iter()
                    .filter(|role_grant| role_grant.role_id == *granting_role_id)
                {
                    let Some(permission) = definitions.get(&role_grant.permission_id) else {
                        continue;
                    };

                    permissions.push(EffectivePermission {
                        resource_type: permission.key.resource_type().to_owned(),
                        action: permission.key.action().to_owned(),
                        scope: scope.clone(),
                        source: ContributingGrant::Role {
                            user_role_grant_id: user_role_grant.id,
                            role_id: user_role_grant.role_id,
                            granting_role_id: *granting_role_id,
                            role_grant_id: role_grant.id,
                            permission_id: permission.id,
                        },
                    });
                }
            }
        }
    }

    permissions.extend(
        reader
            .resource_grants_for_user(user_id)
            .await?
            .into_iter()
            .filter(|grant| grant.is_active_at(at))
            .map(|grant| EffectivePermission {
                scope: ResourceScope::single(grant.resource_id.clone()),
                resource_type: grant.resource_type,
                action: grant.action,
                source: ContributingGrant::Resource {
                    resource_grant_id: grant.id,
                },
            }),
    );

    Ok(permissions)
}

/// Resolves a user's effective permissions at `at`, including one level of delegation.
pub(crate) async fn effective_permissions<R>(
    reader: &mut R,
    user_id: UserId,
    at: DateTime<Utc>,
    config: EngineConfig,
) -> AppResult<EffectivePermissionSet>
where
    R: AssignmentReader + ?Sized,
{
    let mut permissions = direct_permissions(reader, user_id, at).await?;

    if config.delegations_enabled() {
        let delegations = reader
            .delegations_involving(user_id)
            .await?
            .into_iter()
            .filter(|delegation| delegation.delegatee_id == user_id)
            .filter(|delegation| delegation.delegator_id != user_id)
            .filter(|delegation| delegation.is_active_at(at))
            .collect::<Vec<_>>();

        let mut delegator_permissions: HashMap<UserId, Vec<EffectivePermission>> = HashMap::new();
        for delegation in &delegations {
            if !delegator_permissions.contains_key(&delegation.delegator_id) {
                let direct = direct_permissions(reader, delegation.delegator_id, at).await?;
                delegator_permissions.insert(delegation.delegator_id, direct);
            }

            if let Some(direct) = delegator_permissions.get(&delegation.delegator_id) {
                permissions.extend(
                    direct
                        .iter()
                        .filter_map(|permission| permission.delegated_through(delegation)),
                );
            }
        }
    }

    Ok(EffectivePermissionSet::from_permissions(permissions))
}

/// Resolves the governance capabilities a user holds at `at`. Delegations never carry them.
pub(crate) async fn capabilities<R>(
    reader: &mut R,
    user_id: UserId,
    at: DateTime<Utc>,
) -> AppResult<CapabilitySet>
where
    R: AssignmentReader + ?Sized,
{
    let permissions = direct_permissions(reader, user_id, at).await?;

    Ok(CapabilitySet::from_capabilities(permissions.iter().filter_map(
        |permission| Capability::from_permission(&permission.resource_type, &permission.action),
    )))
}

/// Returns whether the user holds a protected-tier role at `at`.
pub(crate) async fn holds_protected_role<R>(
    reader: &mut R,
    user_id: UserId,
    at: DateTime<Utc>,
) -> AppResult<bool>
where
    R: AssignmentReader + ?Sized,
{
    let grants = reader.user_role_grants_for_user(user_id).await?;
    for grant in grants.iter().filter(|grant| grant.is_active_at(at)) {
        if reader
            .find_role(grant.role_id)
            .await?
            .is_some_and(|role| role.tier == GovernanceTier::Protected)
        {
            return Ok(true);
        }
    }

    Ok(false)
}
