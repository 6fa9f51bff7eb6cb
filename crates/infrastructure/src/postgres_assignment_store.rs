use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use warden_application::{AssignmentReader, AssignmentStore, AssignmentTransaction};
use warden_core::{AppError, AppResult, NonEmptyString};
use warden_domain::{
    AssignmentKey, AssignmentKind, AuditAction, AuditEntry, AuditQuery, AuditRecord,
    AuditRecordId, CascadeRule, Decision, Delegation, DelegationScope, EntityKind, GovernanceTier,
    GrantId, Permission, PermissionId, PermissionKey, ReferenceColumn, ResourceGrant, Revocation,
    Role, RoleGrant, RoleId, RoleParentLink, SoftDeletion, UnrevokedAssignment, User, UserId,
    UserRoleGrant, ValidityWindow,
};

mod reads;
mod rows;
mod writes;

use rows::{
    AuditRecordRow, DelegationRow, PermissionRow, ResourceGrantRow, RoleGrantRow,
    RoleParentLinkRow, RoleRow, UnrevokedRow, UserRoleGrantRow, UserRow,
};

/// PostgreSQL-backed assignment store.
///
/// Write transactions run `SERIALIZABLE`; snapshots run `REPEATABLE READ READ ONLY`.
#[derive(Clone)]
pub struct PostgresAssignmentStore {
    pool: PgPool,
}

impl PostgresAssignmentStore {
    /// Creates a store with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn open(&self, isolation: &'static str) -> AppResult<PostgresSession> {
        let mut transaction = self
            .pool
            .begin()
            .await
            .map_err(|error| map_store_error(error, "begin transaction"))?;

        sqlx::query(isolation)
            .execute(&mut *transaction)
            .await
            .map_err(|error| map_store_error(error, "set transaction isolation"))?;

        Ok(PostgresSession { transaction })
    }
}

#[async_trait]
impl AssignmentStore for PostgresAssignmentStore {
    async fn snapshot(&self) -> AppResult<Box<dyn AssignmentReader>> {
        let session = self
            .open("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .await?;
        Ok(Box::new(session))
    }

    async fn begin(&self) -> AppResult<Box<dyn AssignmentTransaction>> {
        let session = self
            .open("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .await?;
        Ok(Box::new(session))
    }
}

/// One open database transaction. Dropping it rolls back.
struct PostgresSession {
    transaction: Transaction<'static, Postgres>,
}

/// Maps driver errors onto the engine's error categories.
///
/// Unique violations and serialization failures are retryable conflicts;
/// check and foreign-key violations mean a structural invariant was broken.
fn map_store_error(error: sqlx::Error, operation: &str) -> AppError {
    if let sqlx::Error::Database(database_error) = &error {
        match database_error.code().as_deref() {
            Some("23505") => {
                return AppError::Conflict(format!(
                    "failed to {operation}: an active row already holds this key"
                ));
            }
            Some("40001" | "40P01") => {
                return AppError::Conflict(format!(
                    "failed to {operation}: concurrent transaction won: {error}"
                ));
            }
            Some("23000" | "23502" | "23503" | "23514") => {
                return AppError::InvariantViolation(format!("failed to {operation}: {error}"));
            }
            _ => {}
        }
    }

    if matches!(
        error,
        sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::WorkerCrashed
    ) {
        return AppError::Unavailable(format!("failed to {operation}: {error}"));
    }

    AppError::Internal(format!("failed to {operation}: {error}"))
}

fn assignment_table(kind: AssignmentKind) -> &'static str {
    match kind {
        AssignmentKind::RoleParentLink => "authz_role_parent_links",
        AssignmentKind::RoleGrant => "authz_role_grants",
        AssignmentKind::UserRoleGrant => "authz_user_role_grants",
        AssignmentKind::ResourceGrant => "authz_resource_grants",
        AssignmentKind::Delegation => "authz_delegations",
    }
}

fn entity_table(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::User => "authz_users",
        EntityKind::Role => "authz_roles",
        EntityKind::Permission => "authz_permissions",
    }
}

fn reference_column(kind: AssignmentKind, column: ReferenceColumn) -> AppResult<&'static str> {
    match (kind, column) {
        (AssignmentKind::RoleParentLink, ReferenceColumn::Role)
        | (AssignmentKind::RoleGrant, ReferenceColumn::Role)
        | (AssignmentKind::UserRoleGrant, ReferenceColumn::Role) => Ok("role_id"),
        (AssignmentKind::RoleParentLink, ReferenceColumn::ParentRole) => Ok("parent_role_id"),
        (AssignmentKind::RoleGrant, ReferenceColumn::Permission) => Ok("permission_id"),
        (AssignmentKind::UserRoleGrant, ReferenceColumn::User)
        | (AssignmentKind::ResourceGrant, ReferenceColumn::User) => Ok("user_id"),
        (AssignmentKind::Delegation, ReferenceColumn::Delegator) => Ok("delegator_id"),
        (AssignmentKind::Delegation, ReferenceColumn::Delegatee) => Ok("delegatee_id"),
        (kind, column) => Err(AppError::InvariantViolation(format!(
            "{} rows have no {column:?} reference",
            kind.as_str()
        ))),
    }
}

fn stored<T>(value: &str, label: &str) -> AppResult<T>
where
    T: FromStr<Err = AppError>,
{
    T::from_str(value)
        .map_err(|error| AppError::InvariantViolation(format!("stored {label} is invalid: {error}")))
}
