//! Warden operator command line.

#![forbid(unsafe_code)]

mod admin_config;

use std::env;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use uuid::Uuid;

use warden_application::{AssignmentStore, PointInTimeService};
use warden_core::{AppError, AppResult};
use warden_domain::{EffectivePermissionSet, UserId};
use warden_infrastructure::{MIGRATOR, PostgresAssignmentStore, seed_root_role};

use crate::admin_config::{AdminConfig, init_tracing};

const USAGE: &str = "usage: warden-admin <migrate | seed-root <external-ref> | permissions-at <user-id> [rfc3339] | history <user-id>>";

#[derive(Debug, Serialize)]
struct PermissionsAtReport {
    user_id: UserId,
    at: DateTime<Utc>,
    permissions: EffectivePermissionSet,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args = env::args().skip(1).collect::<Vec<_>>();
    let Some(command) = args.first().map(String::as_str) else {
        return Err(AppError::Validation(USAGE.to_owned()));
    };

    let config = AdminConfig::load()?;
    let pool = connect_pool(&config).await?;

    match (command, &args[1..]) {
        ("migrate", []) => {
            MIGRATOR
                .run(&pool)
                .await
                .map_err(|error| AppError::Internal(format!("failed to run migrations: {error}")))?;
            info!("database migrations applied successfully");
            Ok(())
        }
        ("seed-root", [external_ref]) => {
            let store = PostgresAssignmentStore::new(pool);
            let mut transaction = store.begin().await?;
            let seed = seed_root_role(transaction.as_mut(), external_ref, Utc::now()).await?;
            transaction.commit().await?;
            print_json(&seed)
        }
        ("permissions-at", [user_id, rest @ ..]) if rest.len() <= 1 => {
            let user_id = parse_user_id(user_id)?;
            let at = match rest.first() {
                Some(value) => parse_instant(value)?,
                None => Utc::now(),
            };

            let service = PointInTimeService::new(
                Arc::new(PostgresAssignmentStore::new(pool)),
                config.engine,
            );
            let permissions = service.effective_permissions_at(user_id, at).await?;
            print_json(&PermissionsAtReport {
                user_id,
                at,
                permissions,
            })
        }
        ("history", [user_id]) => {
            let service = PointInTimeService::new(
                Arc::new(PostgresAssignmentStore::new(pool)),
                config.engine,
            );
            let history = service.assignment_history(parse_user_id(user_id)?).await?;
            print_json(&history)
        }
        _ => Err(AppError::Validation(USAGE.to_owned())),
    }
}

async fn connect_pool(config: &AdminConfig) -> AppResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(config.database_url.as_str())
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))
}

fn parse_user_id(value: &str) -> AppResult<UserId> {
    Uuid::parse_str(value.trim())
        .map(UserId::from_uuid)
        .map_err(|error| AppError::Validation(format!("invalid user id '{value}': {error}")))
}

fn parse_instant(value: &str) -> AppResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|instant| instant.with_timezone(&Utc))
        .map_err(|error| AppError::Validation(format!("invalid instant '{value}': {error}")))
}

fn print_json<T: Serialize>(value: &T) -> AppResult<()> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|error| AppError::Internal(format!("failed to render output: {error}")))?;
    println!("{rendered}");
    Ok(())
}
