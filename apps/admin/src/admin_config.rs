use std::env;

use warden_application::EngineConfig;
use warden_core::{AppError, AppResult};

use tracing_subscriber::EnvFilter;

/// Connection and engine settings read from the environment.
#[derive(Debug, Clone)]
pub struct AdminConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub engine: EngineConfig,
}

impl AdminConfig {
    pub fn load() -> AppResult<Self> {
        let database_url = required_env("DATABASE_URL")?;
        let max_connections = parse_env_u32("DATABASE_MAX_CONNECTIONS", 5)?;
        if max_connections == 0 {
            return Err(AppError::Validation(
                "DATABASE_MAX_CONNECTIONS must be greater than zero".to_owned(),
            ));
        }

        let max_delegation_depth = env::var("WARDEN_MAX_DELEGATION_DEPTH")
            .ok()
            .map(|value| {
                value.trim().parse::<u8>().map_err(|error| {
                    AppError::Validation(format!("invalid WARDEN_MAX_DELEGATION_DEPTH: {error}"))
                })
            })
            .transpose()?
            .unwrap_or(1);

        Ok(Self {
            database_url,
            max_connections,
            engine: EngineConfig::new(max_delegation_depth)?,
        })
    }
}

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn required_env(name: &str) -> AppResult<String> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}

fn parse_env_u32(name: &str, default: u32) -> AppResult<u32> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<u32>()
            .map_err(|error| AppError::Validation(format!("invalid {name}: {error}"))),
        Err(_) => Ok(default),
    }
}
