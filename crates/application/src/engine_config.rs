use warden_core::{AppError, AppResult};

/// Longest delegation chain the resolver follows.
pub const MAX_SUPPORTED_DELEGATION_DEPTH: u8 = 1;

/// Tunables shared by the permission engine and point-in-time queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    max_delegation_depth: u8,
}

impl EngineConfig {
    /// Creates a configuration. Depth 0 disables delegations.
    pub fn new(max_delegation_depth: u8) -> AppResult<Self> {
        if max_delegation_depth > MAX_SUPPORTED_DELEGATION_DEPTH {
            return Err(AppError::Validation(format!(
                "max delegation depth {max_delegation_depth} exceeds supported depth {MAX_SUPPORTED_DELEGATION_DEPTH}"
            )));
        }

        Ok(Self {
            max_delegation_depth,
        })
    }

    /// Returns the configured delegation depth.
    #[must_use]
    pub fn max_delegation_depth(&self) -> u8 {
        self.max_delegation_depth
    }

    /// Returns whether delegations are resolved and accepted.
    #[must_use]
    pub fn delegations_enabled(&self) -> bool {
        self.max_delegation_depth > 0
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_delegation_depth: MAX_SUPPORTED_DELEGATION_DEPTH,
        }
    }
}
