use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Already-authenticated caller identity handed to the engine by the transport layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorIdentity {
    user_id: Uuid,
    subject: String,
}

impl ActorIdentity {
    /// Creates an actor identity from a stored user id and the provider subject.
    #[must_use]
    pub fn new(user_id: Uuid, subject: impl Into<String>) -> Self {
        Self {
            user_id,
            subject: subject.into(),
        }
    }

    /// Returns the engine user id of the actor.
    #[must_use]
    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    /// Returns the stable subject claim from the identity provider.
    #[must_use]
    pub fn subject(&self) -> &str {
        self.subject.as_str()
    }
}
