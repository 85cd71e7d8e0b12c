//! Actor resolution. Authentication itself lives outside the dispatch core;
//! the core only needs a credential turned into an [`Actor`].

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::actor::Actor;

#[async_trait]
pub trait ActorVerifier: Send + Sync {
    async fn verify_actor(&self, credential: &str) -> Result<Actor, AppError>;
}

/// In-memory bearer-token directory standing in for the external auth
/// service.
#[derive(Default)]
pub struct TokenDirectory {
    tokens: DashMap<String, Actor>,
}

impl TokenDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self, actor: Actor) -> String {
        let token = format!("{}.{}", actor.id.simple(), Uuid::new_v4().simple());
        self.tokens.insert(token.clone(), actor);
        token
    }

    /// Registers a credential minted outside this service.
    pub fn register(&self, token: impl Into<String>, actor: Actor) {
        self.tokens.insert(token.into(), actor);
    }

    pub fn revoke(&self, token: &str) -> bool {
        self.tokens.remove(token).is_some()
    }
}

#[async_trait]
impl ActorVerifier for TokenDirectory {
    async fn verify_actor(&self, credential: &str) -> Result<Actor, AppError> {
        let token = credential
            .strip_prefix("Bearer ")
            .unwrap_or(credential)
            .trim();

        if token.is_empty() {
            return Err(AppError::Unauthenticated("no token provided".to_string()));
        }

        self.tokens
            .get(token)
            .map(|entry| *entry.value())
            .ok_or_else(|| AppError::Unauthenticated("token is not valid".to_string()))
    }
}
