//! Resolution of actor ids into profiles.

use std::collections::HashMap;

use agent_primitives::{Actor, ActorId};
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::KernelResult;

/// Looks up actor profiles.
#[async_trait]
pub trait AccountResolver: Send + Sync {
    /// Returns the actors that exist among `ids`, in the order requested.
    /// Unknown ids are omitted rather than reported.
    async fn get_actors(&self, ids: &[ActorId]) -> KernelResult<Vec<Actor>>;
}

/// In-memory account directory.
#[derive(Debug, Default)]
pub struct LocalAccountResolver {
    actors: RwLock<HashMap<ActorId, Actor>>,
}

impl LocalAccountResolver {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an actor while building the directory.
    #[must_use]
    pub fn with_actor(mut self, actor: Actor) -> Self {
        self.actors.get_mut().insert(actor.id(), actor);
        self
    }

    /// Adds or replaces an actor.
    pub async fn insert(&self, actor: Actor) {
        self.actors.write().await.insert(actor.id(), actor);
    }
}

#[async_trait]
impl AccountResolver for LocalAccountResolver {
    async fn get_actors(&self, ids: &[ActorId]) -> KernelResult<Vec<Actor>> {
        let guard = self.actors.read().await;
        Ok(ids.iter().filter_map(|id| guard.get(id).cloned()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_known_actors_in_request_order() {
        let ada = Actor::new(ActorId::random(), "Ada").unwrap();
        let bob = Actor::new(ActorId::random(), "Bob").unwrap();
        let resolver = LocalAccountResolver::new().with_actor(ada.clone());
        resolver.insert(bob.clone()).await;

        let actors = resolver
            .get_actors(&[bob.id(), ActorId::random(), ada.id()])
            .await
            .unwrap();
        let names: Vec<_> = actors.iter().map(Actor::display_name).collect();
        assert_eq!(names, ["Bob", "Ada"]);
    }
}
