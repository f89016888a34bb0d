//! Identity collaborator.

use crate::catalog::ActorId;

/// Supplies the person on whose behalf the engine acts.
pub trait Identity: Send + Sync {
    /// The current actor.
    fn current_actor(&self) -> ActorId;
}

/// Identity that always reports the same actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticIdentity(ActorId);

impl StaticIdentity {
    /// Create an identity for `actor`.
    pub fn new(actor: impl Into<String>) -> Self {
        Self(ActorId::new(actor))
    }
}

impl Identity for StaticIdentity {
    fn current_actor(&self) -> ActorId {
        self.0.clone()
    }
}

impl<F> Identity for F
where
    F: Fn() -> ActorId + Send + Sync,
{
    fn current_actor(&self) -> ActorId {
        self()
    }
}
