use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a substance ledger (one per container entity).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LedgerId(pub Uuid);

impl LedgerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LedgerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LedgerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.8}", &self.0.to_string()[..8])
    }
}

/// The network role a caller is acting under.
///
/// Only `Server` may mutate a ledger. Clients observe replicated state and
/// route mutation requests through the network layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Server,
    Client,
}

impl Role {
    pub fn is_authoritative(self) -> bool {
        matches!(self, Role::Server)
    }
}
