//! # Core Type Definitions
//!
//! Identifier types shared by every part of the framework. Offers, command
//! senders and chunk events are all keyed by [`PlayerId`].

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Stable unique identifier of a player (or any other subject an offer can be
/// extended to).
///
/// Wraps a UUID so player ids cannot be mixed up with other ids.
///
/// # Examples
///
/// ```rust
/// use rapid_framework::PlayerId;
///
/// let id: PlayerId = "550e8400-e29b-41d4-a716-446655440000".parse().unwrap();
/// assert_eq!(id.to_string(), "550e8400-e29b-41d4-a716-446655440000");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(pub Uuid);

impl PlayerId {
    /// Creates a new random player id (UUID v4).
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Derives a stable id from a player name, the way offline-mode servers do.
    ///
    /// The same name always maps to the same id, which lets console users
    /// address players by name.
    pub fn from_name(name: &str) -> Self {
        Self(Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("OfflinePlayer:{name}").as_bytes()))
    }
}

impl std::str::FromStr for PlayerId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl Default for PlayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for PlayerId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}
