//! Session-scoped identifiers.
//!
//! Every entity kind has its own id newtype so a `CastleId` can never be
//! passed where a `UnitId` is expected. Combat and AI code that only knows
//! "some entity" works with [`EntityId`] plus an [`EntityKind`] hint.
//! Ids are never reused within a session.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Widens the id for kind-agnostic lookups.
            pub fn entity(&self) -> EntityId {
                EntityId(self.0.clone())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<$name> for EntityId {
            fn from(id: $name) -> EntityId {
                EntityId(id.0)
            }
        }
    };
}

string_id!(
    /// Peer identifier handed out by the signaling directory; doubles as the player id.
    ClientId
);
string_id!(CastleId);
string_id!(UnitId);
string_id!(NeutralId);

impl CastleId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl UnitId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// Type-erased id of any entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_client(&self) -> ClientId {
        ClientId(self.0.clone())
    }

    pub fn as_castle(&self) -> CastleId {
        CastleId(self.0.clone())
    }

    pub fn as_unit(&self) -> UnitId {
        UnitId(self.0.clone())
    }

    pub fn as_neutral(&self) -> NeutralId {
        NeutralId(self.0.clone())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for EntityId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Player,
    Castle,
    Unit,
    Neutral,
    /// Lookup wildcard; never stored on an entity.
    Any,
}

impl EntityKind {
    /// Whether an entity of kind `self` satisfies a lookup for `expected`.
    pub fn matches(self, expected: EntityKind) -> bool {
        expected == EntityKind::Any || self == expected
    }
}
