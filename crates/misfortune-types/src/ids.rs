//! Type-safe identifier wrappers around [`Uuid`].
//!
//! Every entity has a strongly-typed ID to prevent accidental mixing of
//! identifiers at compile time. Wheel, drink, and registration IDs are
//! random UUID v4 values; registration IDs double as unguessable
//! capability handles during the pairing handshake, so they must never
//! be derived from anything predictable.
//!
//! User identities come from the chat platform and are plain 64-bit
//! integers, wrapped in [`UserId`] for the same mixing protection.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generates a newtype wrapper around [`Uuid`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new random identifier (UUID v4).
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Return the inner [`Uuid`] value.
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Unique identifier for a wheel.
    WheelId
}

define_id! {
    /// Unique identifier for a drink on a wheel.
    DrinkId
}

define_id! {
    /// Opaque handle for a pending wheel client registration.
    ///
    /// Acts as a short-lived capability: whoever presents it to the
    /// confirmation endpoint binds the waiting client to a wheel.
    RegistrationId
}

/// Chat-platform user identity (wheel owner).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct UserId(pub i64);

impl UserId {
    /// Return the inner numeric value.
    pub const fn into_inner(self) -> i64 {
        self.0
    }
}

impl core::fmt::Display for UserId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<UserId> for i64 {
    fn from(id: UserId) -> Self {
        id.0
    }
}
