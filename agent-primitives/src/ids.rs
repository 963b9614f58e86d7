//! Identifier types for actors, rooms, memories, and goals.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Error;

macro_rules! uuid_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generates a random identifier.
            #[must_use]
            pub fn random() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an identifier from an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            #[must_use]
            pub const fn as_uuid(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::random()
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$name> for Uuid {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid = Uuid::parse_str(s).map_err(Error::from)?;
                Ok(Self::from_uuid(uuid))
            }
        }
    };
}

uuid_identifier!(
    /// Identifies a participant: a user or the agent itself.
    ActorId
);

uuid_identifier!(
    /// Identifies the shared scope of a conversation.
    RoomId
);

uuid_identifier!(
    /// Identifies a single stored memory record.
    MemoryId
);

uuid_identifier!(
    /// Identifies a goal.
    GoalId
);

uuid_identifier!(
    /// Identifies an objective within a goal.
    ObjectiveId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_actor_id() {
        let id = ActorId::random();
        let parsed = id.to_string().parse::<ActorId>().expect("parse");
        assert_eq!(id, parsed);
    }

    #[test]
    fn rejects_malformed_room_id() {
        let err = "not-a-uuid".parse::<RoomId>().expect_err("invalid uuid");
        assert!(matches!(err, Error::InvalidId { .. }));
    }

    #[test]
    fn serializes_transparently() {
        let uuid = Uuid::new_v4();
        let id = MemoryId::from_uuid(uuid);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{uuid}\""));
    }
}
