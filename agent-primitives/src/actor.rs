//! Actors participating in a conversation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::ids::ActorId;

/// Descriptive profile attached to an actor.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ActorDetails {
    /// Short one-line description.
    #[serde(default)]
    pub tagline: String,
    /// Longer free-form summary.
    #[serde(default)]
    pub summary: String,
    /// Representative quote.
    #[serde(default)]
    pub quote: String,
    /// Any additional attributes supplied by the account backend.
    #[serde(default, flatten)]
    pub attributes: Map<String, Value>,
}

/// A user or agent resolved from the account store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    id: ActorId,
    display_name: String,
    #[serde(default)]
    details: ActorDetails,
}

impl Actor {
    /// Creates an actor with empty details.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidActor`] when the display name is blank.
    pub fn new(id: ActorId, display_name: impl Into<String>) -> Result<Self> {
        let display_name = display_name.into();
        if display_name.trim().is_empty() {
            return Err(Error::InvalidActor {
                reason: "display name cannot be empty".into(),
            });
        }
        Ok(Self {
            id,
            display_name,
            details: ActorDetails::default(),
        })
    }

    /// Attaches profile details.
    #[must_use]
    pub fn with_details(mut self, details: ActorDetails) -> Self {
        self.details = details;
        self
    }

    /// Returns the actor identifier.
    #[must_use]
    pub const fn id(&self) -> ActorId {
        self.id
    }

    /// Returns the display name.
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Returns the profile details.
    #[must_use]
    pub fn details(&self) -> &ActorDetails {
        &self.details
    }
}
