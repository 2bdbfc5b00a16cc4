use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who performs a command. Passed explicitly to every workflow command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Actor {
    Person {
        id: Uuid,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    System,
}

impl Actor {
    pub fn person(id: Uuid, name: Option<String>) -> Self {
        Actor::Person { id, name }
    }

    pub fn is_system(&self) -> bool {
        matches!(self, Actor::System)
    }

    pub fn person_id(&self) -> Option<Uuid> {
        match self {
            Actor::Person { id, .. } => Some(*id),
            Actor::System => None,
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::Person { id, name: Some(name) } => write!(f, "{name} ({id})"),
            Actor::Person { id, name: None } => write!(f, "{id}"),
            Actor::System => f.write_str("system"),
        }
    }
}
