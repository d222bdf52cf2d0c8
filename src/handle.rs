//! Database handles: named connection aliases for the primary and its replicas.

use serde::Serialize;
use std::fmt;

/// Whether a handle accepts writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Primary,
    Replica,
}

/// Identifier of one configured database. Built at config load, immutable afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct DatabaseHandle {
    pub name: String,
    pub role: Role,
}

impl DatabaseHandle {
    pub fn primary(name: impl Into<String>) -> Self {
        DatabaseHandle {
            name: name.into(),
            role: Role::Primary,
        }
    }

    pub fn replica(name: impl Into<String>) -> Self {
        DatabaseHandle {
            name: name.into(),
            role: Role::Replica,
        }
    }

    pub fn is_primary(&self) -> bool {
        self.role == Role::Primary
    }
}

impl fmt::Display for DatabaseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
