//! Routing state: which handle class serves reads.

use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingState {
    /// Reads go to the primary.
    #[default]
    Master,
    /// Reads go to a live replica, falling back to the primary.
    Slave,
}

impl fmt::Display for RoutingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RoutingState::Master => "master",
            RoutingState::Slave => "slave",
        })
    }
}

impl std::str::FromStr for RoutingState {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "master" | "primary" => Ok(RoutingState::Master),
            "slave" | "replica" => Ok(RoutingState::Slave),
            _ => Err(AppError::BadRequest(format!(
                "invalid routing state: {} (expected master or slave)",
                s
            ))),
        }
    }
}
