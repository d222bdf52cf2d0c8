//! HTTP handlers for routing diagnostics and administration.

pub mod admin;
pub use admin::*;
