//! Domain layer - Core business logic and rules
//!
//! This layer contains:
//! - Aggregates: the call session and its lifecycle
//! - Value Objects: identifiers, signals, time windows
//! - Ports: async traits for the external collaborators
//! - Domain Events: things that happened to a session

pub mod call;
pub mod dialogue;
pub mod lead;
pub mod schedule;
pub mod shared;
pub mod speech;
pub mod telephony;

// Re-export commonly used types
pub use shared::{CallError, Result};
