//! CallPilot - outbound AI sales-call orchestration
//!
//! Places calls to leads, runs the conversation turn by turn against a
//! dialogue policy and speech synthesizer, and books a meeting when the lead
//! is ready. Laid out in Domain-Driven Design (DDD) layers.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interface;

// Re-export commonly used types
pub use domain::shared::error::CallError;
pub use domain::shared::result::Result;
